use crate::types::{BoardBlock, Result};
use async_trait::async_trait;

/// Trait for pulling raw clinic blocks from a live queue board
#[async_trait]
pub trait BoardSource: Send + Sync {
    /// Unique identifier for this board source
    fn source_id(&self) -> String;

    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Fetch the current text of every clinic on the board.
    /// An empty result means there is nothing to refresh from this time.
    async fn pull(&mut self) -> Result<Vec<BoardBlock>>;

    /// Check if the board is reachable
    async fn health_check(&self) -> Result<bool>;
}
