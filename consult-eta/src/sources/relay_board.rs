use crate::fetcher::Fetcher;
use crate::traits::BoardSource;
use crate::types::{BoardBlock, FetchConfig, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

/// Board relay over HTTP: `GET <url>` answers with the scraped clinic blocks.
pub struct RelayBoardSource {
    pub url: String,
    fetcher: Fetcher,
    last_fetch: Option<DateTime<Utc>>,
}

impl RelayBoardSource {
    pub fn new(url: String, fetch_config: FetchConfig) -> Result<Self> {
        url::Url::parse(&url)?;
        Ok(Self {
            url,
            fetcher: Fetcher::new(fetch_config)?,
            last_fetch: None,
        })
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }
}

#[async_trait]
impl BoardSource for RelayBoardSource {
    fn source_id(&self) -> String {
        format!("relay_{}", self.url)
    }

    fn source_name(&self) -> String {
        match url::Url::parse(&self.url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            Some(host) => format!("Board relay ({})", host),
            None => "Board relay".to_string(),
        }
    }

    async fn pull(&mut self) -> Result<Vec<BoardBlock>> {
        let fetch = self.fetcher.fetch_board(&self.url).await?;
        self.last_fetch = Some(fetch.fetch_time);
        info!(
            "Pulled {} board blocks from {} in {}ms (HTTP {})",
            fetch.blocks.len(),
            self.url,
            fetch.response_time_ms,
            fetch.http_status
        );
        Ok(fetch.blocks)
    }

    async fn health_check(&self) -> Result<bool> {
        self.fetcher.check_board(&self.url).await
    }
}
