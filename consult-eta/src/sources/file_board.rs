use crate::traits::BoardSource;
use crate::types::{BoardBlock, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const STATUS_PREFIX: &str = "#status:";

/// Board dumps on disk: one `<display name>.txt` file per clinic. A first
/// line of the form `#status: <text>` carries the header status indicator.
pub struct FileBoardSource {
    dir: PathBuf,
}

impl FileBoardSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn parse_dump(display_name: &str, content: &str) -> BoardBlock {
        let content = content.trim_start_matches('\u{feff}');
        let (status_text, text) = match content.split_once('\n') {
            Some((first, rest)) if first.trim_start().starts_with(STATUS_PREFIX) => {
                (Some(status_value(first)), rest.to_string())
            }
            None if content.trim_start().starts_with(STATUS_PREFIX) => (Some(status_value(content)), String::new()),
            _ => (None, content.to_string()),
        };

        BoardBlock {
            display_name: display_name.to_string(),
            text,
            status_text,
        }
    }
}

fn status_value(line: &str) -> String {
    line.trim_start()
        .trim_start_matches(STATUS_PREFIX)
        .trim()
        .to_string()
}

#[async_trait]
impl BoardSource for FileBoardSource {
    fn source_id(&self) -> String {
        format!("file_{}", self.dir.display())
    }

    fn source_name(&self) -> String {
        format!("Board dumps ({})", self.dir.display())
    }

    async fn pull(&mut self) -> Result<Vec<BoardBlock>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "txt") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut blocks = Vec::with_capacity(paths.len());
        for path in paths {
            let display_name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = tokio::fs::read(&path).await?;
            let content = match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Board dump {} is not valid UTF-8, decoding lossily", path.display());
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };
            debug!("Read board dump {} ({} bytes)", path.display(), content.len());
            blocks.push(Self::parse_dump(&display_name, &content));
        }

        info!("Pulled {} board blocks from {}", blocks.len(), self.dir.display());
        Ok(blocks)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tokio::fs::metadata(&self.dir).await.map(|m| m.is_dir()).unwrap_or(false))
    }
}
