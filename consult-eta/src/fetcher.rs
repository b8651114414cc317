use crate::types::{BoardBlock, EstimateError, FetchConfig, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct BoardFetch {
    pub blocks: Vec<BoardBlock>,
    pub fetch_time: DateTime<Utc>,
    pub response_time_ms: u64,
    pub http_status: u16,
}

/// HTTP client for a board relay: an endpoint that serves the scraped
/// clinic blocks as a JSON array.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub async fn fetch_board(&self, url: &str) -> Result<BoardFetch> {
        Url::parse(url)?;

        let start_time = Instant::now();
        let fetch_time = Utc::now();
        debug!("Fetching board: {}", url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 8),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 30)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_once(url).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return self.read_blocks(response, fetch_time, start_time).await;
                    }
                    last_error = Some(EstimateError::Fetch(format!(
                        "HTTP {}: {}",
                        status,
                        status.canonical_reason().unwrap_or("Unknown")
                    )));
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        error!("Failed to fetch board after {} attempts: {}", self.config.max_retries + 1, url);
        Err(last_error.unwrap_or_else(|| EstimateError::Fetch("Unknown error".to_string())))
    }

    /// One request, no retries: true when the board answers with a 2xx.
    pub async fn check_board(&self, url: &str) -> Result<bool> {
        Url::parse(url)?;
        match self.fetch_once(url).await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                debug!("Board check failed for {}: {}", url, e);
                Ok(false)
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        Ok(response)
    }

    async fn read_blocks(&self, response: Response, fetch_time: DateTime<Utc>, start_time: Instant) -> Result<BoardFetch> {
        let http_status = response.status().as_u16();

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_board_size_mb {
                return Err(EstimateError::Fetch(format!("Board payload too large: {}MB", size_mb)));
            }
        }

        let body = response.text().await?;
        let blocks: Vec<BoardBlock> = serde_json::from_str(&body)?;
        info!("Fetched {} board blocks ({} bytes)", blocks.len(), body.len());

        Ok(BoardFetch {
            blocks,
            fetch_time,
            response_time_ms: start_time.elapsed().as_millis() as u64,
            http_status,
        })
    }
}
