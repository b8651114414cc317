use crate::types::{BoardSourceSpec, EstimateError, FetchConfig, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "CONSULT_ETA_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardLocation {
    Files(PathBuf),
    Relay(String),
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub board: BoardLocation,
    pub department_keywords: Vec<String>,
    pub doctor_keyword: Option<String>,
    pub model_dir: PathBuf,
    pub registry_path: PathBuf,
    pub refresh_interval_secs: u64,
    pub bind_addr: SocketAddr,
    pub fetch: FetchConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            board: BoardLocation::Files(PathBuf::from("board")),
            department_keywords: vec!["中醫".to_string()],
            doctor_keyword: None,
            model_dir: PathBuf::from("."),
            registry_path: PathBuf::from("clinic_status.json"),
            refresh_interval_secs: 60,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            fetch: FetchConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by any `CONSULT_ETA_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(format!("{}{}", ENV_PREFIX, name)).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("BOARD_URL") {
            config.board = BoardLocation::Relay(url);
        } else if let Some(dir) = lookup("BOARD_DIR") {
            config.board = BoardLocation::Files(PathBuf::from(dir));
        }
        if let Some(keywords) = lookup("DEPARTMENTS") {
            config.department_keywords = split_list(&keywords);
        }
        if let Some(doctor) = lookup("DOCTOR") {
            config.doctor_keyword = Some(doctor).filter(|d| !d.trim().is_empty());
        }
        if let Some(dir) = lookup("MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("REGISTRY_PATH") {
            config.registry_path = PathBuf::from(path);
        }
        if let Some(secs) = lookup("REFRESH_SECS") {
            config.refresh_interval_secs = parse_var("REFRESH_SECS", &secs)?;
        }
        if let Some(addr) = lookup("BIND") {
            config.bind_addr = parse_var("BIND", &addr)?;
        }
        if let Some(retries) = lookup("FETCH_RETRIES") {
            config.fetch.max_retries = parse_var("FETCH_RETRIES", &retries)?;
        }
        if let Some(timeout) = lookup("FETCH_TIMEOUT_SECS") {
            config.fetch.timeout_seconds = parse_var("FETCH_TIMEOUT_SECS", &timeout)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(EstimateError::Config("refresh interval must be at least one second".to_string()));
        }
        if let BoardLocation::Relay(url) = &self.board {
            url::Url::parse(url)?;
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn source_spec(&self) -> BoardSourceSpec {
        let uri = match &self.board {
            BoardLocation::Files(dir) => format!("file://{}", dir.display()),
            BoardLocation::Relay(url) => url.clone(),
        };
        BoardSourceSpec {
            uri,
            department_keywords: self.department_keywords.clone(),
            doctor_keyword: self.doctor_keyword.clone(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EstimateError::Config(format!("{}{} = {:?}: {}", ENV_PREFIX, name, raw, e)))
}
