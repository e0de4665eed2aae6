use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DriftlogError;

/// Application configuration loaded from environment variables.
///
/// Every value has a default so a bare `play` or `api` run works against a
/// local server.
#[derive(Debug, Clone)]
pub struct Config {
    // Client
    pub api_base: String,
    pub state_dir: PathBuf,

    // Simulation
    pub tick_interval: Duration,
    pub field_width: f64,
    pub field_height: f64,

    // Server
    pub data_dir: PathBuf,
    pub api_host: String,
    pub api_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8091".to_string(),
            state_dir: PathBuf::from(".driftlog"),
            tick_interval: Duration::from_millis(20),
            field_width: 400.0,
            field_height: 200.0,
            data_dir: PathBuf::from("data"),
            api_host: "0.0.0.0".to_string(),
            api_port: 8091,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, DriftlogError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DriftlogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            api_base: lookup("DRIFTLOG_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            state_dir: lookup("DRIFTLOG_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            tick_interval: parsed(&lookup, "DRIFTLOG_TICK_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            field_width: parsed(&lookup, "DRIFTLOG_FIELD_WIDTH")?.unwrap_or(defaults.field_width),
            field_height: parsed(&lookup, "DRIFTLOG_FIELD_HEIGHT")?
                .unwrap_or(defaults.field_height),
            data_dir: lookup("DRIFTLOG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            api_host: lookup("API_HOST").unwrap_or(defaults.api_host),
            api_port: parsed(&lookup, "API_PORT")?.unwrap_or(defaults.api_port),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Result<Option<T>, DriftlogError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DriftlogError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}
