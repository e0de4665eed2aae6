use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriftlogError {
    #[error("Configuration error: {0}")]
    Config(String),
}
