pub mod config;
pub use config::{BackgroundConfig, Config, DisplayConfig, EngineConfig, PerformanceConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskLensError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("index {index} out of range for {len} records")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no async runtime available to start background processing")]
    NoRuntime,
    #[error("background processing already started")]
    AlreadyStarted,
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TaskLensError>;
