use std::io;

use thiserror::Error;

/// Ошибки загрузки настроек и инициализации логирования.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("logging is already initialized: {0}")]
    LoggingInit(String),
}
