use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use super::formats::LogFormat;
use crate::error::ConfigError;

/// Допустимые уровни логирования.
const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Настройки логирования.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень по умолчанию (`RUST_LOG` имеет приоритет)
    pub level: String,
    /// Формат вывода
    pub format: LogFormat,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

/// Вывод в stdout.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Вывод в файл с ежедневной ротацией.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub filename: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            filename: "bayeux-router.log".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Применяет переменные окружения `BAYEUX_LOG_LEVEL`,
    /// `BAYEUX_LOG_FORMAT` и `BAYEUX_LOG_DIR`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BAYEUX_LOG_LEVEL") {
            self.level = level.to_lowercase();
        }
        if let Ok(format) = std::env::var("BAYEUX_LOG_FORMAT") {
            match LogFormat::from_str(&format) {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring BAYEUX_LOG_FORMAT: {e}"),
            }
        }
        if let Ok(dir) = std::env::var("BAYEUX_LOG_DIR") {
            self.file.dir = PathBuf::from(dir);
            self.file.enabled = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.level",
                reason: format!("unknown level '{}'", self.level),
            });
        }
        if self.file.enabled && self.file.filename.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.file.filename",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn ensure_log_dir(&self) -> Result<(), ConfigError> {
        if self.file.enabled {
            std::fs::create_dir_all(&self.file.dir)?;
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: уровень по умолчанию и шумные зависимости
    /// на уровне `warn`.
    pub fn build_filter_directive(&self) -> String {
        format!("{},tokio=warn,runtime=warn", self.level)
    }
}
