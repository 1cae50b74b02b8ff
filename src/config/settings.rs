use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, logging::LoggingConfig, pubsub::BrokerConfig};

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "BAYEUX";

/// Настройки процесса.
///
/// Источники в порядке приоритета: переменные окружения
/// (`BAYEUX_SWEEP_INTERVAL_MS`, `BAYEUX_LOGGING__LEVEL`, ...), файл
/// конфигурации, значения по умолчанию.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Период очистки пустых каналов, мс
    pub sweep_interval_ms: u64,
    /// Сколько ждать чужой инициализации канала, мс
    pub init_timeout_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("sweep_interval_ms", 1000)?
            .set_default("init_timeout_ms", 5000)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Добавляем переменные окружения с префиксом BAYEUX_
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sweep_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.init_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "init_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.logging.validate()
    }

    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            init_timeout: Duration::from_millis(self.init_timeout_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 1000,
            init_timeout_ms: 5000,
            logging: LoggingConfig::default(),
        }
    }
}
