//! Инициализация логирования на базе `tracing`.
//!
//! Слои: фильтр `EnvFilter` (`RUST_LOG` или уровень из конфигурации),
//! консоль в stdout и, по желанию, файл с ежедневной ротацией.

pub mod config;
mod filters;
pub mod formats;
pub mod handle;
pub mod sinks;

pub use self::config::{ConsoleConfig, FileConfig, LoggingConfig};
pub use formats::LogFormat;
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ConfigError;

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов вернёт
/// `ConfigError::LoggingInit`.
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle, ConfigError> {
    config.apply_env_overrides();
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config)?;
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| ConfigError::LoggingInit(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = %config.format,
        log_dir = %config.file.dir.display(),
        file_enabled = config.file.enabled,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
