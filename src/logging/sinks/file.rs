use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::{
    error::ConfigError,
    logging::{config::LoggingConfig, formats},
};

/// File layer с ежедневной ротацией. Возвращённый guard нужно держать,
/// пока идёт запись: при его drop буфер сбрасывается на диск.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard), ConfigError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.file.dir)?;

    let appender = daily(&config.file.dir, &config.file.filename);
    let (writer, guard) = non_blocking(appender);

    let layer = formats::build_layer(config, config.format, writer, false);
    Ok((layer, guard))
}
