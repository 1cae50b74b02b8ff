use tracing_subscriber::{fmt, layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::config::LoggingConfig;

/// Создаёт JSON formatter layer. ANSI-цвета в JSON не используются.
pub fn build_json_layer<S, W>(
    config: &LoggingConfig,
    writer: W,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let json_fmt = fmt::format()
        .json()
        .with_current_span(true)
        .with_span_list(false);

    let layer = fmt::layer()
        .event_format(json_fmt)
        .fmt_fields(fmt::format::JsonFields::new())
        .with_writer(writer)
        .with_ansi(false)
        .with_target(config.console.with_target)
        .with_thread_names(true)
        .with_thread_ids(config.console.with_thread_ids)
        .with_line_number(config.console.with_line_numbers);

    Box::new(layer)
}
