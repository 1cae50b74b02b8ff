/// Settings loading: defaults, config file, environment.
pub mod config;
/// Channel errors and configuration errors.
pub mod error;
/// Structured logging (filters, formats, sinks).
pub mod logging;
/// Channel tree, publish routing, subscriptions and sweeping.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Settings.
pub use self::config::Settings;
/// Operation errors and result types.
pub use error::{ChannelError, ChannelResult, ConfigError};
/// Logging entry point.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Channel router API.
pub use pubsub::{
    spawn_sweeper, Broker, BrokerConfig, ChannelId, ChannelNode, Listener, LocalSession, Message,
    PublishOutcome, Session, SessionRef, SweepReport,
};
