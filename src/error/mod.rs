pub mod channel;
pub mod config;

pub use channel::{ChannelError, ChannelResult};
pub use self::config::ConfigError;
