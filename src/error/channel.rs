use std::{any::Any, time::Duration};

use bayeux_error::{ErrorExt, StatusCode};
use thiserror::Error;

/// Ошибки дерева каналов и маршрутизатора.
///
/// Все ошибки локальные и синхронные: возвращаются в точке вызова, ядро
/// никогда не повторяет операции само. Исключение `ChannelRemoved`: его
/// перехватывают точки входа [`Broker`](crate::Broker) и заново разрешают
/// путь от корня.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("invalid channel path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("channel {parent} is not a parent of {child}")]
    NotAParent { parent: String, child: String },

    #[error("publishing to wildcard channel {channel} is not allowed")]
    WildPublishNotAllowed { channel: String },

    #[error("channel {channel} is already initialized")]
    AlreadyInitialized { channel: String },

    #[error("channel {channel} was not initialized within {timeout:?}")]
    NotInitialized { channel: String, timeout: Duration },

    #[error("channel {channel} was removed concurrently")]
    ChannelRemoved { channel: String },

    #[error("broker is shut down")]
    BrokerClosed,
}

pub type ChannelResult<T> = Result<T, ChannelError>;

impl ChannelError {
    pub(crate) fn invalid_path(
        path: &str,
        reason: &'static str,
    ) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason,
        }
    }

    /// Путь канала, к которому относится ошибка (если есть).
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::InvalidPath { path, .. } => Some(path),
            Self::NotAParent { child, .. } => Some(child),
            Self::WildPublishNotAllowed { channel }
            | Self::AlreadyInitialized { channel }
            | Self::NotInitialized { channel, .. }
            | Self::ChannelRemoved { channel } => Some(channel),
            Self::BrokerClosed => None,
        }
    }
}

impl ErrorExt for ChannelError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidPath { .. } => StatusCode::InvalidPath,
            Self::NotAParent { .. } => StatusCode::NotAParent,
            Self::WildPublishNotAllowed { .. } => StatusCode::WildPublish,
            Self::AlreadyInitialized { .. } => StatusCode::AlreadyInitialized,
            Self::NotInitialized { .. } => StatusCode::NotInitialized,
            Self::ChannelRemoved { .. } => StatusCode::ChannelRemoved,
            Self::BrokerClosed => StatusCode::BrokerClosed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::InvalidPath { path, .. } => format!("Invalid channel: {path}"),
            Self::WildPublishNotAllowed { channel } => {
                format!("Cannot publish to wildcard channel {channel}")
            }
            Self::NotInitialized { .. } => "Channel unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "channel".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Some(channel) = self.channel() {
            tags.push(("channel", channel.to_string()));
        }
        tags
    }
}
