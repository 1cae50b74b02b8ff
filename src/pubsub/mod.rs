//! Маршрутизатор каналов в стиле Bayeux.
//!
//! - `channel_id`: разбор и сравнение путей каналов.
//! - `channel`: узел дерева, создание потомков и удаление.
//! - `router`: двухфазная маршрутизация публикаций.
//! - `subscription`: подписка и отписка сессий.
//! - `sweeper`: периодическая очистка пустых каналов.
//! - `broker`: корень дерева, реестр каналов, глобальные слушатели.
//! - `listener`, `extension`: точки расширения.
//! - `session`, `message`: участники и сообщения.
//! - `init` и `intern` (приватный): барьер инициализации и интернирование
//!   сегментов пути.

pub mod broker;
pub mod channel;
pub mod channel_id;
pub mod extension;
pub mod init;
mod intern;
pub mod listener;
pub mod message;
pub mod router;
pub mod session;
mod subscription;
pub mod sweeper;

// Публичный экспорт основных типов, чтобы упростить доступ к ним из
// внешнего кода.
pub use broker::*;
pub use channel::*;
pub use channel_id::*;
pub use extension::{extension, Extension};
pub use init::*;
pub use listener::{
    initializer, ChannelListener, HandlerListener, Initializer, Listener, MessageListener,
    SubscriptionListener,
};
pub use message::*;
pub use router::*;
pub use session::*;
pub use sweeper::*;
