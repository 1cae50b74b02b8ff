//! Слушатели каналов и брокера.
//!
//! Набор возможностей закрыт: каждый слушатель реализует один из трейтов
//! ниже и хранится в списке как вариант [`Listener`]. Диспетчеризация
//! выполняется через `match` по варианту.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;

use super::{ChannelId, ChannelNode, Message, SessionRef};

/// Уведомления о подписке и отписке сессий.
pub trait SubscriptionListener: Send + Sync {
    fn subscribed(
        &self,
        session: &SessionRef,
        channel: &Arc<ChannelNode>,
    );

    fn unsubscribed(
        &self,
        session: &SessionRef,
        channel: &Arc<ChannelNode>,
    );
}

/// Слушатель публикаций. Может изменять сообщение; возврат `false`
/// прерывает публикацию целиком.
pub trait MessageListener: Send + Sync {
    fn on_message(
        &self,
        from: Option<&SessionRef>,
        to: &Arc<ChannelNode>,
        message: &mut Message,
    ) -> bool;
}

/// Уведомления о появлении и удалении каналов в реестре.
pub trait ChannelListener: Send + Sync {
    fn channel_added(
        &self,
        channel: &Arc<ChannelNode>,
    );

    fn channel_removed(
        &self,
        _channel: &ChannelId,
    ) {
    }
}

/// Конфигурирует только что созданный канал до того, как он станет виден
/// остальным потокам.
pub trait Initializer: Send + Sync {
    fn configure_channel(
        &self,
        channel: &ChannelNode,
    );
}

/// Обработчик протокольных сообщений на meta-каналах. Вызывается после
/// доставки подписчикам.
pub trait HandlerListener: Send + Sync {
    fn on_message(
        &self,
        from: Option<&SessionRef>,
        message: &mut Message,
    );
}

impl<F> MessageListener for F
where
    F: Fn(Option<&SessionRef>, &Arc<ChannelNode>, &mut Message) -> bool + Send + Sync,
{
    fn on_message(
        &self,
        from: Option<&SessionRef>,
        to: &Arc<ChannelNode>,
        message: &mut Message,
    ) -> bool {
        self(from, to, message)
    }
}

impl<F> Initializer for F
where
    F: Fn(&ChannelNode) + Send + Sync,
{
    fn configure_channel(
        &self,
        channel: &ChannelNode,
    ) {
        self(channel)
    }
}

/// Оборачивает замыкание в инициализатор для передачи в
/// [`Broker::create_channel`](crate::Broker::create_channel).
pub fn initializer<F>(f: F) -> Arc<dyn Initializer>
where
    F: Fn(&ChannelNode) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Слушатель любого вида.
#[derive(Clone)]
pub enum Listener {
    Subscription(Arc<dyn SubscriptionListener>),
    Message(Arc<dyn MessageListener>),
    Channel(Arc<dyn ChannelListener>),
    Initializer(Arc<dyn Initializer>),
    Handler(Arc<dyn HandlerListener>),
}

impl Listener {
    /// Слушатель публикаций из замыкания.
    pub fn on_message<F>(f: F) -> Self
    where
        F: Fn(Option<&SessionRef>, &Arc<ChannelNode>, &mut Message) -> bool + Send + Sync + 'static,
    {
        Self::Message(Arc::new(f))
    }

    /// Глобальный инициализатор из замыкания.
    pub fn initializer<F>(f: F) -> Self
    where
        F: Fn(&ChannelNode) + Send + Sync + 'static,
    {
        Self::Initializer(Arc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscription(_) => "subscription",
            Self::Message(_) => "message",
            Self::Channel(_) => "channel",
            Self::Initializer(_) => "initializer",
            Self::Handler(_) => "handler",
        }
    }

    /// Сравнение по идентичности объекта слушателя.
    pub fn ptr_eq(
        &self,
        other: &Listener,
    ) -> bool {
        match (self, other) {
            (Self::Subscription(a), Self::Subscription(b)) => Arc::ptr_eq(a, b),
            (Self::Message(a), Self::Message(b)) => Arc::ptr_eq(a, b),
            (Self::Channel(a), Self::Channel(b)) => Arc::ptr_eq(a, b),
            (Self::Initializer(a), Self::Initializer(b)) => Arc::ptr_eq(a, b),
            (Self::Handler(a), Self::Handler(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Listener::{}", self.kind())
    }
}

/// Список слушателей с копированием при записи.
///
/// Читатели берут `Arc` на текущий снимок и итерируются без блокировок,
/// поэтому слушатель может добавлять или удалять слушателей прямо во время
/// обхода.
#[derive(Default)]
pub(crate) struct ListenerList {
    inner: RwLock<Arc<Vec<Listener>>>,
}

impl ListenerList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &self,
        listener: Listener,
    ) {
        let mut guard = self.inner.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Удаляет первое вхождение слушателя. Возвращает `true`, если нашёлся.
    pub(crate) fn remove(
        &self,
        listener: &Listener,
    ) -> bool {
        let mut guard = self.inner.write();
        let Some(pos) = guard.iter().position(|l| l.ptr_eq(listener)) else {
            return false;
        };
        let mut next: Vec<Listener> = guard.iter().cloned().collect();
        next.remove(pos);
        *guard = Arc::new(next);
        true
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Listener>> {
        self.inner.read().clone()
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = Arc::new(Vec::new());
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}
