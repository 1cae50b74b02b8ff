use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{ChannelId, ChannelNode, SharedMessage};

/// Сессия клиента.
///
/// Сессиями владеет внешний слой (транспорт, протокол рукопожатия); узлы
/// каналов хранят только ссылки на них в множестве подписчиков.
pub trait Session: Send + Sync {
    fn id(&self) -> &str;

    /// Завершила ли сессия рукопожатие. Только такие сессии могут
    /// подписываться; остальные выметаются при очистке.
    fn is_handshook(&self) -> bool;

    /// Доставка сообщения. Best-effort: результат ядро не использует.
    fn deliver(
        &self,
        from: Option<&SessionRef>,
        message: &SharedMessage,
    );

    fn subscribed_to(
        &self,
        _channel: &Arc<ChannelNode>,
    ) {
    }

    fn unsubscribed_to(
        &self,
        _channel: &Arc<ChannelNode>,
    ) {
    }
}

pub type SessionRef = Arc<dyn Session>;

/// Доставленное сообщение вместе с идентификатором отправителя.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: Option<String>,
    pub message: SharedMessage,
}

/// Входящая очередь [`LocalSession`].
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Inbox {
    /// Асинхронно ожидает следующую доставку. `None`, если сессия удалена.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Забирает доставку без ожидания.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    /// Забирает всё, что уже лежит в очереди.
    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(delivery) = self.rx.try_recv() {
            out.push(delivery);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Внутрипроцессная сессия: серверные сервисы и тесты подписываются через
/// неё так же, как удалённые клиенты.
pub struct LocalSession {
    id: String,
    handshook: AtomicBool,
    subscriptions: DashMap<ChannelId, Weak<ChannelNode>>,
    tx: mpsc::UnboundedSender<Delivery>,
    this: Weak<LocalSession>,
}

impl LocalSession {
    /// Создаёт сессию со случайным идентификатором.
    pub fn new() -> (Arc<Self>, Inbox) {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> (Arc<Self>, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = id.into();
        let session = Arc::new_cyclic(|this| Self {
            id,
            handshook: AtomicBool::new(false),
            subscriptions: DashMap::new(),
            tx,
            this: this.clone(),
        });
        (session, Inbox { rx })
    }

    /// Сессия, сразу завершившая рукопожатие.
    pub fn handshaken() -> (Arc<Self>, Inbox) {
        let (session, inbox) = Self::new();
        session.handshake();
        (session, inbox)
    }

    pub fn handshake(&self) {
        self.handshook.store(true, Ordering::Release);
    }

    /// Сбрасывает рукопожатие, не трогая подписки. Такие подписки снимет
    /// очистка.
    pub fn expire(&self) {
        self.handshook.store(false, Ordering::Release);
    }

    pub fn session_ref(self: &Arc<Self>) -> SessionRef {
        self.clone()
    }

    /// Каналы, на которые сессия сейчас подписана.
    pub fn subscriptions(&self) -> Vec<ChannelId> {
        self.subscriptions.iter().map(|e| e.key().clone()).collect()
    }

    /// Сбрасывает рукопожатие и отписывается от всех каналов.
    pub fn disconnect(&self) {
        self.handshook.store(false, Ordering::Release);
        let Some(me) = self.this.upgrade() else {
            return;
        };
        let me: SessionRef = me;

        let channels: Vec<Arc<ChannelNode>> = self
            .subscriptions
            .iter()
            .filter_map(|e| e.value().upgrade())
            .collect();
        for channel in channels {
            channel.unsubscribe(&me);
        }
        self.subscriptions.clear();
    }
}

impl Session for LocalSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_handshook(&self) -> bool {
        self.handshook.load(Ordering::Acquire)
    }

    fn deliver(
        &self,
        from: Option<&SessionRef>,
        message: &SharedMessage,
    ) {
        let delivery = Delivery {
            from: from.map(|s| s.id().to_string()),
            message: message.clone(),
        };
        // получатель мог быть уже удалён
        let _ = self.tx.send(delivery);
    }

    fn subscribed_to(
        &self,
        channel: &Arc<ChannelNode>,
    ) {
        self.subscriptions
            .insert(channel.id().clone(), Arc::downgrade(channel));
    }

    fn unsubscribed_to(
        &self,
        channel: &Arc<ChannelNode>,
    ) {
        // по тому же пути уже может висеть подписка на новый узел
        self.subscriptions
            .remove_if(channel.id(), |_, node| node.as_ptr() == Arc::as_ptr(channel));
    }
}

impl std::fmt::Debug for LocalSession {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LocalSession")
            .field("id", &self.id)
            .field("handshook", &self.is_handshook())
            .finish()
    }
}
