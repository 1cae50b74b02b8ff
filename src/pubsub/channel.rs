//! Узел дерева каналов.
//!
//! Каждый узел владеет своими детьми и хранит на родителя только слабую
//! ссылку. Создание ребёнка идёт через insert-if-absent в карте детей:
//! ровно один поток становится создателем, остальные ждут на барьере
//! инициализации ребёнка.
//!
//! Удаление защищено состоянием узла `Live -> Removing -> Removed`.
//! Условное удаление (авто-удаление после отписки, очистка) переводит узел
//! в `Removing` и только потом перепроверяет пустоту; подписка и создание
//! детей после вставки перепроверяют состояние и откатываются, если узел
//! уже не живой. Так пустой узел не может быть отсоединён одновременно
//! с тем, как в него кто-то вставил подписчика или ребёнка.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;

use super::{
    channel_id::{DEEP_WILD, WILD},
    init::InitBarrier,
    listener::ListenerList,
    Broker, ChannelId, Initializer, Listener, SessionRef,
};
use crate::error::{ChannelError, ChannelResult};

/// Значение счётчика использования у узла, на который никто не подписывался.
pub const NEVER_USED: i32 = -1;

/// Состояние жизненного цикла узла.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    /// Узел подключён к дереву.
    Live = 0,
    /// Узел удаляется; может вернуться в `Live`, если условное удаление
    /// обнаружило новых подписчиков.
    Removing = 1,
    /// Узел отсоединён от дерева и реестра.
    Removed = 2,
}

impl NodeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Live,
            1 => Self::Removing,
            _ => Self::Removed,
        }
    }
}

/// Канал: один узел иерархического дерева.
pub struct ChannelNode {
    id: ChannelId,
    parent: Weak<ChannelNode>,
    broker: Weak<Broker>,
    pub(crate) children: DashMap<Arc<str>, Arc<ChannelNode>>,
    pub(crate) subscribers: DashMap<String, SessionRef>,
    pub(crate) listeners: ListenerList,
    wild: RwLock<Option<Arc<ChannelNode>>>,
    deep_wild: RwLock<Option<Arc<ChannelNode>>>,
    meta: bool,
    service: bool,
    broadcast: bool,
    lazy: AtomicBool,
    persistent: AtomicBool,
    pub(crate) usage: AtomicI32,
    state: AtomicU8,
    /// Запрошено принудительное удаление.
    force_remove: AtomicBool,
    init: InitBarrier,
    init_timeout: Duration,
}

impl ChannelNode {
    fn new(
        broker: Weak<Broker>,
        parent: Weak<ChannelNode>,
        id: ChannelId,
        init_timeout: Duration,
    ) -> Self {
        let meta = id.is_meta();
        let service = id.is_service();
        let broadcast = !meta && !service;
        Self {
            id,
            parent,
            broker,
            children: DashMap::new(),
            subscribers: DashMap::new(),
            listeners: ListenerList::new(),
            wild: RwLock::new(None),
            deep_wild: RwLock::new(None),
            meta,
            service,
            broadcast,
            lazy: AtomicBool::new(false),
            persistent: AtomicBool::new(!broadcast),
            usage: AtomicI32::new(NEVER_USED),
            state: AtomicU8::new(NodeState::Live as u8),
            force_remove: AtomicBool::new(false),
            init: InitBarrier::new(),
            init_timeout,
        }
    }

    /// Корень дерева. Всегда инициализирован и никогда не удаляется.
    pub(crate) fn root(
        broker: Weak<Broker>,
        init_timeout: Duration,
    ) -> Self {
        let root = Self::new(broker, Weak::new(), ChannelId::root(), init_timeout);
        root.persistent.store(true, Ordering::Relaxed);
        root.init.complete();
        root
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn parent(&self) -> Option<Arc<ChannelNode>> {
        self.parent.upgrade()
    }

    pub(crate) fn broker(&self) -> ChannelResult<Arc<Broker>> {
        self.broker.upgrade().ok_or(ChannelError::BrokerClosed)
    }

    pub fn is_meta(&self) -> bool {
        self.meta
    }

    pub fn is_service(&self) -> bool {
        self.service
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    pub fn is_wild(&self) -> bool {
        self.id.is_wild()
    }

    pub fn is_deep_wild(&self) -> bool {
        self.id.is_deep_wild()
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy.load(Ordering::Relaxed)
    }

    pub fn set_lazy(
        &self,
        lazy: bool,
    ) {
        self.lazy.store(lazy, Ordering::Relaxed);
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::SeqCst)
    }

    /// Закрепляет канал (или снимает закрепление). Закреплённые каналы не
    /// удаляются автоматически.
    pub fn set_persistent(
        &self,
        persistent: bool,
    ) {
        self.persistent.store(persistent, Ordering::SeqCst);
    }

    /// Счётчик использования: `-1`, пока никто не подписывался, иначе число
    /// циклов очистки с последней подписки.
    pub fn usage(&self) -> i32 {
        self.usage.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_live(&self) -> bool {
        self.state() == NodeState::Live
    }

    pub fn is_initialized(&self) -> bool {
        self.init.is_complete()
    }

    // --- слушатели ---

    pub fn add_listener(
        &self,
        listener: Listener,
    ) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(
        &self,
        listener: &Listener,
    ) -> bool {
        self.listeners.remove(listener)
    }

    pub fn listeners(&self) -> Arc<Vec<Listener>> {
        self.listeners.snapshot()
    }

    // --- снимки содержимого ---

    /// Снимок текущих подписчиков.
    pub fn subscribers(&self) -> Vec<SessionRef> {
        self.subscribers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_subscribed(
        &self,
        session_id: &str,
    ) -> bool {
        self.subscribers.contains_key(session_id)
    }

    /// Снимок детей.
    pub fn children(&self) -> Vec<Arc<ChannelNode>> {
        self.children.iter().map(|e| e.value().clone()).collect()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(
        &self,
        segment: &str,
    ) -> Option<Arc<ChannelNode>> {
        self.children.get(segment).map(|e| e.value().clone())
    }

    pub(crate) fn wild_child(&self) -> Option<Arc<ChannelNode>> {
        self.wild.read().clone()
    }

    pub(crate) fn deep_wild_child(&self) -> Option<Arc<ChannelNode>> {
        self.deep_wild.read().clone()
    }

    pub(crate) fn is_idle(&self) -> bool {
        !self.is_persistent() && self.subscribers.is_empty() && self.children.is_empty()
    }

    // --- создание ---

    /// Возвращает потомка по пути `id`, создавая недостающие узлы.
    ///
    /// `initializers` применяются только к листу, и только если этот вызов
    /// его создал; если лист уже существует, возвращается
    /// `AlreadyInitialized`. Узел, созданный другим потоком, ожидается на
    /// барьере инициализации не дольше таймаута.
    pub fn get_or_create_child(
        self: &Arc<Self>,
        id: &ChannelId,
        initializers: &[Arc<dyn Initializer>],
    ) -> ChannelResult<Arc<ChannelNode>> {
        if !self.id.is_parent_of(id) {
            return Err(ChannelError::NotAParent {
                parent: self.id.to_string(),
                child: id.to_string(),
            });
        }

        let depth = self.id.depth();
        let Some(next) = id.segment_arc(depth) else {
            return Err(ChannelError::NotAParent {
                parent: self.id.to_string(),
                child: id.to_string(),
            });
        };
        let child_is_leaf = id.depth() - depth == 1;
        let deadline = Instant::now() + self.init_timeout;

        let child = loop {
            let existing = self.children.get(next).map(|e| e.value().clone());
            match existing {
                Some(child) => {
                    if child_is_leaf && !initializers.is_empty() {
                        return Err(ChannelError::AlreadyInitialized {
                            channel: child.id.to_string(),
                        });
                    }
                    child.wait_initialized(deadline)?;
                    if child.is_live() {
                        break child;
                    }
                    // ребёнок удаляется: ждём, пока он освободит место
                    if Instant::now() >= deadline {
                        return Err(self.not_initialized(&child.id));
                    }
                    std::thread::yield_now();
                }
                None => {
                    if let Some(child) =
                        self.try_create_child(id, next, child_is_leaf, initializers)?
                    {
                        break child;
                    }
                }
            }
        };

        if child_is_leaf {
            Ok(child)
        } else {
            child.get_or_create_child(id, initializers)
        }
    }

    /// Пытается вставить нового ребёнка. `Ok(None)`, если гонку выиграл
    /// другой поток.
    fn try_create_child(
        self: &Arc<Self>,
        id: &ChannelId,
        segment: &Arc<str>,
        is_leaf: bool,
        initializers: &[Arc<dyn Initializer>],
    ) -> ChannelResult<Option<Arc<ChannelNode>>> {
        let broker = self.broker()?;
        if broker.is_closed() {
            return Err(ChannelError::BrokerClosed);
        }

        let child_id = id.prefix(self.id.depth() + 1);
        let candidate = Arc::new(ChannelNode::new(
            self.broker.clone(),
            Arc::downgrade(self),
            child_id,
            self.init_timeout,
        ));

        let won = match self.children.entry(segment.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(candidate.clone());
                true
            }
        };
        if !won {
            return Ok(None);
        }

        if !self.is_live() {
            // этот узел отсоединяется: откатываем вставку и будим тех, кто
            // успел увидеть кандидата
            self.children
                .remove_if(segment, |_, v| Arc::ptr_eq(v, &candidate));
            candidate
                .state
                .store(NodeState::Removed as u8, Ordering::SeqCst);
            candidate.init.complete();
            return Err(ChannelError::ChannelRemoved {
                channel: self.id.to_string(),
            });
        }

        self.usage.store(0, Ordering::SeqCst);
        match &**segment {
            WILD => *self.wild.write() = Some(candidate.clone()),
            DEEP_WILD => *self.deep_wild.write() = Some(candidate.clone()),
            _ => {}
        }

        if is_leaf {
            for initializer in initializers {
                initializer.configure_channel(&candidate);
            }
        }
        let listeners = broker.listeners();
        for listener in listeners.iter() {
            if let Listener::Initializer(initializer) = listener {
                initializer.configure_channel(&candidate);
            }
        }
        candidate.init.complete();

        if broker.add_node(&candidate) {
            for listener in broker.listeners().iter() {
                if let Listener::Channel(channel_listener) = listener {
                    channel_listener.channel_added(&candidate);
                }
            }
            tracing::debug!(channel = %candidate.id, "Channel added");
        }
        Ok(Some(candidate))
    }

    fn wait_initialized(
        &self,
        deadline: Instant,
    ) -> ChannelResult<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if self.init.wait(remaining) {
            Ok(())
        } else {
            tracing::warn!(
                channel = %self.id,
                timeout_ms = self.init_timeout.as_millis() as u64,
                "Channel was not initialized in time"
            );
            Err(self.not_initialized(&self.id))
        }
    }

    fn not_initialized(
        &self,
        channel: &ChannelId,
    ) -> ChannelError {
        ChannelError::NotInitialized {
            channel: channel.to_string(),
            timeout: self.init_timeout,
        }
    }

    // --- удаление ---

    /// Принудительно удаляет канал вместе со всем поддеревом, даже если он
    /// закреплён или имеет подписчиков. Подписчики отписываются с
    /// уведомлением слушателей. Повторный вызов ничего не делает.
    ///
    /// Если узел сейчас в `Removing` у условного удаления, запрос
    /// запоминается, и условное удаление доводит его до конца вместо отката.
    ///
    /// У корня удаляются только дети.
    pub fn remove(self: &Arc<Self>) {
        if self.id.is_root() {
            for child in self.children() {
                child.remove();
            }
            return;
        }
        self.force_remove.store(true, Ordering::SeqCst);
        if self
            .state
            .compare_exchange(
                NodeState::Live as u8,
                NodeState::Removing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        self.teardown();
    }

    /// Удаляет канал, только если он не закреплён, без подписчиков и без
    /// детей. Возвращает `true`, если удаление состоялось.
    pub(crate) fn remove_if_idle(self: &Arc<Self>) -> bool {
        if self.id.is_root() || !self.is_idle() {
            return false;
        }
        if self
            .state
            .compare_exchange(
                NodeState::Live as u8,
                NodeState::Removing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return false;
        }
        if !self.is_idle() && !self.force_remove.load(Ordering::SeqCst) {
            self.abort_removal();
            return false;
        }
        self.teardown();
        true
    }

    /// Возвращает узел из `Removing` в `Live`. Если за это время пришёл
    /// `remove()`, удаление всё-таки выполняется.
    fn abort_removal(self: &Arc<Self>) {
        self.state.store(NodeState::Live as u8, Ordering::SeqCst);
        if self.force_remove.load(Ordering::SeqCst) {
            self.remove();
        }
    }

    fn teardown(self: &Arc<Self>) {
        for child in self.children() {
            child.remove();
        }

        // узел мог ещё не попасть в реестр, если его создатель не успел
        // дойти до регистрации; отсоединяем его от дерева в любом случае
        if let Some(broker) = self.broker.upgrade() {
            broker.remove_node(self);
        }

        let mut detached = false;
        if let Some(parent) = self.parent.upgrade() {
            parent.forget_wildcard(self);
            if let Some(segment) = self.id.last_segment() {
                detached = parent
                    .children
                    .remove_if(segment, |_, v| Arc::ptr_eq(v, self))
                    .is_some();
            }
        }
        self.state
            .store(NodeState::Removed as u8, Ordering::SeqCst);

        if detached {
            for session in self.subscribers() {
                self.unsubscribe(&session);
            }
            tracing::debug!(channel = %self.id, "Channel removed");
        }
    }

    fn forget_wildcard(
        &self,
        child: &Arc<ChannelNode>,
    ) {
        let slot = if child.is_deep_wild() {
            &self.deep_wild
        } else if child.is_wild() {
            &self.wild
        } else {
            return;
        };
        let mut guard = slot.write();
        if guard.as_ref().is_some_and(|c| Arc::ptr_eq(c, child)) {
            *guard = None;
        }
    }

    // --- отладка ---

    /// Печатает поддерево в виде ASCII-дерева.
    pub(crate) fn dump(
        &self,
        out: &mut String,
        indent: &str,
    ) {
        out.push_str(self.id.as_str());
        if self.is_lazy() {
            out.push_str(" lazy");
        }
        out.push('\n');

        let mut children = self.children();
        children.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let mut sessions: Vec<String> = self
            .subscribers
            .iter()
            .map(|e| e.key().clone())
            .collect();
        sessions.sort();
        let listeners = self.listeners();

        let leaves = children.len() + sessions.len() + listeners.len();
        let mut i = 0;
        let mut branch = |out: &mut String| {
            i += 1;
            out.push_str(indent);
            out.push_str(" +-");
            if i == leaves {
                format!("{indent}   ")
            } else {
                format!("{indent} | ")
            }
        };

        for child in &children {
            let next = branch(out);
            child.dump(out, &next);
        }
        for session in &sessions {
            branch(out);
            out.push_str(session);
            out.push('\n');
        }
        for listener in listeners.iter() {
            branch(out);
            out.push_str(&format!("{listener:?}\n"));
        }
    }
}

impl fmt::Display for ChannelNode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}

impl fmt::Debug for ChannelNode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ChannelNode")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("persistent", &self.is_persistent())
            .field("usage", &self.usage())
            .field("subscribers", &self.subscriber_count())
            .field("children", &self.child_count())
            .finish()
    }
}
