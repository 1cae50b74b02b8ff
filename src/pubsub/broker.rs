use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use dashmap::{mapref::entry::Entry, DashMap};
use serde_json::Value;

use super::{
    extension::ExtensionChain, init::DEFAULT_INIT_TIMEOUT, listener::ListenerList, ChannelId,
    ChannelNode, Extension, Initializer, Listener, Message, PublishOutcome, SessionRef,
    SweepReport,
};
use crate::error::{ChannelError, ChannelResult};

/// Интервал очистки по умолчанию.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Настройки брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Сколько ждать чужой инициализации канала.
    pub init_timeout: Duration,
    /// Период фоновой очистки.
    pub sweep_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            init_timeout: DEFAULT_INIT_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Снимок счётчиков брокера.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BrokerStats {
    pub channels: usize,
    pub publishes: usize,
    pub dropped: usize,
    pub vetoed: usize,
    pub listeners: usize,
    pub extensions: usize,
}

/// Брокер каналов.
///
/// Владеет корнем дерева и плоским реестром всех созданных каналов
/// (`путь -> узел`), хранит глобальных слушателей и расширения.
/// Поддерживает:
/// - Иерархические каналы с `*` и `**`
/// - Ленивое создание каналов с инициализаторами
/// - Автоматическое удаление пустых каналов
/// - Статистику публикаций
pub struct Broker {
    root: Arc<ChannelNode>,
    /// Все созданные каналы, кроме корня
    channels: DashMap<ChannelId, Arc<ChannelNode>>,
    listeners: ListenerList,
    extensions: ExtensionChain,
    config: BrokerConfig,
    closed: AtomicBool,
    /// Общее количество вызовов `publish`
    pub publish_count: AtomicUsize,
    /// Публикации, отброшенные расширениями
    pub dropped_count: AtomicUsize,
    /// Публикации, отменённые слушателями
    pub vetoed_count: AtomicUsize,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            root: Arc::new(ChannelNode::root(me.clone(), config.init_timeout)),
            channels: DashMap::new(),
            listeners: ListenerList::new(),
            extensions: ExtensionChain::default(),
            config,
            closed: AtomicBool::new(false),
            publish_count: AtomicUsize::new(0),
            dropped_count: AtomicUsize::new(0),
            vetoed_count: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn root(&self) -> &Arc<ChannelNode> {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Реестр
    ////////////////////////////////////////////////////////////////////////////

    /// Ищет существующий канал, ничего не создавая.
    pub fn get_channel(
        &self,
        path: &str,
    ) -> Option<Arc<ChannelNode>> {
        let id = ChannelId::parse(path).ok()?;
        if id.is_root() {
            return Some(self.root.clone());
        }
        self.channels.get(&id).map(|e| e.value().clone())
    }

    /// Возвращает канал, создавая его и недостающих предков.
    pub fn channel(
        &self,
        path: &str,
    ) -> ChannelResult<Arc<ChannelNode>> {
        self.create_channel(path, &[])
    }

    /// Создаёт канал и применяет к нему `initializers` до того, как он
    /// станет виден другим потокам. Если канал уже существует и
    /// инициализаторы переданы, возвращает `AlreadyInitialized`.
    pub fn create_channel(
        &self,
        path: &str,
        initializers: &[Arc<dyn Initializer>],
    ) -> ChannelResult<Arc<ChannelNode>> {
        let id = ChannelId::parse(path)?;
        self.resolve(&id, initializers)
    }

    /// Создаёт канал, если его ещё нет. `Ok(true)`, если канал создан
    /// этим вызовом и инициализаторы применены.
    pub fn create_channel_if_absent(
        &self,
        path: &str,
        initializers: &[Arc<dyn Initializer>],
    ) -> ChannelResult<bool> {
        let id = ChannelId::parse(path)?;
        if id.is_root() || self.channels.contains_key(&id) {
            return Ok(false);
        }
        let created = Arc::new(AtomicBool::new(false));
        let marker = created.clone();
        let mut initializers = initializers.to_vec();
        initializers.push(super::initializer(move |_| {
            marker.store(true, Ordering::SeqCst);
        }));
        match self.resolve(&id, &initializers) {
            Ok(_) => Ok(created.load(Ordering::SeqCst)),
            Err(ChannelError::AlreadyInitialized { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Спускается от корня к `id`. Если по дороге встретился удаляемый
    /// узел, обход начинается заново.
    fn resolve(
        &self,
        id: &ChannelId,
        initializers: &[Arc<dyn Initializer>],
    ) -> ChannelResult<Arc<ChannelNode>> {
        if id.is_root() {
            if !initializers.is_empty() {
                return Err(ChannelError::AlreadyInitialized {
                    channel: id.to_string(),
                });
            }
            return Ok(self.root.clone());
        }

        let deadline = Instant::now() + self.config.init_timeout;
        loop {
            if self.is_closed() {
                return Err(ChannelError::BrokerClosed);
            }
            match self.root.get_or_create_child(id, initializers) {
                Err(e @ ChannelError::ChannelRemoved { .. }) => {
                    if Instant::now() >= deadline {
                        return Err(e);
                    }
                    tracing::trace!(channel = %id, "Retrying after concurrent removal");
                    std::thread::yield_now();
                }
                other => return other,
            }
        }
    }

    /// Снимок всех каналов реестра.
    pub fn channels(&self) -> Vec<Arc<ChannelNode>> {
        self.channels.iter().map(|e| e.value().clone()).collect()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub(crate) fn add_node(
        &self,
        node: &Arc<ChannelNode>,
    ) -> bool {
        let added = match self.channels.entry(node.id().clone()) {
            // прежний узел с этим путём уже отсоединён от дерева, но его
            // создатель ещё не успел убрать свою запись
            Entry::Occupied(mut slot) if !slot.get().is_live() => {
                slot.insert(node.clone());
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(node.clone());
                true
            }
        };
        // узел могли удалить между открытием барьера и регистрацией
        if added && !node.is_live() {
            self.channels
                .remove_if(node.id(), |_, v| Arc::ptr_eq(v, node));
            return false;
        }
        added
    }

    pub(crate) fn remove_node(
        &self,
        node: &Arc<ChannelNode>,
    ) -> bool {
        let removed = self
            .channels
            .remove_if(node.id(), |_, v| Arc::ptr_eq(v, node))
            .is_some();
        if removed {
            for listener in self.listeners.snapshot().iter() {
                if let Listener::Channel(l) = listener {
                    l.channel_removed(node.id());
                }
            }
        }
        removed
    }

    ////////////////////////////////////////////////////////////////////////////
    // Слушатели и расширения
    ////////////////////////////////////////////////////////////////////////////

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

    pub fn add_extension(
        &self,
        extension: Arc<dyn Extension>,
    ) {
        self.extensions.add(extension);
    }

    pub fn remove_extension(
        &self,
        extension: &Arc<dyn Extension>,
    ) -> bool {
        self.extensions.remove(extension)
    }

    pub(crate) fn extend_send(
        &self,
        from: Option<&SessionRef>,
        message: &mut Message,
    ) -> bool {
        self.extensions.send(from, message)
    }

    pub fn new_message(&self) -> Message {
        Message::default()
    }

    ////////////////////////////////////////////////////////////////////////////
    // Подписки и публикации
    ////////////////////////////////////////////////////////////////////////////

    /// Подписывает сессию на канал по пути, создавая канал при
    /// необходимости. `Ok(false)` без побочных эффектов, если сессия не
    /// прошла рукопожатие.
    pub fn subscribe(
        &self,
        session: &SessionRef,
        path: &str,
    ) -> ChannelResult<bool> {
        if !session.is_handshook() {
            return Ok(false);
        }
        let id = ChannelId::parse(path)?;
        let deadline = Instant::now() + self.config.init_timeout;
        loop {
            let node = self.resolve(&id, &[])?;
            match node.subscribe(session) {
                Err(e @ ChannelError::ChannelRemoved { .. }) => {
                    if Instant::now() >= deadline {
                        return Err(e);
                    }
                    std::thread::yield_now();
                }
                other => return other,
            }
        }
    }

    /// Отписывает сессию от канала, если он существует.
    pub fn unsubscribe(
        &self,
        session: &SessionRef,
        path: &str,
    ) -> ChannelResult<()> {
        let id = ChannelId::parse(path)?;
        let node = if id.is_root() {
            Some(self.root.clone())
        } else {
            self.channels.get(&id).map(|e| e.value().clone())
        };
        if let Some(node) = node {
            node.unsubscribe(session);
        }
        Ok(())
    }

    /// Публикует данные в канал по пути, создавая канал при необходимости.
    pub fn publish(
        &self,
        from: Option<&SessionRef>,
        path: &str,
        data: Value,
    ) -> ChannelResult<PublishOutcome> {
        let id = ChannelId::parse(path)?;
        if id.is_wildcard() {
            return Err(ChannelError::WildPublishNotAllowed {
                channel: id.to_string(),
            });
        }
        let node = self.resolve(&id, &[])?;
        node.publish_data(from, data, None)
    }

    /// Публикует готовое сообщение в канал из `message.channel`.
    pub fn publish_message(
        &self,
        from: Option<&SessionRef>,
        message: Message,
    ) -> ChannelResult<PublishOutcome> {
        let id = ChannelId::parse(&message.channel)?;
        if id.is_wildcard() {
            return Err(ChannelError::WildPublishNotAllowed {
                channel: id.to_string(),
            });
        }
        let node = self.resolve(&id, &[])?;
        node.publish(from, message)
    }

    pub(crate) fn record_publish(&self) {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_vetoed(&self) {
        self.vetoed_count.fetch_add(1, Ordering::Relaxed);
    }

    ////////////////////////////////////////////////////////////////////////////
    // Обслуживание
    ////////////////////////////////////////////////////////////////////////////

    /// Один проход очистки по всему дереву. После обхода из пула сегментов
    /// убираются сегменты удалённых каналов.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        self.root.do_sweep(&mut report);
        let purged = super::intern::purge_unused();
        tracing::trace!(
            visited = report.visited,
            pruned = report.pruned_subscriptions,
            removed = report.removed_channels,
            purged_segments = purged,
            "Sweep pass"
        );
        report
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            channels: self.channels.len(),
            publishes: self.publish_count.load(Ordering::Relaxed),
            dropped: self.dropped_count.load(Ordering::Relaxed),
            vetoed: self.vetoed_count.load(Ordering::Relaxed),
            listeners: self.listeners.len(),
            extensions: self.extensions.len(),
        }
    }

    /// Текстовый дамп дерева каналов.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.root.dump(&mut out, "");
        out
    }

    /// Закрывает брокер: создание каналов больше невозможно, все каналы
    /// удаляются с отпиской подписчиков, слушатели и расширения снимаются.
    /// Повторный вызов ничего не делает.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.root.remove();
        self.listeners.clear();
        self.extensions.clear();
        tracing::info!("Broker shut down");
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
