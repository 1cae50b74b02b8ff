//! Подписка и отписка сессий на канал.

use std::sync::{atomic::Ordering, Arc};

use dashmap::mapref::entry::Entry;

use super::{ChannelNode, Listener, SessionRef};
use crate::error::{ChannelError, ChannelResult};

impl ChannelNode {
    /// Подписывает сессию на канал.
    ///
    /// `Ok(false)`, если сессия ещё не прошла handshake: состояние при этом
    /// не меняется. Повторная подписка возвращает `Ok(true)` без уведомлений.
    /// `ChannelRemoved`, если канал был отсоединён от дерева; в этом случае
    /// подписку надо повторить на актуальном узле.
    pub fn subscribe(
        self: &Arc<Self>,
        session: &SessionRef,
    ) -> ChannelResult<bool> {
        if !session.is_handshook() {
            tracing::trace!(
                channel = %self.id(),
                session = session.id(),
                "Subscription rejected: session is not handshook"
            );
            return Ok(false);
        }

        let inserted = match self.subscribers.entry(session.id().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                true
            }
        };

        if !self.is_live() {
            if inserted {
                self.subscribers
                    .remove_if(session.id(), |_, s| Arc::ptr_eq(s, session));
            }
            return Err(ChannelError::ChannelRemoved {
                channel: self.id().to_string(),
            });
        }

        if !inserted {
            return Ok(true);
        }

        self.usage.store(0, Ordering::SeqCst);
        session.subscribed_to(self);
        self.notify_subscription(session, true);

        tracing::debug!(channel = %self.id(), session = session.id(), "Subscribed");
        Ok(true)
    }

    /// Отписывает сессию. Если сессия действительно была подписана,
    /// уведомляет слушателей и удаляет опустевший незакреплённый канал.
    /// Сессии сообщается об отписке в любом случае.
    pub fn unsubscribe(
        self: &Arc<Self>,
        session: &SessionRef,
    ) {
        let removed = self.subscribers.remove(session.id()).is_some();
        if removed {
            self.notify_subscription(session, false);
            tracing::debug!(channel = %self.id(), session = session.id(), "Unsubscribed");

            if self.is_idle() {
                self.remove_if_idle();
            }
        }
        session.unsubscribed_to(self);
    }

    fn notify_subscription(
        self: &Arc<Self>,
        session: &SessionRef,
        subscribed: bool,
    ) {
        let local = self.listeners.snapshot();
        let global = match self.broker() {
            Ok(broker) => broker.listeners(),
            Err(_) => Arc::default(),
        };
        for listener in local.iter().chain(global.iter()) {
            if let Listener::Subscription(l) = listener {
                if subscribed {
                    l.subscribed(session, self);
                } else {
                    l.unsubscribed(session, self);
                }
            }
        }
    }
}
