//! Маршрутизация публикаций.
//!
//! Публикация проходит дерево от корня до целевого канала дважды. Сначала
//! вызываются слушатели сообщений: на каждом уровне у `**`-потомка, на
//! предпоследнем уровне у `*`-потомка, и у самого целевого канала. Любой из
//! них может изменить сообщение или отменить публикацию. Затем, уже с
//! замороженной копией сообщения, тот же обход собирает подписчиков.

use std::sync::Arc;

use serde_json::Value;

use super::{Broker, ChannelId, ChannelNode, Listener, Message, SessionRef, SharedMessage};
use crate::error::{ChannelError, ChannelResult};

/// Итог публикации.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Прошла через слушателей и доставлена подписчикам (которых может и не
    /// быть).
    Delivered,
    /// Отменена слушателем сообщений.
    Vetoed,
    /// Отброшена расширением брокера до маршрутизации.
    Dropped,
    /// Обход не дошёл до целевого канала: он был удалён по дороге.
    Unrouted,
}

impl PublishOutcome {
    pub fn is_delivered(self) -> bool {
        self == Self::Delivered
    }
}

impl ChannelNode {
    /// Публикует сообщение в этот канал. Поле `channel` сообщения всегда
    /// выставляется в путь этого канала.
    ///
    /// Публиковать в wildcard-каналы нельзя.
    pub fn publish(
        self: &Arc<Self>,
        from: Option<&SessionRef>,
        mut message: Message,
    ) -> ChannelResult<PublishOutcome> {
        if self.is_wild() || self.is_deep_wild() {
            return Err(ChannelError::WildPublishNotAllowed {
                channel: self.id().to_string(),
            });
        }
        let broker = self.broker()?;
        if message.channel != self.id().as_str() {
            message.channel = self.id().to_string();
        }

        broker.record_publish();
        if !broker.extend_send(from, &mut message) {
            broker.record_dropped();
            tracing::debug!(channel = %self.id(), "Message dropped by extension");
            return Ok(PublishOutcome::Dropped);
        }

        let outcome = broker.root().do_publish(&broker, from, self, &mut message);
        if outcome == PublishOutcome::Vetoed {
            broker.record_vetoed();
        }
        tracing::trace!(channel = %self.id(), ?outcome, "Published");
        Ok(outcome)
    }

    /// Публикует произвольные данные: сообщение собирается из канала,
    /// идентификатора отправителя и `id`.
    pub fn publish_data(
        self: &Arc<Self>,
        from: Option<&SessionRef>,
        data: Value,
        id: Option<String>,
    ) -> ChannelResult<PublishOutcome> {
        let broker = self.broker()?;
        let mut message = broker.new_message();
        message.channel = self.id().to_string();
        message.client_id = from.map(|s| s.id().to_string());
        message.data = data;
        message.id = id;
        self.publish(from, message)
    }

    /// Фаза слушателей. Вызывается на корне и спускается к `to`.
    pub(crate) fn do_publish(
        self: &Arc<Self>,
        broker: &Broker,
        from: Option<&SessionRef>,
        to: &Arc<ChannelNode>,
        message: &mut Message,
    ) -> PublishOutcome {
        let depth = self.id().depth();
        let tail = to.id().depth() - depth;

        if tail == 0 {
            if self.is_lazy() {
                message.set_lazy(true);
            }
            if !self.notify_message(from, to, message) {
                tracing::trace!(channel = %to.id(), "Message vetoed");
                return PublishOutcome::Vetoed;
            }

            let frozen = message.freeze();
            broker.root().do_subscribers(from, to.id(), &frozen);

            if self.is_meta() {
                for listener in self.listeners.snapshot().iter() {
                    if let Listener::Handler(handler) = listener {
                        handler.on_message(from, message);
                    }
                }
            }
            return PublishOutcome::Delivered;
        }

        if tail == 1 {
            if let Some(wild) = self.wild_child() {
                if wild.is_lazy() {
                    message.set_lazy(true);
                }
                if !wild.notify_message(from, to, message) {
                    return PublishOutcome::Vetoed;
                }
            }
        }

        if let Some(deep) = self.deep_wild_child() {
            if deep.is_lazy() {
                message.set_lazy(true);
            }
            if !deep.notify_message(from, to, message) {
                return PublishOutcome::Vetoed;
            }
        }

        match to.id().segment(depth).and_then(|seg| self.child(seg)) {
            Some(next) => next.do_publish(broker, from, to, message),
            None => PublishOutcome::Unrouted,
        }
    }

    /// Фаза доставки. Вызывается на корне и спускается к `to`.
    pub(crate) fn do_subscribers(
        &self,
        from: Option<&SessionRef>,
        to: &ChannelId,
        message: &SharedMessage,
    ) {
        let depth = self.id().depth();
        let tail = to.depth() - depth;

        if tail == 0 {
            deliver(&self.subscribers(), from, message);
            return;
        }

        if tail == 1 {
            if let Some(wild) = self.wild_child() {
                deliver(&wild.subscribers(), from, message);
            }
        }

        if let Some(deep) = self.deep_wild_child() {
            deliver(&deep.subscribers(), from, message);
        }

        if let Some(next) = to.segment(depth).and_then(|seg| self.child(seg)) {
            next.do_subscribers(from, to, message);
        }
    }

    fn notify_message(
        &self,
        from: Option<&SessionRef>,
        to: &Arc<ChannelNode>,
        message: &mut Message,
    ) -> bool {
        for listener in self.listeners.snapshot().iter() {
            if let Listener::Message(l) = listener {
                if !l.on_message(from, to, message) {
                    return false;
                }
            }
        }
        true
    }
}

fn deliver(
    sessions: &[SessionRef],
    from: Option<&SessionRef>,
    message: &SharedMessage,
) {
    for session in sessions {
        session.deliver(from, message);
    }
}
