//! Периодическая очистка дерева каналов.
//!
//! Проход идёт в глубину, дети раньше родителя. На каждом узле снимаются
//! подписки сессий, потерявших рукопожатие, и увеличивается счётчик
//! использования. Незакреплённый пустой узел, переживший два прохода
//! подряд, удаляется. Узлы, на которые никто никогда не подписывался
//! (счётчик `-1`), очисткой не удаляются.

use std::{
    sync::{atomic::Ordering, Arc, Weak},
    time::Duration,
};

use tokio::{task::JoinHandle, time::interval};

use super::{Broker, ChannelNode};

/// Число проходов, после которого пустой канал удаляется.
pub const SWEEP_THRESHOLD: i32 = 2;

/// Итог одного прохода очистки.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub visited: usize,
    pub pruned_subscriptions: usize,
    pub removed_channels: usize,
}

impl ChannelNode {
    pub(crate) fn do_sweep(
        self: &Arc<Self>,
        report: &mut SweepReport,
    ) {
        for child in self.children() {
            child.do_sweep(report);
        }
        report.visited += 1;

        for session in self.subscribers() {
            if !session.is_handshook() {
                self.unsubscribe(&session);
                report.pruned_subscriptions += 1;
            }
        }

        let usage = self
            .usage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |u| {
                (u >= 0).then_some(u + 1)
            })
            .map(|prev| prev + 1)
            .unwrap_or_else(|current| current);

        if usage >= SWEEP_THRESHOLD && self.is_idle() && self.remove_if_idle() {
            report.removed_channels += 1;
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внешние функции
////////////////////////////////////////////////////////////////////////////////

/// Запускает фоновую задачу, которая раз в `sweep_interval` вызывает
/// [`Broker::sweep`].
///
/// Задача держит на брокер слабую ссылку и завершается сама, когда брокер
/// освобождён или закрыт. Возвращённый `JoinHandle` позволяет отменить её
/// раньше.
pub fn spawn_sweeper(
    broker: &Arc<Broker>,
    sweep_interval: Duration,
) -> JoinHandle<()> {
    let broker: Weak<Broker> = Arc::downgrade(broker);
    tokio::spawn(async move {
        let mut ticker = interval(sweep_interval);
        // первый тик interval срабатывает сразу
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(broker) = broker.upgrade() else {
                break;
            };
            if broker.is_closed() {
                break;
            }

            let report = broker.sweep();
            if report.pruned_subscriptions > 0 || report.removed_channels > 0 {
                tracing::debug!(
                    pruned = report.pruned_subscriptions,
                    removed = report.removed_channels,
                    "Sweep finished"
                );
            }
        }
        tracing::debug!("Sweeper stopped");
    })
}
