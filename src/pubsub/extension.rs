//! Расширения брокера: перехватчики исходящих публикаций.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{Message, SessionRef};

/// Перехватчик, через который проходит каждая публикация до маршрутизации.
/// Может изменить сообщение; `false` отбрасывает его.
pub trait Extension: Send + Sync {
    fn send(
        &self,
        from: Option<&SessionRef>,
        message: &mut Message,
    ) -> bool;
}

impl<F> Extension for F
where
    F: Fn(Option<&SessionRef>, &mut Message) -> bool + Send + Sync,
{
    fn send(
        &self,
        from: Option<&SessionRef>,
        message: &mut Message,
    ) -> bool {
        self(from, message)
    }
}

/// Оборачивает замыкание в расширение.
pub fn extension<F>(f: F) -> Arc<dyn Extension>
where
    F: Fn(Option<&SessionRef>, &mut Message) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
pub(crate) struct ExtensionChain {
    inner: RwLock<Arc<Vec<Arc<dyn Extension>>>>,
}

impl ExtensionChain {
    pub(crate) fn add(
        &self,
        extension: Arc<dyn Extension>,
    ) {
        let mut guard = self.inner.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(extension);
        *guard = Arc::new(next);
    }

    pub(crate) fn remove(
        &self,
        extension: &Arc<dyn Extension>,
    ) -> bool {
        let mut guard = self.inner.write();
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|e| !Arc::ptr_eq(*e, extension))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = Arc::default();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Прогоняет сообщение через цепочку в порядке добавления.
    pub(crate) fn send(
        &self,
        from: Option<&SessionRef>,
        message: &mut Message,
    ) -> bool {
        let chain = self.inner.read().clone();
        chain.iter().all(|ext| ext.send(from, message))
    }
}
