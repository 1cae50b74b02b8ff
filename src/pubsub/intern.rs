use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Пул для повторного использования `Arc<str>` по одинаковым сегментам путей.
///
/// Сегменты вроде `meta`, `chat`, `*` повторяются в тысячах путей, поэтому
/// каждый сегмент хранится в процессе ровно один раз. Сегменты удалённых
/// каналов вычищаются `purge_unused`.
static SEGMENT_INTERN: Lazy<DashMap<Box<str>, Arc<str>>> = Lazy::new(DashMap::new);

/// Возвращает interned `Arc<str>` для сегмента пути.
#[inline]
pub(crate) fn intern_segment<S: AsRef<str>>(segment: S) -> Arc<str> {
    let key = segment.as_ref();
    if let Some(existing) = SEGMENT_INTERN.get(key) {
        return existing.clone();
    }
    SEGMENT_INTERN
        .entry(Box::from(key))
        .or_insert_with(|| Arc::from(key))
        .clone()
}

/// Убирает из пула сегменты, на которые больше никто не ссылается.
/// Возвращает количество убранных записей.
pub(crate) fn purge_unused() -> usize {
    let before = SEGMENT_INTERN.len();
    SEGMENT_INTERN.retain(|_, segment| Arc::strong_count(segment) > 1);
    before.saturating_sub(SEGMENT_INTERN.len())
}

#[cfg(test)]
pub(crate) fn is_interned(segment: &str) -> bool {
    SEGMENT_INTERN.contains_key(segment)
}
