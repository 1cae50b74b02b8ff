//! Иерархический адрес канала.
//!
//! `ChannelId` хранит исходную строку пути и её сегменты. Сегменты
//! интернируются, поэтому клонирование и сравнение дешёвые. Значение
//! неизменяемо и может свободно разделяться между потоками.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use super::intern::intern_segment;
use crate::error::{ChannelError, ChannelResult};

/// Сегмент одноуровневого wildcard-канала.
pub const WILD: &str = "*";
/// Сегмент глубокого wildcard-канала.
pub const DEEP_WILD: &str = "**";
/// Первый сегмент служебных протокольных каналов.
pub const META: &str = "meta";
/// Первый сегмент сервисных каналов.
pub const SERVICE: &str = "service";

/// Путь канала: `/`, `/chat/room1`, `/chat/*`, `/meta/handshake`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    path: Arc<str>,
    segments: Arc<[Arc<str>]>,
}

impl ChannelId {
    /// Корневой путь `/` глубины 0.
    pub fn root() -> Self {
        Self {
            path: intern_segment("/"),
            segments: Arc::from(Vec::new()),
        }
    }

    /// Разбирает строку пути.
    ///
    /// Путь обязан начинаться с `/`, не может содержать пустых сегментов
    /// и завершающего `/`; `*` и `**` допустимы только последним сегментом.
    pub fn parse(path: &str) -> ChannelResult<Self> {
        if path.is_empty() {
            return Err(ChannelError::invalid_path(path, "path is empty"));
        }
        let Some(rest) = path.strip_prefix('/') else {
            return Err(ChannelError::invalid_path(path, "path must start with '/'"));
        };
        if rest.is_empty() {
            return Ok(Self::root());
        }

        let parts: Vec<&str> = rest.split('/').collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                let reason = if i == last {
                    "trailing '/' is not allowed"
                } else {
                    "empty segment"
                };
                return Err(ChannelError::invalid_path(path, reason));
            }
            if i != last && (*part == WILD || *part == DEEP_WILD) {
                return Err(ChannelError::invalid_path(
                    path,
                    "wildcard must be the last segment",
                ));
            }
            segments.push(intern_segment(part));
        }

        Ok(Self {
            path: Arc::from(path),
            segments: Arc::from(segments),
        })
    }

    /// Полный путь в виде строки.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Количество сегментов. У корня 0.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Сегмент с индексом `i` (с нуля).
    pub fn segment(
        &self,
        i: usize,
    ) -> Option<&str> {
        self.segments.get(i).map(|s| &**s)
    }

    pub(crate) fn segment_arc(
        &self,
        i: usize,
    ) -> Option<&Arc<str>> {
        self.segments.get(i)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| &**s)
    }

    /// Последний сегмент; `None` у корня.
    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(|s| &**s)
    }

    /// `true`, если `other` лежит строго глубже и начинается с тех же
    /// сегментов.
    pub fn is_parent_of(
        &self,
        other: &ChannelId,
    ) -> bool {
        self.depth() < other.depth()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    /// Предок глубины `depth`; для `depth >= self.depth()` возвращает копию.
    pub fn prefix(
        &self,
        depth: usize,
    ) -> ChannelId {
        if depth >= self.depth() {
            return self.clone();
        }
        if depth == 0 {
            return Self::root();
        }
        let segments: Vec<Arc<str>> = self.segments[..depth].to_vec();
        let mut path = String::with_capacity(self.path.len());
        for s in &segments {
            path.push('/');
            path.push_str(s);
        }
        Self {
            path: Arc::from(path),
            segments: Arc::from(segments),
        }
    }

    /// Непосредственный родитель; `None` у корня.
    pub fn parent(&self) -> Option<ChannelId> {
        (!self.is_root()).then(|| self.prefix(self.depth() - 1))
    }

    /// Одноуровневый wildcard: последний сегмент `*`.
    pub fn is_wild(&self) -> bool {
        self.last_segment() == Some(WILD)
    }

    /// Глубокий wildcard: последний сегмент `**`.
    pub fn is_deep_wild(&self) -> bool {
        self.last_segment() == Some(DEEP_WILD)
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_wild() || self.is_deep_wild()
    }

    pub fn is_meta(&self) -> bool {
        self.segment(0) == Some(META)
    }

    pub fn is_service(&self) -> bool {
        self.segment(0) == Some(SERVICE)
    }

    /// Обычный широковещательный канал: не meta и не service.
    pub fn is_broadcast(&self) -> bool {
        !self.is_meta() && !self.is_service()
    }

    /// Проверяет, подходит ли конкретный путь под этот адрес с учётом
    /// wildcard-сегментов.
    pub fn matches(
        &self,
        channel: &ChannelId,
    ) -> bool {
        if self.is_deep_wild() {
            let base = self.depth() - 1;
            channel.depth() > base && self.segments[..base] == channel.segments[..base]
        } else if self.is_wild() {
            let base = self.depth() - 1;
            channel.depth() == self.depth() && self.segments[..base] == channel.segments[..base]
        } else {
            self == channel
        }
    }
}

impl PartialEq for ChannelId {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.path == other.path
    }
}

impl Eq for ChannelId {}

impl std::hash::Hash for ChannelId {
    fn hash<H: std::hash::Hasher>(
        &self,
        state: &mut H,
    ) {
        self.path.hash(state);
    }
}

impl fmt::Display for ChannelId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ChannelId({})", self.path)
    }
}

impl FromStr for ChannelId {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for ChannelId {
    type Error = ChannelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.path.to_string()
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.path
    }
}
