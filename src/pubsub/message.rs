use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Сообщение шины.
///
/// Во время применения слушателей сообщение передаётся как `&mut Message`
/// и может изменяться. Перед доставкой подписчикам маршрутизатор один раз
/// снимает неизменяемый снимок [`SharedMessage`]; после этого ядро
/// сообщение уже не меняет.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Путь канала назначения.
    pub channel: String,
    /// Идентификатор сессии-отправителя.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Полезная нагрузка.
    #[serde(default)]
    pub data: Value,
    /// Идентификатор сообщения.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Ленивая доставка: транспорт может придержать сообщение до следующей
    /// отправки.
    #[serde(skip)]
    pub lazy: bool,
}

/// Неизменяемый снимок сообщения, разделяемый между всеми получателями.
pub type SharedMessage = Arc<Message>;

impl Message {
    pub fn new(
        channel: impl Into<String>,
        data: impl Into<Value>,
    ) -> Self {
        Self {
            channel: channel.into(),
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_id(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_client_id(
        mut self,
        client_id: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn set_lazy(
        &mut self,
        lazy: bool,
    ) {
        self.lazy = lazy;
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Снимает неизменяемую копию для доставки.
    pub fn freeze(&self) -> SharedMessage {
        Arc::new(self.clone())
    }
}
