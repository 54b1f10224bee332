use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки шины изменений.
///
/// Никогда не пробрасываются другим подписчикам: публикация логирует и
/// забывает, подписчик отбрасывает битое сообщение и читает дальше.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Не удалось сериализовать событие перед публикацией
    #[error("failed to encode message for channel '{channel}': {reason}")]
    Encode { channel: String, reason: String },
    /// Входящее сообщение не является корректным JSON-конвертом
    #[error("malformed message on channel '{channel}': {reason}")]
    Malformed { channel: String, reason: String },
    /// Подписчик отстал и пропустил сообщения
    #[error("subscriber lagged behind by {skipped} messages")]
    Lagged { skipped: u64 },
    /// Канал закрыт
    #[error("channel is closed")]
    Closed,
    /// Невалидный glob-шаблон подписки
    #[error("invalid subscription pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ErrorExt for BusError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Encode { .. } => StatusCode::SerializationFailed,
            Self::Malformed { .. } => StatusCode::DeserializationFailed,
            Self::Lagged { .. } => StatusCode::Lagged,
            Self::Closed => StatusCode::ConnectionClosed,
            Self::InvalidPattern { .. } => StatusCode::InvalidArgs,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
