use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки хранилища телеметрии.
///
/// `Unavailable` всегда пробрасывается вызывающему. `Corrupted` на чтении
/// превращается в отсутствие значения и только логируется.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Бэкенд недоступен (нет соединения, таймаут сокета и т.п.)
    #[error("storage backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },
    /// Сохранённое значение не удалось разобрать
    #[error("corrupted payload at '{key}': {reason}")]
    Corrupted { key: String, reason: String },
    /// Не удалось сериализовать запись перед записью
    #[error("failed to serialize {type_name}: {reason}")]
    Serialization { type_name: String, reason: String },
    /// Ключ хранит значение другого типа (например, строку вместо множества)
    #[error("wrong type for key '{key}': expected {expected}")]
    WrongType { key: String, expected: String },
}

impl StoreError {
    pub fn unavailable(
        backend: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }
}

impl ErrorExt for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unavailable { .. } => StatusCode::StorageUnavailable,
            Self::Corrupted { .. } => StatusCode::CorruptedData,
            Self::Serialization { .. } => StatusCode::SerializationFailed,
            Self::WrongType { .. } => StatusCode::InvalidData,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
