use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки клиентских команд шлюза.
///
/// Возвращаются синхронно только тому соединению, которое отправило
/// команду.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// В команде подписки/отписки не указан `assetId`
    #[error("assetId is required")]
    MissingAssetId,
    /// Команда пришла от соединения, которого уже нет в реестре
    #[error("client {0} is not connected")]
    UnknownClient(u32),
    /// Кадр не удалось разобрать
    #[error("malformed command: {0}")]
    Malformed(String),
}

impl ErrorExt for CommandError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAssetId => StatusCode::InvalidArgs,
            Self::UnknownClient(_) => StatusCode::ConnectionClosed,
            Self::Malformed(_) => StatusCode::ParseError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что сообщение для клиента совпадает с текстом
    /// протокола.
    #[test]
    fn test_missing_asset_id_client_message() {
        let err = CommandError::MissingAssetId;
        assert_eq!(err.client_message(), "assetId is required");
        assert!(err.status_code().is_client_error());
    }
}
