use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки проверки входящих данных телеметрии.
///
/// Покрывают как инварианты записей (курс, кватернион, заряд), так и
/// структуру конверта, пришедшего по шине от продюсера.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("heading must be in [0, 360), got {0}")]
    HeadingOutOfRange(f64),
    #[error("rotation quaternion must be normalized, norm is {0}")]
    QuaternionNotNormalized(f64),
    #[error("current speed cannot be negative, got {0}")]
    NegativeSpeed(f64),
    #[error("battery level must be in [0, 100], got {0}")]
    BatteryOutOfRange(f64),
    #[error("current load cannot be negative, got {0}")]
    NegativeLoad(f64),
    #[error("rotation needs all of qx, qy, qz and qw")]
    PartialRotation,
    #[error("value of '{field}' is not a finite number")]
    NotFinite { field: &'static str },
    #[error("change event has no asset id")]
    MissingAssetId,
    #[error("change event for '{asset_id}' has no payload")]
    MissingPayload { asset_id: String },
    #[error("invalid payload for '{asset_id}': {reason}")]
    InvalidPayload { asset_id: String, reason: String },
    #[error("unknown change channel '{0}'")]
    UnknownChannel(String),
}

impl ErrorExt for ValidationError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAssetId | Self::MissingPayload { .. } | Self::InvalidPayload { .. } => {
                StatusCode::InvalidData
            }
            Self::UnknownChannel(_) => StatusCode::NotFound,
            _ => StatusCode::InvalidValue,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
