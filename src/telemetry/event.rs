use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{epoch_millis, from_epoch_millis, PositionRecord, StateRecord};
use crate::error::ValidationError;

/// Global channel announcing position writes.
pub const POSITION_CHANNEL: &str = "telemetry:position:update";
/// Global channel announcing state writes.
pub const STATE_CHANNEL: &str = "telemetry:state:update";
/// Catch-all per-asset channel.
pub const ALL_ASSETS_CHANNEL: &str = "asset:all:updates";

/// Per-asset channel name: `asset:<id>:updates`.
pub fn asset_channel(asset_id: &str) -> String {
    format!("asset:{asset_id}:updates")
}

/// Which half of the telemetry an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Position,
    State,
}

/// Validated payload of a change announcement.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangePayload {
    Position(PositionRecord),
    State(StateRecord),
}

/// A write announcement after it passed the schema check.
///
/// `timestamp` is the publish instant, not the telemetry's own timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub asset_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: ChangePayload,
}

/// Raw JSON form carried on the bus: `{assetId, position|state, timestamp}`.
///
/// Everything is optional here because producers are untrusted; the
/// envelope becomes a [`ChangeEvent`] only through [`ChangeEnvelope::into_event`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ChangeKind {
    pub fn channel(self) -> &'static str {
        match self {
            ChangeKind::Position => POSITION_CHANNEL,
            ChangeKind::State => STATE_CHANNEL,
        }
    }

    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            POSITION_CHANNEL => Some(ChangeKind::Position),
            STATE_CHANNEL => Some(ChangeKind::State),
            _ => None,
        }
    }
}

impl ChangePayload {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangePayload::Position(_) => ChangeKind::Position,
            ChangePayload::State(_) => ChangeKind::State,
        }
    }
}

impl ChangeEvent {
    pub fn position(
        asset_id: impl Into<String>,
        record: PositionRecord,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            timestamp: Utc::now(),
            payload: ChangePayload::Position(record),
        }
    }

    pub fn state(
        asset_id: impl Into<String>,
        record: StateRecord,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            timestamp: Utc::now(),
            payload: ChangePayload::State(record),
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.payload.kind()
    }
}

impl ChangeEnvelope {
    /// Builds the wire envelope for a validated event.
    pub fn from_event(event: &ChangeEvent) -> Result<Self, serde_json::Error> {
        let mut envelope = ChangeEnvelope {
            asset_id: Some(event.asset_id.clone()),
            timestamp: Some(epoch_millis(event.timestamp)),
            ..Default::default()
        };
        match &event.payload {
            ChangePayload::Position(p) => envelope.position = Some(serde_json::to_value(p)?),
            ChangePayload::State(s) => envelope.state = Some(serde_json::to_value(s)?),
        }
        Ok(envelope)
    }

    /// Schema check: a non-empty asset id and a payload of the given kind that
    /// parses into a valid record. A missing envelope timestamp falls back to
    /// the receive instant.
    pub fn into_event(
        self,
        kind: ChangeKind,
    ) -> Result<ChangeEvent, ValidationError> {
        let asset_id = match self.asset_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(ValidationError::MissingAssetId),
        };

        let raw = match kind {
            ChangeKind::Position => self.position,
            ChangeKind::State => self.state,
        };
        let raw = match raw {
            Some(Value::Null) | None => {
                return Err(ValidationError::MissingPayload { asset_id });
            }
            Some(v) => v,
        };

        let invalid = |e: serde_json::Error| ValidationError::InvalidPayload {
            asset_id: asset_id.clone(),
            reason: e.to_string(),
        };
        let payload = match kind {
            ChangeKind::Position => ChangePayload::Position(serde_json::from_value(raw).map_err(invalid)?),
            ChangeKind::State => ChangePayload::State(serde_json::from_value(raw).map_err(invalid)?),
        };

        let timestamp = match self.timestamp {
            Some(ms) => from_epoch_millis(ms)?,
            None => Utc::now(),
        };

        Ok(ChangeEvent {
            asset_id,
            timestamp,
            payload,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(v: Value) -> ChangeEnvelope {
        serde_json::from_value(v).unwrap()
    }

    /// Тест проверяет, что корректный конверт позиции превращается в событие.
    #[test]
    fn test_valid_position_envelope() {
        let env = envelope(json!({
            "assetId": "veh-1",
            "position": {"x": 1, "y": 2, "z": 0, "heading": 45, "timestamp": 1000},
            "timestamp": 2000
        }));
        let event = env.into_event(ChangeKind::Position).unwrap();
        assert_eq!(event.asset_id, "veh-1");
        assert_eq!(event.kind(), ChangeKind::Position);
        assert_eq!(epoch_millis(event.timestamp), 2000);
    }

    /// Тест проверяет, что пустой или отсутствующий `assetId` отклоняется.
    #[test]
    fn test_missing_asset_id_rejected() {
        let env = envelope(json!({"assetId": "  ", "state": {}}));
        assert_eq!(
            env.into_event(ChangeKind::State),
            Err(ValidationError::MissingAssetId)
        );
        let env = envelope(json!({"state": {}}));
        assert_eq!(
            env.into_event(ChangeKind::State),
            Err(ValidationError::MissingAssetId)
        );
    }

    /// Тест проверяет, что конверт без тела нужного типа отклоняется.
    #[test]
    fn test_missing_payload_rejected() {
        let env = envelope(json!({
            "assetId": "veh-1",
            "position": {"x": 1, "y": 2, "z": 0, "heading": 45, "timestamp": 1000}
        }));
        assert!(matches!(
            env.into_event(ChangeKind::State),
            Err(ValidationError::MissingPayload { .. })
        ));
    }

    /// Тест проверяет, что тело, нарушающее инварианты записи, отклоняется.
    #[test]
    fn test_invalid_payload_rejected() {
        let env = envelope(json!({
            "assetId": "veh-1",
            "state": {"currentSpeed": 1, "batteryLevel": 140, "timestamp": 1}
        }));
        assert!(matches!(
            env.into_event(ChangeKind::State),
            Err(ValidationError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_channel_mapping() {
        assert_eq!(ChangeKind::from_channel(POSITION_CHANNEL), Some(ChangeKind::Position));
        assert_eq!(ChangeKind::from_channel("other"), None);
        assert_eq!(asset_channel("veh-7"), "asset:veh-7:updates");
    }

    #[test]
    fn test_envelope_from_event_roundtrip() {
        let ts = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let state = StateRecord::new(0.5, 70.0, ts).unwrap();
        let event = ChangeEvent::state("veh-2", state.clone());
        let env = ChangeEnvelope::from_event(&event).unwrap();
        assert!(env.position.is_none());
        let back = env.into_event(ChangeKind::State).unwrap();
        assert_eq!(back.payload, ChangePayload::State(state));
    }
}
