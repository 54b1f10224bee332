//! JSON frames exchanged with viewers over the `/vehicles` socket.

use serde::{Deserialize, Serialize};

use crate::{
    error::{CommandError, ErrorExt},
    telemetry::{PositionRecord, StateRecord},
};

/// Raw inbound frame: `{"command":"subscribeVehicle","assetId":"veh-1","requestId":7}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    pub command: String,
    #[serde(default, alias = "vehicleId")]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<u64>,
}

/// A validated viewer command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    SubscribeVehicle(String),
    UnsubscribeVehicle(String),
    SubscribeAll,
    UnsubscribeAll,
    Ping,
}

/// Successful command result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    Ack { asset_id: Option<String> },
    Pong(i64),
}

/// Everything the server writes to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Response {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        asset_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        pong: i64,
    },
    #[serde(rename_all = "camelCase")]
    PositionUpdate {
        asset_id: String,
        position: PositionRecord,
        /// Gateway send time, epoch ms.
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    StateChange {
        asset_id: String,
        state: StateRecord,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    VehicleError {
        asset_id: String,
        error_codes: Vec<String>,
        message: String,
        timestamp: i64,
    },
}

fn required(asset_id: Option<String>) -> Result<String, CommandError> {
    match asset_id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(CommandError::MissingAssetId),
    }
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        serde_json::from_str(text).map_err(|e| CommandError::Malformed(e.to_string()))
    }

    pub fn into_command(self) -> Result<ClientCommand, CommandError> {
        match self.command.as_str() {
            "subscribeVehicle" => Ok(ClientCommand::SubscribeVehicle(required(self.asset_id)?)),
            "unsubscribeVehicle" => Ok(ClientCommand::UnsubscribeVehicle(required(self.asset_id)?)),
            "subscribeAll" => Ok(ClientCommand::SubscribeAll),
            "unsubscribeAll" => Ok(ClientCommand::UnsubscribeAll),
            "ping" => Ok(ClientCommand::Ping),
            other => Err(CommandError::Malformed(format!("unknown command '{other}'"))),
        }
    }
}

impl ServerMessage {
    /// Response frame for a command result.
    pub fn reply(
        request_id: Option<u64>,
        result: Result<CommandReply, CommandError>,
    ) -> Self {
        match result {
            Ok(CommandReply::Ack { asset_id }) => ServerMessage::Response {
                request_id,
                success: Some(true),
                asset_id,
                error: None,
            },
            Ok(CommandReply::Pong(pong)) => ServerMessage::Pong { request_id, pong },
            Err(e) => ServerMessage::Response {
                request_id,
                success: None,
                asset_id: None,
                error: Some(e.client_message()),
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn to_value(msg: &ServerMessage) -> Value {
        serde_json::from_str(&msg.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        let frame = InboundFrame::parse(r#"{"command":"subscribeVehicle","assetId":"veh-1","requestId":3}"#)
            .unwrap();
        assert_eq!(frame.request_id, Some(3));
        assert_eq!(
            frame.into_command().unwrap(),
            ClientCommand::SubscribeVehicle("veh-1".into())
        );

        let frame = InboundFrame::parse(r#"{"command":"ping"}"#).unwrap();
        assert_eq!(frame.into_command().unwrap(), ClientCommand::Ping);
    }

    /// Тест проверяет, что пустой или отсутствующий `assetId` является явной ошибкой.
    #[test]
    fn test_missing_asset_id() {
        for text in [
            r#"{"command":"subscribeVehicle"}"#,
            r#"{"command":"unsubscribeVehicle","assetId":""}"#,
        ] {
            let err = InboundFrame::parse(text).unwrap().into_command().unwrap_err();
            assert_eq!(err, CommandError::MissingAssetId);
        }
    }

    #[test]
    fn test_vehicle_id_alias() {
        let frame = InboundFrame::parse(r#"{"command":"subscribeVehicle","vehicleId":"v"}"#).unwrap();
        assert_eq!(frame.into_command().unwrap(), ClientCommand::SubscribeVehicle("v".into()));
    }

    #[test]
    fn test_unknown_and_malformed() {
        let err = InboundFrame::parse(r#"{"command":"reboot"}"#)
            .unwrap()
            .into_command()
            .unwrap_err();
        assert!(matches!(err, CommandError::Malformed(_)));
        assert!(InboundFrame::parse("not json").is_err());
    }

    #[test]
    fn test_response_shapes() {
        let ok = ServerMessage::reply(
            Some(1),
            Ok(CommandReply::Ack {
                asset_id: Some("veh-1".into()),
            }),
        );
        assert_eq!(
            to_value(&ok),
            json!({"type":"response","requestId":1,"success":true,"assetId":"veh-1"})
        );

        let err = ServerMessage::reply(None, Err(CommandError::MissingAssetId));
        assert_eq!(
            to_value(&err),
            json!({"type":"response","error":"assetId is required"})
        );

        let pong = ServerMessage::reply(None, Ok(CommandReply::Pong(42)));
        assert_eq!(to_value(&pong), json!({"type":"pong","pong":42}));
    }

    #[test]
    fn test_vehicle_error_shape() {
        let msg = ServerMessage::VehicleError {
            asset_id: "veh-1".into(),
            error_codes: vec!["E1".into()],
            message: "Vehicle has errors".into(),
            timestamp: 5,
        };
        assert_eq!(
            to_value(&msg),
            json!({"type":"vehicleError","assetId":"veh-1","errorCodes":["E1"],
                   "message":"Vehicle has errors","timestamp":5})
        );
    }
}
