use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use fleetcast::{
    gateway::{ClientCommand, CommandReply, OutboundFrame, Room},
    BroadcastGateway, CommandError, PositionRecord, StateRecord,
};
use serde_json::Value;
use tokio::sync::mpsc;

fn position() -> PositionRecord {
    PositionRecord::new(1.0, 2.0, 0.0, 45.0, DateTime::from_timestamp_millis(1_000).unwrap())
        .unwrap()
}

fn frames(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(serde_json::from_str(&frame).unwrap());
    }
    out
}

/// Тест проверяет, что рассылка по другому активу не доходит до клиента,
/// подписанного только на `veh-1`, а общая комната получает всё.
#[test]
fn test_asset_rooms_are_isolated() {
    let gw = BroadcastGateway::new(16);
    let (a, mut a_rx) = gw.connect();
    let (b, mut b_rx) = gw.connect();
    let (_c, mut c_rx) = gw.connect();
    gw.subscribe_vehicle(a, "veh-1").unwrap();
    gw.subscribe_all(b).unwrap();

    assert_eq!(gw.broadcast_position("veh-2", &position()), 1);
    assert!(frames(&mut a_rx).is_empty());
    assert_eq!(frames(&mut b_rx)[0]["assetId"], "veh-2");
    assert!(frames(&mut c_rx).is_empty());

    assert_eq!(gw.broadcast_position("veh-1", &position()), 2);
    assert_eq!(frames(&mut a_rx).len(), 1);
    assert_eq!(frames(&mut b_rx).len(), 1);
}

/// Тест проверяет, что после отключения не остаётся ни записи подписки,
/// ни членства в комнатах.
#[test]
fn test_disconnect_removes_all_membership() {
    let gw = BroadcastGateway::new(16);
    let (id, _rx) = gw.connect();
    for asset in ["veh-1", "veh-2", "veh-3"] {
        gw.subscribe_vehicle(id, asset).unwrap();
    }
    assert_eq!(gw.subscriptions(id).unwrap().assets.len(), 3);

    assert!(gw.disconnect(id));
    assert!(gw.subscriptions(id).is_none());
    for asset in ["veh-1", "veh-2", "veh-3"] {
        assert!(gw.room_members(&Room::Asset(asset.into())).is_empty());
    }
    assert_eq!(gw.connected_clients(), 0);
    assert_eq!(
        gw.handle_command(id, ClientCommand::SubscribeAll),
        Err(CommandError::UnknownClient(id))
    );
}

#[test]
fn test_state_and_error_frames() {
    let gw = BroadcastGateway::new(16);
    let (id, mut rx) = gw.connect();
    gw.subscribe_vehicle(id, "veh-7").unwrap();

    let state = StateRecord::new(0.5, 42.0, Utc::now())
        .unwrap()
        .with_error_codes(["E10", "E11"]);
    gw.broadcast_state("veh-7", &state);
    gw.broadcast_error("veh-7", state.error_codes(), "Vehicle has errors");

    let got = frames(&mut rx);
    assert_eq!(got.len(), 2);
    assert_eq!(got[0]["type"], "stateChange");
    assert_eq!(got[0]["state"]["batteryLevel"], 42.0);
    assert_eq!(got[1]["type"], "vehicleError");
    assert_eq!(got[1]["errorCodes"], serde_json::json!(["E10", "E11"]));
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let gw = BroadcastGateway::new(16);
    let (id, _rx) = gw.connect();
    let reply = gw
        .handle_command(id, ClientCommand::UnsubscribeVehicle("never".into()))
        .unwrap();
    assert_eq!(
        reply,
        CommandReply::Ack {
            asset_id: Some("never".into())
        }
    );
    gw.unsubscribe_all(id).unwrap();
    assert!(gw.subscriptions(id).unwrap().is_empty());
}

/// Тест проверяет конкурентные подключения, подписки и отключения: реестр
/// остаётся согласованным.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_leaves_no_residue() {
    let gw = Arc::new(BroadcastGateway::new(4));
    let mut tasks = Vec::new();
    for n in 0..32 {
        let gw = gw.clone();
        tasks.push(tokio::spawn(async move {
            let (id, _rx) = gw.connect();
            gw.subscribe_vehicle(id, &format!("veh-{}", n % 4)).unwrap();
            if n % 2 == 0 {
                gw.subscribe_all(id).unwrap();
            }
            gw.broadcast_position("veh-0", &position());
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert!(gw.disconnect(id));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(gw.connected_clients(), 0);
    assert!(gw.room_members(&Room::All).is_empty());
    for n in 0..4 {
        assert!(gw.room_members(&Room::Asset(format!("veh-{n}"))).is_empty());
    }
    assert_eq!(gw.stats().total_connections, 32);
}
