use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::{ClientCommand, ClientSubscription, CommandReply, InboundFrame, Room, ServerMessage};
use crate::{
    error::{CommandError, ErrorExt},
    telemetry::{epoch_millis, PositionRecord, StateRecord},
};

pub type ClientId = u32;

/// Pre-encoded JSON frame shared by every recipient of one broadcast.
pub type OutboundFrame = Arc<str>;

pub const DEFAULT_CLIENT_QUEUE: usize = 256;

struct ClientEntry {
    tx: mpsc::Sender<OutboundFrame>,
    subscription: ClientSubscription,
}

/// Счётчики шлюза.
#[derive(Default)]
struct GatewayCounters {
    connections: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Снимок счётчиков шлюза.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub connected: usize,
    /// Соединений за всё время работы.
    pub total_connections: u64,
    /// Кадров, поставленных в очереди клиентов.
    pub delivered: u64,
    /// Кадров, потерянных из-за переполненной очереди медленного клиента.
    pub dropped: u64,
}

/// Реестр соединений зрителей и их подписок.
///
/// Каждое соединение владеет своей записью: подписка меняется только
/// командами этого соединения, а при отключении запись и членство во всех
/// комнатах удаляются вместе. Рассылка не блокируется: у каждого клиента
/// своя ограниченная очередь, при переполнении кадр теряется.
#[derive(Clone)]
pub struct BroadcastGateway {
    clients: Arc<DashMap<ClientId, ClientEntry>>,
    rooms: Arc<DashMap<Room, HashSet<ClientId>>>,
    id_counter: Arc<AtomicU32>,
    queue_size: usize,
    counters: Arc<GatewayCounters>,
}

impl fmt::Debug for BroadcastGateway {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BroadcastGateway")
            .field("connected", &self.clients.len())
            .field("rooms", &self.rooms.len())
            .field("queue_size", &self.queue_size)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BroadcastGateway {
    pub fn new(queue_size: usize) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            rooms: Arc::new(DashMap::new()),
            id_counter: Arc::new(AtomicU32::new(0)),
            queue_size: queue_size.max(1),
            counters: Arc::new(GatewayCounters::default()),
        }
    }

    /// Регистрирует соединение с пустой подпиской.
    ///
    /// Возвращает ID клиента и приёмник его исходящей очереди.
    pub fn connect(&self) -> (ClientId, mpsc::Receiver<OutboundFrame>) {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(self.queue_size);
        self.clients.insert(
            id,
            ClientEntry {
                tx,
                subscription: ClientSubscription::default(),
            },
        );
        self.counters.connections.fetch_add(1, Ordering::Relaxed);
        info!(client_id = id, "Client connected");
        (id, rx)
    }

    /// Удаляет соединение и его членство во всех комнатах.
    ///
    /// Запись клиента удаляется первой, поэтому рассылки после этого
    /// вызова его уже не находят. Возвращает `false`, если клиента не было.
    pub fn disconnect(
        &self,
        client: ClientId,
    ) -> bool {
        let Some((_, entry)) = self.clients.remove(&client) else {
            return false;
        };
        for room in entry.subscription.rooms() {
            self.leave_room(&room, client);
        }
        info!(client_id = client, "Client disconnected");
        true
    }

    /// Выполняет команду клиента.
    pub fn handle_command(
        &self,
        client: ClientId,
        command: ClientCommand,
    ) -> Result<CommandReply, CommandError> {
        match command {
            ClientCommand::SubscribeVehicle(asset_id) => {
                self.subscribe_vehicle(client, &asset_id)?;
                Ok(CommandReply::Ack {
                    asset_id: Some(asset_id),
                })
            }
            ClientCommand::UnsubscribeVehicle(asset_id) => {
                self.unsubscribe_vehicle(client, &asset_id)?;
                Ok(CommandReply::Ack {
                    asset_id: Some(asset_id),
                })
            }
            ClientCommand::SubscribeAll => {
                self.subscribe_all(client)?;
                Ok(CommandReply::Ack { asset_id: None })
            }
            ClientCommand::UnsubscribeAll => {
                self.unsubscribe_all(client)?;
                Ok(CommandReply::Ack { asset_id: None })
            }
            ClientCommand::Ping => Ok(CommandReply::Pong(self.ping())),
        }
    }

    /// Разбирает текстовый кадр клиента, выполняет команду и возвращает
    /// ответ, который нужно отправить только этому клиенту.
    pub fn handle_frame(
        &self,
        client: ClientId,
        text: &str,
    ) -> ServerMessage {
        let (request_id, result) = match InboundFrame::parse(text) {
            Ok(frame) => {
                let request_id = frame.request_id;
                let result = frame
                    .into_command()
                    .and_then(|command| self.handle_command(client, command));
                (request_id, result)
            }
            Err(e) => (None, Err(e)),
        };
        if let Err(e) = &result {
            if e.status_code().is_client_error() {
                debug!(client_id = client, error = %e, "Client command rejected");
            } else {
                warn!(client_id = client, error = %e.log_message(), "Client command failed");
            }
        }
        ServerMessage::reply(request_id, result)
    }

    pub fn subscribe_vehicle(
        &self,
        client: ClientId,
        asset_id: &str,
    ) -> Result<(), CommandError> {
        if asset_id.trim().is_empty() {
            return Err(CommandError::MissingAssetId);
        }
        self.with_subscription(client, |sub| sub.assets.insert(asset_id.to_string()))?;
        self.join_room(Room::Asset(asset_id.to_string()), client);
        debug!(client_id = client, asset_id, "Client subscribed to asset");
        Ok(())
    }

    /// Отписка от актива; отписка от неподписанного актива тоже успешна.
    pub fn unsubscribe_vehicle(
        &self,
        client: ClientId,
        asset_id: &str,
    ) -> Result<(), CommandError> {
        if asset_id.trim().is_empty() {
            return Err(CommandError::MissingAssetId);
        }
        self.with_subscription(client, |sub| sub.assets.remove(asset_id))?;
        self.leave_room(&Room::Asset(asset_id.to_string()), client);
        debug!(client_id = client, asset_id, "Client unsubscribed from asset");
        Ok(())
    }

    pub fn subscribe_all(
        &self,
        client: ClientId,
    ) -> Result<(), CommandError> {
        self.with_subscription(client, |sub| sub.all = true)?;
        self.join_room(Room::All, client);
        debug!(client_id = client, "Client subscribed to all assets");
        Ok(())
    }

    pub fn unsubscribe_all(
        &self,
        client: ClientId,
    ) -> Result<(), CommandError> {
        self.with_subscription(client, |sub| sub.all = false)?;
        self.leave_room(&Room::All, client);
        debug!(client_id = client, "Client unsubscribed from all assets");
        Ok(())
    }

    /// Серверное время, epoch ms.
    pub fn ping(&self) -> i64 {
        epoch_millis(Utc::now())
    }

    /// Рассылает позицию комнате актива и общей комнате.
    ///
    /// Возвращает число клиентов, в чьи очереди попал кадр.
    pub fn broadcast_position(
        &self,
        asset_id: &str,
        position: &PositionRecord,
    ) -> usize {
        self.broadcast(
            asset_id,
            &ServerMessage::PositionUpdate {
                asset_id: asset_id.to_string(),
                position: position.clone(),
                timestamp: self.ping(),
            },
        )
    }

    pub fn broadcast_state(
        &self,
        asset_id: &str,
        state: &StateRecord,
    ) -> usize {
        self.broadcast(
            asset_id,
            &ServerMessage::StateChange {
                asset_id: asset_id.to_string(),
                state: state.clone(),
                timestamp: self.ping(),
            },
        )
    }

    pub fn broadcast_error(
        &self,
        asset_id: &str,
        error_codes: &[String],
        message: &str,
    ) -> usize {
        self.broadcast(
            asset_id,
            &ServerMessage::VehicleError {
                asset_id: asset_id.to_string(),
                error_codes: error_codes.to_vec(),
                message: message.to_string(),
                timestamp: self.ping(),
            },
        )
    }

    /// Кладёт кадр в очередь одного клиента (ответы на команды).
    pub fn send_to(
        &self,
        client: ClientId,
        message: &ServerMessage,
    ) -> bool {
        let Some(frame) = encode(message) else {
            return false;
        };
        match self.clients.get(&client) {
            Some(entry) => self.deliver(client, &entry.tx, frame),
            None => false,
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.len()
    }

    /// Подписка клиента; `None`, если клиент не подключён.
    pub fn subscriptions(
        &self,
        client: ClientId,
    ) -> Option<ClientSubscription> {
        self.clients.get(&client).map(|e| e.subscription.clone())
    }

    /// Участники комнаты по возрастанию ID.
    pub fn room_members(
        &self,
        room: &Room,
    ) -> Vec<ClientId> {
        let mut members: Vec<ClientId> = self
            .rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort_unstable();
        members
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            connected: self.clients.len(),
            total_connections: self.counters.connections.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Каждый получатель из объединения двух комнат получает кадр один раз.
    fn broadcast(
        &self,
        asset_id: &str,
        message: &ServerMessage,
    ) -> usize {
        let mut recipients: HashSet<ClientId> = self.room_members(&Room::All).into_iter().collect();
        if let Some(members) = self.rooms.get(&Room::Asset(asset_id.to_string())) {
            recipients.extend(members.iter().copied());
        }
        if recipients.is_empty() {
            return 0;
        }
        let Some(frame) = encode(message) else {
            return 0;
        };

        let senders: HashMap<ClientId, mpsc::Sender<OutboundFrame>> = recipients
            .into_iter()
            .filter_map(|id| self.clients.get(&id).map(|e| (id, e.tx.clone())))
            .collect();

        senders
            .iter()
            .filter(|(id, tx)| self.deliver(**id, tx, frame.clone()))
            .count()
    }

    fn deliver(
        &self,
        client: ClientId,
        tx: &mpsc::Sender<OutboundFrame>,
        frame: OutboundFrame,
    ) -> bool {
        match tx.try_send(frame) {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(client_id = client, "Client queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client_id = client, "Client queue closed");
                false
            }
        }
    }

    fn with_subscription<R>(
        &self,
        client: ClientId,
        f: impl FnOnce(&mut ClientSubscription) -> R,
    ) -> Result<R, CommandError> {
        let mut entry = self
            .clients
            .get_mut(&client)
            .ok_or(CommandError::UnknownClient(client))?;
        Ok(f(&mut entry.subscription))
    }

    fn join_room(
        &self,
        room: Room,
        client: ClientId,
    ) {
        self.rooms.entry(room).or_default().insert(client);
    }

    fn leave_room(
        &self,
        room: &Room,
        client: ClientId,
    ) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&client);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }
}

impl Default for BroadcastGateway {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_QUEUE)
    }
}

fn encode(message: &ServerMessage) -> Option<OutboundFrame> {
    match message.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(error = %e, "Failed to encode outbound frame");
            None
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
