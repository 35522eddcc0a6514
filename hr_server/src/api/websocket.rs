//! WebSocket bridge between clients and room units.
//!
//! One socket serves exactly one room. The first message on a fresh
//! socket must be a `join_room` or `reconnect` task; anything else gets
//! a `kicked_out` event and the connection is closed, which is also how
//! session failures (locked room, full room, expired reconnect) are
//! surfaced. After that, every inbound frame is decoded as a room task,
//! forwarded through the coordinator, and answered with a `task_ok` or
//! `task_error` acknowledgement. Room events flow the other way: a
//! single relay task drains the coordinator's outbound stream and fans
//! events out to the registered connections.
//!
//! # Client messages
//!
//! The task wire format is the room task union itself, for example:
//!
//! ```json
//! {"type": "join_room", "player_id": "p1", "nickname": "Ada"}
//! {"type": "player_action", "player_id": "p1", "action": {"type": "raise", "amount": 40}}
//! {"type": "chat_message", "player_id": "p1", "message": "gg"}
//! ```
//!
//! `player_offline`, `reset_room`, and `stop` are server-internal and
//! rejected when they arrive from a socket.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Duration, timeout};

use holdem_rooms::game::entities::{ConnId, PlayerId, RoomId};
use holdem_rooms::room::{DispatchError, EventScope, OutboundMessage, RoomEvent, RoomTask};

use super::AppState;

/// Outbound frames buffered per connection before backpressure.
const CONN_BUFFER: usize = 64;

/// How long a fresh socket has to send its join or reconnect task.
const BIND_WINDOW: Duration = Duration::from_secs(10);

/// Acknowledgement for one client task, tagged like the room events so
/// the client consumes a single stream shape.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TaskAck {
    TaskOk { task: &'static str },
    TaskError { task: &'static str, reason: String },
}

/// Live connections, grouped by room. Shared between the socket
/// handlers (register/unregister), the outbound relay (fan-out), and
/// the reset endpoint (kick everyone).
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    rooms: Arc<RwLock<HashMap<RoomId, HashMap<ConnId, mpsc::Sender<Message>>>>>,
}

impl ConnectionRegistry {
    pub async fn register(&self, room: &RoomId, conn: ConnId, sender: mpsc::Sender<Message>) {
        let mut guard = self.rooms.write().await;
        guard.entry(room.clone()).or_default().insert(conn, sender);
    }

    pub async fn unregister(&self, room: &RoomId, conn: ConnId) {
        let mut guard = self.rooms.write().await;
        if let Some(conns) = guard.get_mut(room) {
            conns.remove(&conn);
            if conns.is_empty() {
                guard.remove(room);
            }
        }
    }

    /// Kicks every live connection and empties the registry. Returns
    /// how many connections were told to go.
    pub async fn kick_all(&self, reason: &str) -> usize {
        let senders: Vec<mpsc::Sender<Message>> = {
            let mut guard = self.rooms.write().await;
            guard
                .drain()
                .flat_map(|(_, conns)| conns.into_values())
                .collect()
        };
        for sender in &senders {
            kick(sender, reason).await;
        }
        senders.len()
    }

    async fn broadcast(&self, room: &RoomId, message: Message) {
        let senders: Vec<mpsc::Sender<Message>> = {
            let guard = self.rooms.read().await;
            match guard.get(room) {
                Some(conns) => conns.values().cloned().collect(),
                None => return,
            }
        };
        for sender in senders {
            let _ = sender.send(message.clone()).await;
        }
    }

    async fn send_to(&self, room: &RoomId, conn: ConnId, message: Message) {
        let sender = {
            let guard = self.rooms.read().await;
            guard.get(room).and_then(|conns| conns.get(&conn)).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(message).await;
        }
    }
}

/// Drains the coordinator's outbound event stream and routes each event
/// to its room's connections (or the one addressed connection). Spawned
/// once at startup; ends when the coordinator is dropped.
pub async fn relay_outbound(
    mut outbound: mpsc::Receiver<OutboundMessage>,
    registry: ConnectionRegistry,
) {
    while let Some(message) = outbound.recv().await {
        let Some(frame) = event_frame(&message.event) else {
            continue;
        };
        match message.scope {
            EventScope::Room => registry.broadcast(&message.room_id, frame).await,
            EventScope::Connection(conn) => {
                registry.send_to(&message.room_id, conn, frame).await;
            }
        }
    }
    debug!("outbound relay stopped");
}

/// Upgrade to a WebSocket bound to one room.
///
/// Unknown room ids are rejected before the upgrade.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let room_id = RoomId::from(room_id);
    if state.coordinator.meta(&room_id).await.is_none() {
        return (StatusCode::NOT_FOUND, "Unknown room").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, state))
}

async fn handle_socket(socket: WebSocket, room_id: RoomId, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let conn = ConnId::new();
    info!("websocket connected: room={room_id}, conn={conn}");

    // Register before the join dispatch so the direct state replay the
    // engine addresses to this connection is routable.
    let (tx, rx) = mpsc::channel::<Message>(CONN_BUFFER);
    state.registry.register(&room_id, conn, tx.clone()).await;
    let forwarder = tokio::spawn(forward(rx, sender));

    let bound = match timeout(BIND_WINDOW, bind_player(&mut receiver, &tx, &room_id, conn, &state))
        .await
    {
        Ok(bound) => bound,
        Err(_) => {
            kick(&tx, "no join received").await;
            None
        }
    };
    let Some(player_id) = bound else {
        state.registry.unregister(&room_id, conn).await;
        drop(tx);
        let _ = forwarder.await;
        info!("websocket dropped before binding: room={room_id}, conn={conn}");
        return;
    };
    info!("websocket bound: room={room_id}, player={player_id}, conn={conn}");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_text(&text, &player_id, &room_id, conn, &state, &tx).await;
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                debug!("websocket error: room={room_id}, conn={conn}: {err}");
                break;
            }
            _ => {}
        }
    }

    state.registry.unregister(&room_id, conn).await;
    drop(tx);
    let _ = forwarder.await;
    // Stale notices are ignored by the engine, so racing a reconnect
    // from a newer socket is safe.
    let offline = RoomTask::PlayerOffline {
        player_id: player_id.clone(),
        conn,
    };
    if let Err(err) = state.coordinator.dispatch(&room_id, offline, None).await {
        debug!("offline notice for {player_id} not delivered: {err}");
    }
    info!("websocket disconnected: room={room_id}, player={player_id}, conn={conn}");
}

/// Waits for the session's first task. Only `join_room` and `reconnect`
/// are allowed; on success the socket is bound to that player id.
async fn bind_player(
    receiver: &mut SplitStream<WebSocket>,
    tx: &mpsc::Sender<Message>,
    room_id: &RoomId,
    conn: ConnId,
    state: &AppState,
) -> Option<PlayerId> {
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        let task = match serde_json::from_str::<RoomTask>(&text) {
            Ok(task @ (RoomTask::JoinRoom { .. } | RoomTask::Reconnect { .. })) => task,
            Ok(_) | Err(_) => {
                kick(tx, "join or reconnect first").await;
                return None;
            }
        };
        let player_id = task_player(&task).cloned();
        let kind = task.kind();
        match state.coordinator.dispatch(room_id, task, Some(conn)).await {
            Ok(_) => {
                ack(tx, TaskAck::TaskOk { task: kind }).await;
                return player_id;
            }
            Err(DispatchError::Rejected(err)) => {
                kick(tx, &err.to_string()).await;
                return None;
            }
            Err(err) => {
                warn!("room {room_id}: {kind} dispatch failed: {err}");
                kick(tx, "room unavailable").await;
                return None;
            }
        }
    }
    None
}

async fn handle_text(
    text: &str,
    player_id: &PlayerId,
    room_id: &RoomId,
    conn: ConnId,
    state: &AppState,
    tx: &mpsc::Sender<Message>,
) {
    let task = match serde_json::from_str::<RoomTask>(text) {
        Ok(task) => task,
        Err(err) => {
            debug!("room {room_id}: undecodable task from {player_id}: {err}");
            let reply = TaskAck::TaskError {
                task: "unknown",
                reason: "malformed task".to_string(),
            };
            ack(tx, reply).await;
            return;
        }
    };
    let kind = task.kind();
    if server_only(&task) {
        ack(
            tx,
            TaskAck::TaskError {
                task: kind,
                reason: "not available to clients".to_string(),
            },
        )
        .await;
        return;
    }
    if task_player(&task) != Some(player_id) {
        ack(
            tx,
            TaskAck::TaskError {
                task: kind,
                reason: "task is for a different player".to_string(),
            },
        )
        .await;
        return;
    }
    let reply = match state.coordinator.dispatch(room_id, task, Some(conn)).await {
        Ok(_) => TaskAck::TaskOk { task: kind },
        Err(DispatchError::Rejected(err)) => TaskAck::TaskError {
            task: kind,
            reason: err.to_string(),
        },
        Err(err) => {
            warn!("room {room_id}: {kind} dispatch failed: {err}");
            TaskAck::TaskError {
                task: kind,
                reason: "room unavailable".to_string(),
            }
        }
    };
    ack(tx, reply).await;
}

/// Pumps relayed frames onto the socket until the channel closes or a
/// close frame goes out.
async fn forward(mut rx: mpsc::Receiver<Message>, mut sender: SplitSink<WebSocket, Message>) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if sender.send(message).await.is_err() || closing {
            break;
        }
    }
}

async fn kick(tx: &mpsc::Sender<Message>, reason: &str) {
    let event = RoomEvent::KickedOut {
        reason: reason.to_string(),
    };
    if let Some(frame) = event_frame(&event) {
        let _ = tx.send(frame).await;
    }
    let _ = tx.send(Message::Close(None)).await;
}

async fn ack(tx: &mpsc::Sender<Message>, ack: TaskAck) {
    match serde_json::to_string(&ack) {
        Ok(json) => {
            let _ = tx.send(Message::Text(json.into())).await;
        }
        Err(err) => warn!("failed to serialize ack: {err}"),
    }
}

fn event_frame(event: &RoomEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            warn!("failed to serialize event: {err}");
            None
        }
    }
}

/// Tasks only the coordinator may issue.
fn server_only(task: &RoomTask) -> bool {
    matches!(
        task,
        RoomTask::PlayerOffline { .. } | RoomTask::ResetRoom | RoomTask::Stop
    )
}

/// The player a task claims to act for.
fn task_player(task: &RoomTask) -> Option<&PlayerId> {
    match task {
        RoomTask::JoinRoom { player_id, .. }
        | RoomTask::Reconnect { player_id }
        | RoomTask::CashIn { player_id }
        | RoomTask::CashOut { player_id }
        | RoomTask::StartGame { player_id }
        | RoomTask::SubmitAction { player_id, .. }
        | RoomTask::ChatMessage { player_id, .. }
        | RoomTask::Heartbeat { player_id }
        | RoomTask::ExtendTime { player_id }
        | RoomTask::ToggleAutoStart { player_id }
        | RoomTask::ToggleRoomLock { player_id }
        | RoomTask::Take { player_id, .. }
        | RoomTask::TakeAll { player_id }
        | RoomTask::PlayerOffline { player_id, .. } => Some(player_id),
        RoomTask::ResetRoom | RoomTask::Stop => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text.to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_ack_wire_shape() {
        let ok = serde_json::to_value(TaskAck::TaskOk { task: "cash_in" }).unwrap();
        assert_eq!(ok, json!({"event": "task_ok", "task": "cash_in"}));

        let err = serde_json::to_value(TaskAck::TaskError {
            task: "player_action",
            reason: "not your turn".to_string(),
        })
        .unwrap();
        assert_eq!(
            err,
            json!({"event": "task_error", "task": "player_action", "reason": "not your turn"})
        );
    }

    #[test]
    fn test_server_only_tasks_are_flagged() {
        assert!(server_only(&RoomTask::Stop));
        assert!(server_only(&RoomTask::ResetRoom));
        assert!(server_only(&RoomTask::PlayerOffline {
            player_id: "p1".into(),
            conn: ConnId::new(),
        }));
        assert!(!server_only(&RoomTask::Heartbeat {
            player_id: "p1".into(),
        }));
    }

    #[test]
    fn test_task_player_extraction() {
        let join = RoomTask::JoinRoom {
            player_id: "p1".into(),
            nickname: "Ada".into(),
        };
        assert_eq!(task_player(&join), Some(&PlayerId::from("p1")));
        assert_eq!(task_player(&RoomTask::Stop), None);
    }

    #[tokio::test]
    async fn test_registry_routes_room_and_direct_frames() {
        let registry = ConnectionRegistry::default();
        let room = RoomId::from("room1");
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let conn1 = ConnId::new();
        registry.register(&room, conn1, tx1).await;
        registry.register(&room, ConnId::new(), tx2).await;

        registry
            .broadcast(&room, Message::Text("hello".into()))
            .await;
        assert_eq!(text_of(rx1.recv().await.unwrap()), "hello");
        assert_eq!(text_of(rx2.recv().await.unwrap()), "hello");

        registry
            .send_to(&room, conn1, Message::Text("private".into()))
            .await;
        assert_eq!(text_of(rx1.recv().await.unwrap()), "private");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_kick_all_notifies_and_empties() {
        let registry = ConnectionRegistry::default();
        let (tx, mut rx) = mpsc::channel(4);
        registry
            .register(&RoomId::from("room1"), ConnId::new(), tx)
            .await;

        assert_eq!(registry.kick_all("server reset").await, 1);
        let first = text_of(rx.recv().await.unwrap());
        assert!(first.contains("kicked_out"));
        assert!(first.contains("server reset"));
        assert!(matches!(rx.recv().await, Some(Message::Close(_))));

        assert_eq!(registry.kick_all("again").await, 0);
    }

    #[tokio::test]
    async fn test_unregister_drops_connection() {
        let registry = ConnectionRegistry::default();
        let room = RoomId::from("room1");
        let conn = ConnId::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(&room, conn, tx).await;
        registry.unregister(&room, conn).await;

        registry.broadcast(&room, Message::Text("gone".into())).await;
        assert!(rx.try_recv().is_err());
    }
}
