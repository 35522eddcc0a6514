//! Room task and event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::game::engine::GameError;
use crate::game::entities::{
    Card, ChatKind, Chips, ConnId, GameStateView, Nickname, PlayerAction, PlayerId, RoomId,
    RoomView,
};

/// Work items a room unit accepts.
///
/// The union is closed: decoding a payload whose `type` names anything
/// else fails outright instead of turning into a stringly-typed task.
/// `ResetRoom` and `Stop` are issued by the coordinator only and never
/// arrive over a socket.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomTask {
    /// Seat a new player, or revive an existing seat after a drop.
    JoinRoom {
        player_id: PlayerId,
        nickname: Nickname,
    },
    /// Bind an existing seat to a fresh connection.
    Reconnect { player_id: PlayerId },
    /// Credit the seat with one fixed buy-in.
    CashIn { player_id: PlayerId },
    /// Leave the room, folding out of a live hand first if needed.
    CashOut { player_id: PlayerId },
    StartGame { player_id: PlayerId },
    #[serde(rename = "player_action")]
    SubmitAction {
        player_id: PlayerId,
        action: PlayerAction,
    },
    ChatMessage { player_id: PlayerId, message: String },
    /// Liveness ping. Refreshes the seat's activity timestamp.
    Heartbeat { player_id: PlayerId },
    /// Reset the action timer for the player currently on the clock.
    ExtendTime { player_id: PlayerId },
    ToggleAutoStart { player_id: PlayerId },
    ToggleRoomLock { player_id: PlayerId },
    /// Manual rooms only: move part of the pot to the sender's stack.
    Take { player_id: PlayerId, amount: Chips },
    /// Manual rooms only: claim whatever remains of the pot.
    TakeAll { player_id: PlayerId },
    /// A socket died. Marks the seat offline if it still holds that
    /// connection; stale ids are ignored.
    PlayerOffline { player_id: PlayerId, conn: ConnId },
    /// Wipe the unit back to an empty roster. Coordinator use only.
    ResetRoom,
    /// Drain the inbox and exit the unit task. Coordinator use only.
    Stop,
}

impl RoomTask {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomTask::JoinRoom { .. } => "join_room",
            RoomTask::Reconnect { .. } => "reconnect",
            RoomTask::CashIn { .. } => "cash_in",
            RoomTask::CashOut { .. } => "cash_out",
            RoomTask::StartGame { .. } => "start_game",
            RoomTask::SubmitAction { .. } => "player_action",
            RoomTask::ChatMessage { .. } => "chat_message",
            RoomTask::Heartbeat { .. } => "heartbeat",
            RoomTask::ExtendTime { .. } => "extend_time",
            RoomTask::ToggleAutoStart { .. } => "toggle_auto_start",
            RoomTask::ToggleRoomLock { .. } => "toggle_room_lock",
            RoomTask::Take { .. } => "take",
            RoomTask::TakeAll { .. } => "take_all",
            RoomTask::PlayerOffline { .. } => "player_offline",
            RoomTask::ResetRoom => "reset_room",
            RoomTask::Stop => "stop",
        }
    }
}

/// One queued task with its correlation id and reply slot.
#[derive(Debug)]
pub struct TaskEnvelope {
    pub id: Uuid,
    pub submitted_at: DateTime<Utc>,
    /// Connection the task arrived on, when it came over a socket.
    /// Join and reconnect bind the seat to this connection.
    pub conn: Option<ConnId>,
    pub task: RoomTask,
    pub reply: oneshot::Sender<TaskOutcome>,
}

impl TaskEnvelope {
    /// Wraps a task for dispatch, returning the envelope and the
    /// receiver its outcome will arrive on.
    pub fn new(task: RoomTask, conn: Option<ConnId>) -> (Self, oneshot::Receiver<TaskOutcome>) {
        let (reply, receiver) = oneshot::channel();
        let envelope = Self {
            id: Uuid::new_v4(),
            submitted_at: Utc::now(),
            conn,
            task,
            reply,
        };
        (envelope, receiver)
    }
}

/// Result of one task, tagged with the envelope's correlation id.
#[derive(Debug)]
pub struct TaskOutcome {
    pub id: Uuid,
    pub result: Result<TaskPayload, GameError>,
}

/// Successful task payloads.
#[derive(Clone, Debug)]
pub enum TaskPayload {
    /// The task was applied; any visible effect went out as events.
    Ack,
    /// Room state for the caller, returned from join and reconnect.
    Room(RoomView),
}

/// Events pushed to clients.
///
/// Serialized with an `event` tag, so the wire form of a hand start is
/// `{"event":"game_started"}` and a state push carries its payload
/// alongside the tag.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Roster or room flags changed.
    RoomUpdate { room: RoomView },
    GameStarted,
    /// Full public table state. Hole cards are never included.
    GameState { state: GameStateView },
    /// The named player is on the clock for `seconds` more.
    ActionRequest { player_id: PlayerId, seconds: u32 },
    /// Private deal, sent only to the owning connection.
    DealHand { hand: Vec<Card> },
    GameOver,
    /// A manual room reached showdown; the pot is open for takes.
    DistributionStart,
    ChatBroadcast {
        message: String,
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<ChatKind>,
    },
    /// Terminal refusal. The server closes the connection after this.
    KickedOut { reason: String },
}

impl RoomEvent {
    /// System chat line.
    pub fn system_chat(message: impl Into<String>) -> Self {
        RoomEvent::ChatBroadcast {
            message: message.into(),
            kind: Some(ChatKind::System),
        }
    }

    /// Player chat line, no kind marker.
    pub fn player_chat(message: impl Into<String>) -> Self {
        RoomEvent::ChatBroadcast {
            message: message.into(),
            kind: None,
        }
    }
}

/// Delivery scope for an outbound event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventScope {
    /// Every connection in the room.
    Room,
    /// Exactly one connection.
    Connection(ConnId),
}

/// An event addressed for delivery, handed to the transport layer.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub room_id: RoomId,
    pub scope: EventScope,
    pub event: RoomEvent,
}

/// Thin room summary the coordinator mirrors outside the unit.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RoomMeta {
    pub id: RoomId,
    pub name: String,
    pub players: usize,
    pub connected: usize,
    pub max_players: usize,
    pub locked: bool,
    pub automated: bool,
    pub hand_in_progress: bool,
}

/// Notification from a room unit to the coordinator.
#[derive(Clone, Debug)]
pub enum RoomNotification {
    /// Anything about the room worth mirroring changed.
    StateChanged { meta: RoomMeta },
}

/// Sender half of a unit's task inbox.
pub type TaskSender = mpsc::Sender<TaskEnvelope>;
