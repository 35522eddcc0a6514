//! The room unit: one task owning one engine.
//!
//! All game state lives inside the task. Work arrives as
//! [`TaskEnvelope`]s on an mpsc inbox, replies leave through each
//! envelope's oneshot slot, and everything players should see goes out
//! as [`OutboundMessage`]s for the transport layer to deliver. The unit
//! also runs the room's two timers: the action clock for the player on
//! the clock and the periodic reaper for seats gone quiet.

use chrono::Utc;
use log::{debug, info, warn};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

use crate::game::constants::REAP_INTERVAL;
use crate::game::engine::{EngineEvent, GameError, RoomEngine, RoomSnapshot};
use crate::game::entities::ConnId;
use crate::room::clock::ActionClock;
use crate::room::messages::{
    EventScope, OutboundMessage, RoomEvent, RoomNotification, RoomTask, TaskEnvelope, TaskOutcome,
    TaskPayload, TaskSender,
};

const INBOX_DEPTH: usize = 64;

/// Cloneable sender half of a room unit's inbox.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    sender: TaskSender,
}

impl RoomHandle {
    pub async fn send(
        &self,
        envelope: TaskEnvelope,
    ) -> Result<(), mpsc::error::SendError<TaskEnvelope>> {
        self.sender.send(envelope).await
    }

    /// True once the unit's task has exited, whether it was stopped or
    /// it crashed.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub struct RoomActor {
    engine: RoomEngine,
    inbox: mpsc::Receiver<TaskEnvelope>,
    outbound: mpsc::Sender<OutboundMessage>,
    notifications: mpsc::Sender<RoomNotification>,
    clock: ActionClock,
}

impl RoomActor {
    /// Spawns the unit task around an engine. The task runs until it
    /// receives [`RoomTask::Stop`] or every handle is dropped, and
    /// resolves to the engine's final roster snapshot.
    pub fn spawn(
        engine: RoomEngine,
        outbound: mpsc::Sender<OutboundMessage>,
        notifications: mpsc::Sender<RoomNotification>,
    ) -> (RoomHandle, JoinHandle<RoomSnapshot>) {
        let (sender, inbox) = mpsc::channel(INBOX_DEPTH);
        let actor = Self {
            engine,
            inbox,
            outbound,
            notifications,
            clock: ActionClock::new(),
        };
        let join = tokio::spawn(actor.run());
        (RoomHandle { sender }, join)
    }

    async fn run(mut self) -> RoomSnapshot {
        let room_id = self.engine.config().id.clone();
        info!("room {room_id}: unit running");
        let mut reaper = interval(REAP_INTERVAL);
        loop {
            select! {
                envelope = self.inbox.recv() => {
                    match envelope {
                        Some(envelope) => {
                            if self.handle_envelope(envelope).await {
                                break;
                            }
                        }
                        // Every handle is gone; nothing can reach us.
                        None => break,
                    }
                }
                _ = self.clock.wait(), if self.clock.armed() => {
                    self.clock.cancel();
                    self.engine.handle_timeout();
                    self.flush().await;
                }
                _ = reaper.tick() => {
                    self.engine.reap_offline(std::time::Instant::now());
                    self.flush().await;
                }
            }
        }
        info!("room {room_id}: unit stopped");
        self.engine.snapshot()
    }

    /// Applies one envelope. Events are flushed before the reply is
    /// sent, so a caller that sees the outcome can rely on the room
    /// having already published its state. Returns true on `Stop`.
    async fn handle_envelope(&mut self, envelope: TaskEnvelope) -> bool {
        let TaskEnvelope {
            id,
            submitted_at,
            conn,
            task,
            reply,
        } = envelope;
        let kind = task.kind();
        let stop = matches!(task, RoomTask::Stop);
        let result = if stop {
            Ok(TaskPayload::Ack)
        } else {
            self.apply(task, conn)
        };
        if let Err(err) = &result {
            debug!("room {}: {kind} rejected: {err}", self.engine.config().id);
        }
        self.flush().await;
        let latency = (Utc::now() - submitted_at).num_milliseconds();
        debug!("room {}: {kind} handled in {latency}ms", self.engine.config().id);
        let _ = reply.send(TaskOutcome { id, result });
        stop
    }

    fn apply(&mut self, task: RoomTask, conn: Option<ConnId>) -> Result<TaskPayload, GameError> {
        match task {
            RoomTask::JoinRoom {
                player_id,
                nickname,
            } => {
                self.engine.join(player_id, nickname, conn)?;
                Ok(TaskPayload::Room(self.engine.room_view()))
            }
            RoomTask::Reconnect { player_id } => {
                let conn = conn.ok_or(GameError::SessionExpired)?;
                self.engine.reconnect(&player_id, conn)?;
                Ok(TaskPayload::Room(self.engine.room_view()))
            }
            RoomTask::CashIn { player_id } => {
                self.engine.cash_in(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::CashOut { player_id } => {
                self.engine.cash_out(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::StartGame { player_id } => {
                self.engine.start_game(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::SubmitAction { player_id, action } => {
                self.engine.submit_action(&player_id, action)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::ChatMessage { player_id, message } => {
                self.engine.chat_message(&player_id, &message)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::Heartbeat { player_id } => {
                self.engine.heartbeat(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::ExtendTime { player_id } => {
                self.engine.extend_time(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::ToggleAutoStart { player_id } => {
                self.engine.toggle_auto_start(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::ToggleRoomLock { player_id } => {
                self.engine.toggle_lock(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::Take { player_id, amount } => {
                self.engine.take(&player_id, amount)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::TakeAll { player_id } => {
                self.engine.take_all(&player_id)?;
                Ok(TaskPayload::Ack)
            }
            RoomTask::PlayerOffline { player_id, conn } => {
                self.engine.mark_offline(&player_id, conn);
                Ok(TaskPayload::Ack)
            }
            RoomTask::ResetRoom => {
                self.engine.reset();
                self.clock.cancel();
                Ok(TaskPayload::Ack)
            }
            // Handled before apply; acknowledged for completeness.
            RoomTask::Stop => Ok(TaskPayload::Ack),
        }
    }

    /// Drains the engine's event queue. Broadcast action requests arm
    /// the clock; direct ones are rewritten with the real remaining
    /// time so a reconnecting client sees the live countdown, not a
    /// fresh window.
    async fn flush(&mut self) {
        let events = self.engine.drain_events();
        if events.is_empty() {
            return;
        }
        for event in events {
            match event {
                EngineEvent::Broadcast(event) => {
                    match &event {
                        RoomEvent::ActionRequest { seconds, .. } => {
                            self.clock.arm(Duration::from_secs(u64::from(*seconds)));
                        }
                        RoomEvent::GameOver | RoomEvent::DistributionStart => {
                            self.clock.cancel();
                        }
                        _ => {}
                    }
                    self.send_outbound(EventScope::Room, event).await;
                }
                EngineEvent::Direct { conn, event } => {
                    let event = match event {
                        RoomEvent::ActionRequest { player_id, .. } => RoomEvent::ActionRequest {
                            player_id,
                            seconds: self.clock.remaining_seconds(),
                        },
                        other => other,
                    };
                    self.send_outbound(EventScope::Connection(conn), event).await;
                }
            }
        }
        let meta = self.engine.meta();
        if self
            .notifications
            .send(RoomNotification::StateChanged { meta })
            .await
            .is_err()
        {
            debug!(
                "room {}: coordinator notification channel closed",
                self.engine.config().id
            );
        }
    }

    async fn send_outbound(&self, scope: EventScope, event: RoomEvent) {
        let message = OutboundMessage {
            room_id: self.engine.config().id.clone(),
            scope,
            event,
        };
        if self.outbound.send(message).await.is_err() {
            warn!(
                "room {}: outbound channel closed, dropping event",
                self.engine.config().id
            );
        }
    }
}
