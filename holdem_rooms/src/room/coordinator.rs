//! Room lifecycle: provisioning, dispatch, and idle sweeping.
//!
//! The coordinator owns no game state. It keeps one slot per configured
//! room holding the unit handle (when running), a thin metadata mirror
//! fed by unit notifications, and the roster snapshot a stopped unit
//! left behind. Units start lazily on first dispatch and are swept once
//! they sit empty past the idle threshold; a unit that crashes is
//! revived from its last snapshot the next time something is dispatched
//! to it.

use std::collections::HashMap;
use std::sync::Arc;

use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, timeout};

use crate::game::constants::{DISPATCH_TIMEOUT, IDLE_SWEEP_INTERVAL, IDLE_THRESHOLD};
use crate::game::engine::{GameError, RoomEngine, RoomSnapshot};
use crate::game::entities::{ConnId, RoomId};
use crate::room::actor::{RoomActor, RoomHandle};
use crate::room::config::RoomConfig;
use crate::room::messages::{
    OutboundMessage, RoomMeta, RoomNotification, RoomTask, TaskEnvelope, TaskPayload,
};

const OUTBOUND_DEPTH: usize = 256;
const NOTIFY_DEPTH: usize = 64;

/// Why a dispatch failed before (or instead of) a room-level answer.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum DispatchError {
    #[error("unknown room")]
    UnknownRoom,
    #[error("room unit timed out")]
    Timeout,
    #[error("room unit failed")]
    UnitFailed,
    #[error(transparent)]
    Rejected(#[from] GameError),
}

struct RoomSlot {
    config: RoomConfig,
    snapshot: RoomSnapshot,
    handle: Option<RoomHandle>,
    join: Option<JoinHandle<RoomSnapshot>>,
    last_active: Instant,
    meta: RoomMeta,
}

fn idle_meta(config: &RoomConfig, snapshot: &RoomSnapshot) -> RoomMeta {
    RoomMeta {
        id: config.id.clone(),
        name: config.name.clone(),
        players: snapshot.players.len(),
        connected: 0,
        max_players: config.max_players,
        locked: snapshot.locked,
        automated: config.automated,
        hand_in_progress: false,
    }
}

/// Spawns, supervises, and talks to room units.
#[derive(Clone)]
pub struct RoomCoordinator {
    rooms: Arc<RwLock<HashMap<RoomId, RoomSlot>>>,
    outbound: mpsc::Sender<OutboundMessage>,
    notifications: mpsc::Sender<RoomNotification>,
}

impl RoomCoordinator {
    /// Provisions one slot per config and returns the coordinator plus
    /// the stream of outbound events for the transport layer. Configs
    /// that fail validation are dropped with an error log.
    pub fn new(configs: Vec<RoomConfig>) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_DEPTH);
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_DEPTH);
        let mut rooms = HashMap::new();
        for config in configs {
            if let Err(err) = config.validate() {
                error!("room {} rejected: {err}", config.id);
                continue;
            }
            let snapshot = RoomSnapshot::default();
            let meta = idle_meta(&config, &snapshot);
            rooms.insert(
                config.id.clone(),
                RoomSlot {
                    config,
                    snapshot,
                    handle: None,
                    join: None,
                    last_active: Instant::now(),
                    meta,
                },
            );
        }
        info!("coordinator provisioned {} rooms", rooms.len());
        let coordinator = Self {
            rooms: Arc::new(RwLock::new(rooms)),
            outbound: outbound_tx,
            notifications: notify_tx,
        };
        coordinator.spawn_background(notify_rx);
        (coordinator, outbound_rx)
    }

    /// Sends a task to a room and waits for its outcome. The wait is
    /// bounded, so a wedged unit surfaces as [`DispatchError::Timeout`]
    /// instead of hanging its caller.
    pub async fn dispatch(
        &self,
        room_id: &RoomId,
        task: RoomTask,
        conn: Option<ConnId>,
    ) -> Result<TaskPayload, DispatchError> {
        let handle = self.ensure_running(room_id).await?;
        let (envelope, reply) = TaskEnvelope::new(task, conn);
        handle
            .send(envelope)
            .await
            .map_err(|_| DispatchError::UnitFailed)?;
        match timeout(DISPATCH_TIMEOUT, reply).await {
            Err(_) => Err(DispatchError::Timeout),
            Ok(Err(_)) => Err(DispatchError::UnitFailed),
            Ok(Ok(outcome)) => outcome.result.map_err(DispatchError::from),
        }
    }

    /// Current metadata for every room, sorted by id.
    pub async fn metas(&self) -> Vec<RoomMeta> {
        let guard = self.rooms.read().await;
        let mut metas: Vec<RoomMeta> = guard.values().map(|slot| slot.meta.clone()).collect();
        metas.sort_by(|a, b| a.id.cmp(&b.id));
        metas
    }

    pub async fn meta(&self, room_id: &RoomId) -> Option<RoomMeta> {
        self.rooms.read().await.get(room_id).map(|s| s.meta.clone())
    }

    /// Wipes every room back to its provisioning defaults. With
    /// `preserve_units` the running units stay up and reset in place;
    /// otherwise they are stopped and their snapshots discarded.
    pub async fn reset_all(&self, preserve_units: bool) {
        let ids: Vec<RoomId> = self.rooms.read().await.keys().cloned().collect();
        for id in ids {
            if preserve_units {
                let handle = {
                    let guard = self.rooms.read().await;
                    guard
                        .get(&id)
                        .and_then(|slot| slot.handle.clone())
                        .filter(|handle| !handle.is_closed())
                };
                if let Some(handle) = handle {
                    let (envelope, reply) = TaskEnvelope::new(RoomTask::ResetRoom, None);
                    if handle.send(envelope).await.is_ok() {
                        let _ = timeout(DISPATCH_TIMEOUT, reply).await;
                    }
                }
                let mut guard = self.rooms.write().await;
                if let Some(slot) = guard.get_mut(&id) {
                    slot.snapshot = RoomSnapshot::default();
                    slot.meta = idle_meta(&slot.config, &slot.snapshot);
                    slot.last_active = Instant::now();
                }
            } else {
                self.stop_unit(&id, false).await;
            }
        }
        info!("all rooms reset");
    }

    /// Stops every running unit, keeping snapshots. For shutdown.
    pub async fn drain(&self) {
        let ids: Vec<RoomId> = self.rooms.read().await.keys().cloned().collect();
        for id in ids {
            self.stop_unit(&id, true).await;
        }
        info!("coordinator drained");
    }

    /// Stops units that have sat empty and idle past the threshold.
    /// Runs on a timer, but callable directly.
    pub async fn sweep_idle(&self) {
        let idle: Vec<RoomId> = {
            let guard = self.rooms.read().await;
            guard
                .iter()
                .filter(|(_, slot)| slot.handle.is_some())
                .filter(|(_, slot)| slot.meta.players == 0 && !slot.meta.hand_in_progress)
                .filter(|(_, slot)| slot.last_active.elapsed() > IDLE_THRESHOLD)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in idle {
            info!("room {id}: idle past threshold, stopping unit");
            self.stop_unit(&id, true).await;
        }
    }

    fn spawn_background(&self, mut notifications: mpsc::Receiver<RoomNotification>) {
        let rooms = Arc::clone(&self.rooms);
        tokio::spawn(async move {
            while let Some(RoomNotification::StateChanged { meta }) = notifications.recv().await {
                let mut guard = rooms.write().await;
                if let Some(slot) = guard.get_mut(&meta.id) {
                    if meta.players > 0 || meta.hand_in_progress {
                        slot.last_active = Instant::now();
                    }
                    slot.meta = meta;
                }
            }
        });
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(IDLE_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                coordinator.sweep_idle().await;
            }
        });
    }

    /// Returns a live handle for the room, starting or reviving its
    /// unit if needed.
    async fn ensure_running(&self, room_id: &RoomId) -> Result<RoomHandle, DispatchError> {
        {
            let guard = self.rooms.read().await;
            let slot = guard.get(room_id).ok_or(DispatchError::UnknownRoom)?;
            if let Some(handle) = &slot.handle {
                if !handle.is_closed() {
                    return Ok(handle.clone());
                }
            }
        }
        let mut guard = self.rooms.write().await;
        let slot = guard.get_mut(room_id).ok_or(DispatchError::UnknownRoom)?;
        if let Some(handle) = &slot.handle {
            if !handle.is_closed() {
                // Someone else revived it between our locks.
                return Ok(handle.clone());
            }
            warn!("room {room_id}: unit is gone, reviving from last snapshot");
        }
        if let Some(join) = slot.join.take() {
            join.abort();
        }
        let engine = RoomEngine::from_snapshot(slot.config.clone(), slot.snapshot.clone());
        let (handle, join) =
            RoomActor::spawn(engine, self.outbound.clone(), self.notifications.clone());
        slot.handle = Some(handle.clone());
        slot.join = Some(join);
        slot.last_active = Instant::now();
        info!("room {room_id}: unit started");
        Ok(handle)
    }

    /// Stops one unit and parks its snapshot (or the default, when the
    /// state is being discarded). No-op for units that are not running.
    async fn stop_unit(&self, id: &RoomId, keep_snapshot: bool) {
        let taken = {
            let mut guard = self.rooms.write().await;
            guard.get_mut(id).and_then(|slot| {
                let handle = slot.handle.take()?;
                Some((handle, slot.join.take()))
            })
        };
        let Some((handle, join)) = taken else {
            return;
        };
        let (envelope, _reply) = TaskEnvelope::new(RoomTask::Stop, None);
        let _ = handle.send(envelope).await;
        let stopped = match join {
            Some(join) => match join.await {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!("room {id}: unit ended abnormally: {err}");
                    None
                }
            },
            None => None,
        };
        let mut guard = self.rooms.write().await;
        if let Some(slot) = guard.get_mut(id) {
            match stopped {
                Some(snapshot) if keep_snapshot => slot.snapshot = snapshot,
                _ if !keep_snapshot => slot.snapshot = RoomSnapshot::default(),
                // Crashed: keep the last graceful snapshot.
                _ => {}
            }
            slot.meta = idle_meta(&slot.config, &slot.snapshot);
        }
    }
}
