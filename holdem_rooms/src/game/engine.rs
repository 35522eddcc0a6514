//! The room engine: seats, hand lifecycle, betting rounds, and settlement.
//!
//! [`RoomEngine`] is synchronous and owns everything about one room. It
//! never talks to the outside world directly; every visible effect is
//! queued as an [`EngineEvent`] and the caller drains the queue after
//! each call. Timers live with the caller too: the engine announces how
//! long a player has through `action_request` events and exposes
//! [`RoomEngine::handle_timeout`] for when the caller decides time is up.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::constants::{
    ACTION_WINDOW, CASH_IN_AMOUNT, LONG_DISCONNECT_GRACE, SHORT_DISCONNECT_GRACE,
};
use crate::game::entities::{
    Blinds, Card, ChatKind, Chips, ConnId, Deck, GameStateView, Nickname, Player, PlayerAction,
    PlayerId, PlayerView, RoomView, Stage,
};
use crate::game::evaluator::{HandScore, evaluate};
use crate::game::settlement::side_pots;
use crate::room::config::RoomConfig;
use crate::room::messages::{RoomEvent, RoomMeta};

const ACTION_SECONDS: u32 = ACTION_WINDOW.as_secs() as u32;

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GameError {
    #[error("room is full")]
    RoomFull,
    #[error("room is locked")]
    RoomLocked,
    #[error("player not found")]
    UnknownPlayer,
    #[error("session expired")]
    SessionExpired,
    #[error("hand already in progress")]
    HandInProgress,
    #[error("no hand in progress")]
    NoHandInProgress,
    #[error("need at least two players with chips")]
    InsufficientPlayers,
    #[error("{0} cannot cover the blind")]
    CannotCoverBlind(PlayerId),
    #[error("not your turn")]
    OutOfTurn,
    #[error("already folded")]
    AlreadyFolded,
    #[error("cannot check while a bet is live")]
    CheckUnavailable,
    #[error("nothing to call")]
    NothingToCall,
    #[error("raise must exceed the current bet")]
    RaiseTooSmall,
    #[error("only manual rooms distribute by hand")]
    ManualOnly,
    #[error("pot is not up for distribution")]
    NotDistributing,
    #[error("amount exceeds the pot")]
    ExceedsPot,
    #[error("pot is already empty")]
    PotEmpty,
}

/// One engine emission. Broadcasts go to every connection in the room,
/// directs to exactly one.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Broadcast(RoomEvent),
    Direct { conn: ConnId, event: RoomEvent },
}

/// Durable subset of a seat, kept when a room unit is stopped.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: Nickname,
    pub chips: Chips,
    pub cash_ins: u32,
}

/// Durable subset of room state, used to revive a stopped unit. Hands
/// never survive a stop; units only stop while idle.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RoomSnapshot {
    pub players: Vec<PlayerSnapshot>,
    pub locked: bool,
    pub auto_start: bool,
    pub button: usize,
}

/// Per-hand state, reset wholesale when the hand ends.
#[derive(Debug)]
struct HandState {
    deck: Deck,
    stage: Stage,
    community: Vec<Card>,
    pot: Chips,
    current_bet: Chips,
    participants: Vec<PlayerId>,
    dealer_idx: usize,
    turn: Option<PlayerId>,
    folded: HashSet<PlayerId>,
    acted: HashSet<PlayerId>,
    bets: HashMap<PlayerId, Chips>,
    total_bets: HashMap<PlayerId, Chips>,
    hands: HashMap<PlayerId, [Card; 2]>,
}

impl Default for HandState {
    fn default() -> Self {
        Self {
            deck: Deck::default(),
            stage: Stage::Idle,
            community: Vec::new(),
            pot: 0,
            current_bet: 0,
            participants: Vec::new(),
            dealer_idx: 0,
            turn: None,
            folded: HashSet::new(),
            acted: HashSet::new(),
            bets: HashMap::new(),
            total_bets: HashMap::new(),
            hands: HashMap::new(),
        }
    }
}

/// One room's complete state and rules.
#[derive(Debug)]
pub struct RoomEngine {
    config: RoomConfig,
    players: Vec<Player>,
    locked: bool,
    auto_start: bool,
    button: usize,
    hand: HandState,
    events: VecDeque<EngineEvent>,
    pending_removals: BTreeSet<PlayerId>,
}

impl RoomEngine {
    pub fn new(config: RoomConfig) -> Self {
        let auto_start = config.automated;
        Self {
            config,
            players: Vec::new(),
            locked: false,
            auto_start,
            button: 0,
            hand: HandState::default(),
            events: VecDeque::new(),
            pending_removals: BTreeSet::new(),
        }
    }

    /// Revives a room from the roster snapshot of a stopped unit. Every
    /// seat comes back disconnected with a fresh activity timestamp.
    pub fn from_snapshot(config: RoomConfig, snapshot: RoomSnapshot) -> Self {
        let mut engine = Self::new(config);
        engine.locked = snapshot.locked;
        engine.auto_start = snapshot.auto_start;
        engine.button = snapshot.button;
        engine.players = snapshot
            .players
            .into_iter()
            .map(|seat| {
                let mut player = Player::new(seat.id, seat.name, None);
                player.chips = seat.chips;
                player.cash_ins = seat.cash_ins;
                player
            })
            .collect();
        engine
    }

    // Seat management

    /// Seats a new player, or revives an existing seat. A revived seat
    /// keeps its original nickname and chips; only the connection and
    /// activity timestamp change.
    pub fn join(
        &mut self,
        id: PlayerId,
        name: Nickname,
        conn: Option<ConnId>,
    ) -> Result<(), GameError> {
        if let Some(seat) = self.players.iter().position(|p| p.id == id) {
            self.players[seat].conn = conn;
            self.players[seat].last_seen = Instant::now();
            let name = self.players[seat].name.clone();
            self.system_chat(format!("{name} is back online"));
            self.broadcast_room();
            if let Some(conn) = conn {
                self.sync_to_conn(conn, &id);
            }
            return Ok(());
        }
        if self.locked {
            return Err(GameError::RoomLocked);
        }
        if self.players.len() >= self.config.max_players {
            return Err(GameError::RoomFull);
        }
        self.players.push(Player::new(id.clone(), name.clone(), conn));
        self.system_chat(format!("{name} joined the room"));
        self.broadcast_room();
        if let Some(conn) = conn {
            self.sync_to_conn(conn, &id);
        }
        Ok(())
    }

    /// Binds an existing seat to a fresh connection and replays the
    /// room's current state to it.
    pub fn reconnect(&mut self, id: &PlayerId, conn: ConnId) -> Result<(), GameError> {
        let seat = self
            .players
            .iter()
            .position(|p| &p.id == id)
            .ok_or(GameError::SessionExpired)?;
        self.players[seat].conn = Some(conn);
        self.players[seat].last_seen = Instant::now();
        let name = self.players[seat].name.clone();
        self.system_chat(format!("{name} reconnected"));
        self.broadcast_room();
        self.sync_to_conn(conn, id);
        Ok(())
    }

    pub fn cash_in(&mut self, id: &PlayerId) -> Result<(), GameError> {
        let seat = self.seat_index(id)?;
        self.players[seat].chips += CASH_IN_AMOUNT;
        self.players[seat].cash_ins += 1;
        let name = self.players[seat].name.clone();
        self.chat(
            ChatKind::CashIn,
            format!("{name} cashed in ${CASH_IN_AMOUNT}"),
        );
        self.broadcast_room();
        Ok(())
    }

    /// Leaves the room. Mid-hand the seat is folded out of the action
    /// and the removal waits for the hand to end, so settled pots never
    /// reference a vanished seat.
    pub fn cash_out(&mut self, id: &PlayerId) -> Result<(), GameError> {
        let seat = self.seat_index(id)?;
        let name = self.players[seat].name.clone();
        let in_hand = self.hand.stage != Stage::Idle && self.hand.participants.contains(id);
        if !in_hand {
            self.players.remove(seat);
            self.chat(
                ChatKind::CashOut,
                format!("{name} cashed out and left the room"),
            );
            self.broadcast_room();
            return Ok(());
        }
        self.pending_removals.insert(id.clone());
        self.chat(
            ChatKind::CashOut,
            format!("{name} cashed out and leaves after this hand"),
        );
        self.broadcast_room();
        if self.hand.stage.is_betting() && !self.hand.folded.contains(id) {
            self.hand.folded.insert(id.clone());
            self.hand.acted.insert(id.clone());
            if self.hand.turn.as_ref() == Some(id) || self.active_players().len() <= 1 {
                self.advance();
            } else if self.round_complete() {
                self.close_round();
            }
        }
        Ok(())
    }

    pub fn chat_message(&mut self, id: &PlayerId, message: &str) -> Result<(), GameError> {
        let seat = self.seat_index(id)?;
        let name = self.players[seat].name.clone();
        self.broadcast(RoomEvent::player_chat(format!("{name}: {message}")));
        Ok(())
    }

    /// Liveness ping. Unknown ids are ignored so a racing removal never
    /// turns a heartbeat into an error.
    pub fn heartbeat(&mut self, id: &PlayerId) -> Result<(), GameError> {
        if let Some(player) = self.players.iter_mut().find(|p| &p.id == id) {
            player.last_seen = Instant::now();
        }
        Ok(())
    }

    /// Marks a seat offline, but only if it still holds the connection
    /// the notice came from. A notice from a superseded socket is stale
    /// and ignored.
    pub fn mark_offline(&mut self, id: &PlayerId, conn: ConnId) {
        let Some(seat) = self.players.iter().position(|p| &p.id == id) else {
            return;
        };
        if self.players[seat].conn != Some(conn) {
            return;
        }
        self.players[seat].conn = None;
        self.players[seat].last_seen = Instant::now();
        let name = self.players[seat].name.clone();
        self.system_chat(format!("{name} went offline"));
        self.broadcast_room();
    }

    /// Removes offline seats that have been quiet past their grace
    /// period: fifteen minutes with chips, ten seconds broke. Never
    /// touches a room mid-hand; the reaper is called again once the
    /// hand ends.
    pub fn reap_offline(&mut self, now: Instant) {
        if self.hand.stage != Stage::Idle {
            return;
        }
        let leaving: Vec<(PlayerId, Nickname)> = self
            .players
            .iter()
            .filter(|p| !p.connected())
            .filter(|p| {
                let quiet = now.saturating_duration_since(p.last_seen);
                let grace = if p.chips > 0 {
                    LONG_DISCONNECT_GRACE
                } else {
                    SHORT_DISCONNECT_GRACE
                };
                quiet > grace
            })
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();
        if leaving.is_empty() {
            return;
        }
        for (id, name) in leaving {
            self.players.retain(|p| p.id != id);
            self.system_chat(format!("{name} was removed after being away too long"));
        }
        self.broadcast_room();
    }

    pub fn toggle_auto_start(&mut self, id: &PlayerId) -> Result<(), GameError> {
        let seat = self.seat_index(id)?;
        self.auto_start = !self.auto_start;
        let name = self.players[seat].name.clone();
        let state = if self.auto_start { "enabled" } else { "disabled" };
        self.system_chat(format!("{name} {state} auto-start"));
        self.broadcast_room();
        Ok(())
    }

    /// Locking blocks new seats only. Members keep playing and can
    /// still rejoin through their existing seat.
    pub fn toggle_lock(&mut self, id: &PlayerId) -> Result<(), GameError> {
        let seat = self.seat_index(id)?;
        self.locked = !self.locked;
        let name = self.players[seat].name.clone();
        let state = if self.locked { "locked" } else { "unlocked" };
        self.system_chat(format!("{name} {state} the room"));
        self.broadcast_room();
        Ok(())
    }

    /// Wipes the room back to an empty idle state. Emits nothing; the
    /// caller is expected to drop the room's connections itself.
    pub fn reset(&mut self) {
        self.players.clear();
        self.locked = false;
        self.auto_start = self.config.automated;
        self.button = 0;
        self.hand = HandState::default();
        self.events.clear();
        self.pending_removals.clear();
    }

    // Hand flow

    pub fn start_game(&mut self, id: &PlayerId) -> Result<(), GameError> {
        self.seat_index(id)?;
        if self.hand.stage != Stage::Idle {
            return Err(GameError::HandInProgress);
        }
        let participants: Vec<PlayerId> = self
            .players
            .iter()
            .filter(|p| p.chips > 0 && p.connected())
            .map(|p| p.id.clone())
            .collect();
        if participants.len() < 2 {
            return Err(GameError::InsufficientPlayers);
        }
        self.begin_hand(participants)
    }

    pub fn submit_action(&mut self, id: &PlayerId, action: PlayerAction) -> Result<(), GameError> {
        if !self.hand.stage.is_betting() {
            return Err(GameError::NoHandInProgress);
        }
        let seat = self.seat_index(id)?;
        if self.hand.folded.contains(id) {
            return Err(GameError::AlreadyFolded);
        }
        if self.hand.turn.as_ref() != Some(id) {
            return Err(GameError::OutOfTurn);
        }
        let name = self.players[seat].name.clone();
        let committed = self.hand.bets.get(id).copied().unwrap_or(0);
        let gap = self.hand.current_bet.saturating_sub(committed);
        let stack = self.players[seat].chips;
        match action {
            PlayerAction::Check => {
                if gap > 0 {
                    return Err(GameError::CheckUnavailable);
                }
                self.hand.acted.insert(id.clone());
                self.system_chat(format!("{name} checks"));
            }
            PlayerAction::Call => {
                if gap == 0 {
                    return Err(GameError::NothingToCall);
                }
                let pay = gap.min(stack);
                self.move_chips(seat, pay);
                self.hand.acted.insert(id.clone());
                if pay < gap {
                    self.system_chat(format!("{name} calls ${pay} and is all in"));
                } else {
                    self.system_chat(format!("{name} calls ${pay}"));
                }
                self.broadcast_room();
            }
            PlayerAction::Raise { amount } => {
                if amount <= self.hand.current_bet {
                    return Err(GameError::RaiseTooSmall);
                }
                let need = amount - committed;
                if need >= stack {
                    // Not enough behind to reach the named level.
                    self.apply_all_in(seat, &name);
                } else {
                    self.move_chips(seat, need);
                    self.hand.current_bet = amount;
                    self.hand.acted.clear();
                    self.hand.acted.insert(id.clone());
                    self.system_chat(format!("{name} raises to ${amount}"));
                }
                self.broadcast_room();
            }
            PlayerAction::AllIn => {
                self.apply_all_in(seat, &name);
                self.broadcast_room();
            }
            PlayerAction::Fold => {
                self.hand.folded.insert(id.clone());
                self.hand.acted.insert(id.clone());
                self.system_chat(format!("{name} folds"));
            }
        }
        self.advance();
        Ok(())
    }

    /// Rearms the action window for the player on the clock.
    pub fn extend_time(&mut self, id: &PlayerId) -> Result<(), GameError> {
        if !self.hand.stage.is_betting() {
            return Err(GameError::NoHandInProgress);
        }
        if self.hand.turn.as_ref() != Some(id) {
            return Err(GameError::OutOfTurn);
        }
        let name = self.nickname_of(id);
        self.system_chat(format!(
            "[{name} extends the action timer by {ACTION_SECONDS}s]"
        ));
        self.broadcast(RoomEvent::ActionRequest {
            player_id: id.clone(),
            seconds: ACTION_SECONDS,
        });
        Ok(())
    }

    /// Called when the action window expires. Checks for the player on
    /// the clock when checking is free, folds them otherwise.
    pub fn handle_timeout(&mut self) {
        if !self.hand.stage.is_betting() {
            return;
        }
        let Some(id) = self.hand.turn.clone() else {
            return;
        };
        let committed = self.hand.bets.get(&id).copied().unwrap_or(0);
        let gap = self.hand.current_bet.saturating_sub(committed);
        let name = self.nickname_of(&id);
        if gap == 0 {
            self.hand.acted.insert(id);
            self.system_chat(format!("[{name} timed out, checking automatically]"));
        } else {
            self.hand.folded.insert(id.clone());
            self.hand.acted.insert(id);
            self.system_chat(format!("[{name} timed out, folding automatically]"));
        }
        self.advance();
    }

    /// Manual rooms: moves part of the pot to the sender's stack. The
    /// hand ends once the pot is empty.
    pub fn take(&mut self, id: &PlayerId, amount: Chips) -> Result<(), GameError> {
        if self.config.automated {
            return Err(GameError::ManualOnly);
        }
        if self.hand.stage != Stage::Distribution {
            return Err(GameError::NotDistributing);
        }
        let seat = self.seat_index(id)?;
        if amount > self.hand.pot {
            return Err(GameError::ExceedsPot);
        }
        self.players[seat].chips += amount;
        self.hand.pot -= amount;
        let name = self.players[seat].name.clone();
        self.system_chat(format!("{name} takes ${amount} from the pot"));
        self.broadcast_room();
        self.broadcast_state();
        if self.hand.pot == 0 {
            self.finish_hand();
        }
        Ok(())
    }

    /// Manual rooms: claims whatever remains of the pot and ends the
    /// hand.
    pub fn take_all(&mut self, id: &PlayerId) -> Result<(), GameError> {
        if self.config.automated {
            return Err(GameError::ManualOnly);
        }
        if self.hand.stage != Stage::Distribution {
            return Err(GameError::NotDistributing);
        }
        let seat = self.seat_index(id)?;
        if self.hand.pot == 0 {
            return Err(GameError::PotEmpty);
        }
        let amount = self.hand.pot;
        self.players[seat].chips += amount;
        self.hand.pot = 0;
        let name = self.players[seat].name.clone();
        self.system_chat(format!("{name} takes the rest of the pot (${amount})"));
        self.broadcast_room();
        self.broadcast_state();
        self.finish_hand();
        Ok(())
    }

    // Queries

    pub fn stage(&self) -> Stage {
        self.hand.stage
    }

    pub fn turn(&self) -> Option<&PlayerId> {
        self.hand.turn.as_ref()
    }

    pub fn pot(&self) -> Chips {
        self.hand.pot
    }

    pub fn hand_in_progress(&self) -> bool {
        self.hand.stage != Stage::Idle
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn meta(&self) -> RoomMeta {
        RoomMeta {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            players: self.players.len(),
            connected: self.players.iter().filter(|p| p.connected()).count(),
            max_players: self.config.max_players,
            locked: self.locked,
            automated: self.config.automated,
            hand_in_progress: self.hand_in_progress(),
        }
    }

    pub fn room_view(&self) -> RoomView {
        RoomView {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            max_players: self.config.max_players,
            locked: self.locked,
            auto_start: self.auto_start,
            automated: self.config.automated,
            stage: self.hand.stage,
            players: self.players.iter().map(PlayerView::from).collect(),
        }
    }

    pub fn game_view(&self) -> GameStateView {
        let mut folded: Vec<PlayerId> = self.hand.folded.iter().cloned().collect();
        folded.sort();
        GameStateView {
            stage: self.hand.stage,
            round: self.hand.stage.round(),
            community_cards: self.hand.community.clone(),
            pot: self.hand.pot,
            bets: self.hand.bets.clone(),
            total_bets: self.hand.total_bets.clone(),
            current_bet: self.hand.current_bet,
            current_turn: self.hand.turn.clone(),
            dealer: self.hand.participants.get(self.hand.dealer_idx).cloned(),
            participants: self.hand.participants.clone(),
            folded,
            blinds: self.config.blinds,
        }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    chips: p.chips,
                    cash_ins: p.cash_ins,
                })
                .collect(),
            locked: self.locked,
            auto_start: self.auto_start,
            button: self.button,
        }
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    // Hand internals

    fn begin_hand(&mut self, participants: Vec<PlayerId>) -> Result<(), GameError> {
        let n = participants.len();
        let dealer_idx = (self.button + 1) % n;
        let small_idx = (dealer_idx + 1) % n;
        let big_idx = (small_idx + 1) % n;
        let small_seat = participants[small_idx].clone();
        let big_seat = participants[big_idx].clone();
        let Blinds { small, big } = self.config.blinds;
        // Validate both blinds before touching anything.
        if self.chips_of(&small_seat) < small {
            return Err(GameError::CannotCoverBlind(small_seat));
        }
        if self.chips_of(&big_seat) < big {
            return Err(GameError::CannotCoverBlind(big_seat));
        }
        self.button = dealer_idx;
        self.debit(&small_seat, small);
        self.debit(&big_seat, big);
        let mut hand = HandState {
            deck: Deck::default(),
            stage: Stage::PreFlop,
            community: Vec::new(),
            pot: self.hand.pot + small + big,
            current_bet: big,
            participants: participants.clone(),
            dealer_idx,
            turn: None,
            folded: HashSet::new(),
            // Stays empty so the big blind keeps its option.
            acted: HashSet::new(),
            bets: HashMap::from([(small_seat.clone(), small), (big_seat.clone(), big)]),
            total_bets: HashMap::from([(small_seat.clone(), small), (big_seat.clone(), big)]),
            hands: HashMap::new(),
        };
        if self.config.automated {
            hand.deck.shuffle();
            for id in &participants {
                let cards = [hand.deck.deal_card(), hand.deck.deal_card()];
                hand.hands.insert(id.clone(), cards);
            }
        }
        self.hand = hand;
        self.hand.turn = self.next_eligible_from((big_idx + 1) % n);

        let sb_name = self.nickname_of(&small_seat);
        let bb_name = self.nickname_of(&big_seat);
        self.system_chat("A new hand has started".to_string());
        self.system_chat(format!("{sb_name} posts the small blind (${small})"));
        self.system_chat(format!("{bb_name} posts the big blind (${big})"));
        if !self.config.automated {
            self.system_chat("Deal two cards to each player".to_string());
        }
        self.broadcast(RoomEvent::GameStarted);
        self.broadcast_room();
        self.broadcast_state();
        if self.config.automated {
            let deals: Vec<(ConnId, Vec<Card>)> = self
                .players
                .iter()
                .filter_map(|p| {
                    let conn = p.conn?;
                    let hole = self.hand.hands.get(&p.id)?;
                    Some((conn, hole.to_vec()))
                })
                .collect();
            for (conn, hole) in deals {
                self.direct(conn, RoomEvent::DealHand { hand: hole });
            }
        }
        match self.hand.turn.clone() {
            Some(player) => self.request_action(player),
            // Both blinds are all in; nothing left to bet.
            None => self.close_round(),
        }
        Ok(())
    }

    /// Moves the hand forward after any action: ends it when at most
    /// one player is live, closes the round when betting is settled,
    /// and passes the turn otherwise.
    fn advance(&mut self) {
        let active = self.active_players();
        if active.len() <= 1 {
            let pot = self.hand.pot;
            if let Some(winner) = active.first() {
                let name = self.nickname_of(winner);
                if let Some(seat) = self.players.iter().position(|p| &p.id == winner) {
                    self.players[seat].chips += pot;
                }
                self.hand.pot = 0;
                self.system_chat(format!("{name} wins the pot (${pot})"));
                self.broadcast_room();
            }
            self.finish_hand();
            return;
        }
        if self.round_complete() {
            self.close_round();
            return;
        }
        let next = self
            .hand
            .turn
            .clone()
            .and_then(|current| self.next_eligible_after(&current));
        match next {
            Some(player) => {
                self.hand.turn = Some(player.clone());
                self.broadcast_state();
                self.request_action(player);
            }
            None => self.close_round(),
        }
    }

    /// A betting round is settled once every live player who can still
    /// bet has acted and matched the current bet. Players who are all
    /// in are exempt, so a short blind can never stall the hand.
    fn round_complete(&self) -> bool {
        self.hand
            .participants
            .iter()
            .filter(|id| !self.hand.folded.contains(*id))
            .filter(|id| self.chips_of(id) > 0)
            .all(|id| {
                self.hand.acted.contains(id)
                    && self.hand.bets.get(id).copied().unwrap_or(0) == self.hand.current_bet
            })
    }

    fn close_round(&mut self) {
        self.hand.acted.clear();
        self.hand.bets.clear();
        self.hand.current_bet = 0;
        let can_bet = self
            .active_players()
            .iter()
            .filter(|id| self.chips_of(id) > 0)
            .count();
        if can_bet <= 1 {
            // No betting left; run the board out to showdown.
            while self.hand.stage != Stage::River {
                self.hand.stage = next_street(self.hand.stage);
                self.deal_street();
            }
            self.showdown();
            return;
        }
        if self.hand.stage == Stage::River {
            self.showdown();
            return;
        }
        self.hand.stage = next_street(self.hand.stage);
        self.deal_street();
        let start = (self.hand.dealer_idx + 1) % self.hand.participants.len();
        if let Some(player) = self.next_eligible_from(start) {
            self.hand.turn = Some(player.clone());
            self.broadcast_state();
            self.request_action(player);
        }
    }

    fn deal_street(&mut self) {
        if !self.config.automated {
            let prompt = match self.hand.stage {
                Stage::Flop => "Deal three community cards (the flop)",
                Stage::Turn => "Deal one community card (the turn)",
                _ => "Deal one community card (the river)",
            };
            self.system_chat(prompt.to_string());
            return;
        }
        match self.hand.stage {
            Stage::Flop => {
                let cards = [
                    self.hand.deck.deal_card(),
                    self.hand.deck.deal_card(),
                    self.hand.deck.deal_card(),
                ];
                self.hand.community.extend(cards);
                self.system_chat(format!("Flop:{}{}{}", cards[0], cards[1], cards[2]));
            }
            Stage::Turn => {
                let card = self.hand.deck.deal_card();
                self.hand.community.push(card);
                self.system_chat(format!("Turn:{card}"));
            }
            _ => {
                let card = self.hand.deck.deal_card();
                self.hand.community.push(card);
                self.system_chat(format!("River:{card}"));
            }
        }
    }

    /// Settles the hand with two or more players still live. Manual
    /// rooms hold at `Distribution` for the croupier; automated rooms
    /// evaluate hands and pay out layered pots immediately.
    fn showdown(&mut self) {
        self.hand.turn = None;
        if !self.config.automated {
            self.hand.stage = Stage::Distribution;
            let pot = self.hand.pot;
            self.system_chat("Players, show your hands".to_string());
            self.system_chat(format!(
                "The pot holds ${pot}. Use take or take all to split it."
            ));
            self.broadcast(RoomEvent::DistributionStart);
            self.broadcast_state();
            self.broadcast_room();
            return;
        }

        let active = self.active_players();
        let board: String = self.hand.community.iter().map(|c| c.to_string()).collect();
        self.system_chat("Showdown!".to_string());
        self.system_chat(format!("Board:{board}"));

        let mut scores: HashMap<PlayerId, HandScore> = HashMap::new();
        for id in &active {
            if let Some(hole) = self.hand.hands.get(id) {
                let mut cards = hole.to_vec();
                cards.extend(self.hand.community.iter().copied());
                scores.insert(id.clone(), evaluate(&cards));
            }
        }
        let mut lines = Vec::new();
        for id in &active {
            if let Some(score) = scores.get(id) {
                let hole = self.hand.hands[id];
                lines.push(format!(
                    "{} shows{}{} ({})",
                    self.nickname_of(id),
                    hole[0],
                    hole[1],
                    score.rank().name()
                ));
            }
        }
        for line in lines {
            self.system_chat(line);
        }

        let active_set: HashSet<PlayerId> = active.iter().cloned().collect();
        let pots = side_pots(&self.hand.total_bets, &active_set);
        let order = self.dealer_order();
        let mut orphaned: Chips = 0;
        let mut awards: Vec<(Vec<PlayerId>, Chips)> = Vec::new();
        for pot in &pots {
            if pot.eligible.is_empty() {
                // Every contributor at this level folded.
                orphaned += pot.amount;
                continue;
            }
            awards.push((best_hands(pot.eligible.iter(), &scores), pot.amount));
        }
        for (winners, amount) in awards {
            self.pay_out(&winners, amount, &order, &scores, false);
        }
        if orphaned > 0 {
            let winners = best_hands(active.iter(), &scores);
            self.pay_out(&winners, orphaned, &order, &scores, true);
        }
        self.hand.pot = 0;
        self.broadcast_room();
        self.finish_hand();
    }

    /// Splits one pot layer between its winners. An uneven split leaves
    /// the odd chips with the first winner clockwise from the dealer.
    fn pay_out(
        &mut self,
        winners: &[PlayerId],
        amount: Chips,
        order: &[PlayerId],
        scores: &HashMap<PlayerId, HandScore>,
        forfeited: bool,
    ) {
        if winners.is_empty() || amount == 0 {
            return;
        }
        let share = amount / winners.len() as Chips;
        let remainder = amount % winners.len() as Chips;
        for id in winners {
            if let Some(seat) = self.players.iter().position(|p| &p.id == id) {
                self.players[seat].chips += share;
            }
        }
        if remainder > 0 {
            if let Some(first) = order.iter().find(|id| winners.contains(id)) {
                if let Some(seat) = self.players.iter().position(|p| &p.id == first) {
                    self.players[seat].chips += remainder;
                }
            }
        }
        let rank = scores
            .get(&winners[0])
            .map(|score| score.rank().name())
            .unwrap_or("unknown");
        if winners.len() == 1 {
            let name = self.nickname_of(&winners[0]);
            if forfeited {
                self.system_chat(format!("{name} wins ${amount} from forfeited bets"));
            } else {
                self.system_chat(format!("{name} wins ${amount} with {rank}"));
            }
        } else {
            let names: Vec<String> = winners.iter().map(|id| self.nickname_of(id)).collect();
            let names = names.join(", ");
            if forfeited {
                self.system_chat(format!("Split: {names} share ${amount} from forfeited bets"));
            } else {
                self.system_chat(format!("Split pot: {names} each win ${share} with {rank}"));
            }
        }
    }

    /// Ends the hand: clears per-hand state, applies deferred
    /// removals, and kicks off the next hand when auto-start applies.
    fn finish_hand(&mut self) {
        self.hand = HandState::default();
        if !self.pending_removals.is_empty() {
            let leaving = std::mem::take(&mut self.pending_removals);
            self.players.retain(|p| !leaving.contains(&p.id));
        }
        self.broadcast_room();
        self.broadcast(RoomEvent::GameOver);
        if self.auto_start {
            let eligible: Vec<PlayerId> = self
                .players
                .iter()
                .filter(|p| p.chips > 0 && p.connected())
                .map(|p| p.id.clone())
                .collect();
            if eligible.len() >= 2 {
                self.system_chat("Auto-starting the next hand".to_string());
                if let Err(err) = self.begin_hand(eligible) {
                    self.system_chat(format!("Cannot auto-start: {err}"));
                }
            }
        }
    }

    /// Replays the room's current state to one connection, so a client
    /// landing mid-hand sees the same picture as everyone else.
    fn sync_to_conn(&mut self, conn: ConnId, id: &PlayerId) {
        let room = self.room_view();
        self.direct(conn, RoomEvent::RoomUpdate { room });
        if self.hand.stage == Stage::Idle {
            return;
        }
        self.direct(conn, RoomEvent::GameStarted);
        let state = self.game_view();
        self.direct(conn, RoomEvent::GameState { state });
        if self.config.automated {
            let hole = self.hand.hands.get(id).map(|h| h.to_vec());
            if let Some(hole) = hole {
                self.direct(conn, RoomEvent::DealHand { hand: hole });
            }
        }
        if self.hand.stage == Stage::Distribution {
            self.direct(conn, RoomEvent::DistributionStart);
        } else if let Some(turn) = self.hand.turn.clone() {
            // Zero is a placeholder; the unit rewrites it with the
            // real remaining time before sending.
            self.direct(
                conn,
                RoomEvent::ActionRequest {
                    player_id: turn,
                    seconds: 0,
                },
            );
        }
    }

    // Small helpers

    fn seat_index(&self, id: &PlayerId) -> Result<usize, GameError> {
        self.players
            .iter()
            .position(|p| &p.id == id)
            .ok_or(GameError::UnknownPlayer)
    }

    fn chips_of(&self, id: &PlayerId) -> Chips {
        self.players
            .iter()
            .find(|p| &p.id == id)
            .map(|p| p.chips)
            .unwrap_or(0)
    }

    fn debit(&mut self, id: &PlayerId, amount: Chips) {
        if let Some(player) = self.players.iter_mut().find(|p| &p.id == id) {
            player.chips -= amount;
        }
    }

    fn nickname_of(&self, id: &PlayerId) -> String {
        self.players
            .iter()
            .find(|p| &p.id == id)
            .map(|p| p.name.to_string())
            .unwrap_or_else(|| id.to_string())
    }

    fn active_players(&self) -> Vec<PlayerId> {
        self.hand
            .participants
            .iter()
            .filter(|id| !self.hand.folded.contains(*id))
            .cloned()
            .collect()
    }

    /// Next participant clockwise from `start` who is still in the
    /// hand and has chips to bet with.
    fn next_eligible_from(&self, start: usize) -> Option<PlayerId> {
        let n = self.hand.participants.len();
        for offset in 0..n {
            let idx = (start + offset) % n;
            let id = &self.hand.participants[idx];
            if self.hand.folded.contains(id) || self.chips_of(id) == 0 {
                continue;
            }
            return Some(id.clone());
        }
        None
    }

    fn next_eligible_after(&self, current: &PlayerId) -> Option<PlayerId> {
        let n = self.hand.participants.len();
        let pos = self.hand.participants.iter().position(|p| p == current)?;
        self.next_eligible_from((pos + 1) % n)
    }

    /// Seats in clockwise order starting left of the dealer.
    fn dealer_order(&self) -> Vec<PlayerId> {
        let n = self.hand.participants.len();
        (0..n)
            .map(|offset| self.hand.participants[(self.hand.dealer_idx + 1 + offset) % n].clone())
            .collect()
    }

    fn move_chips(&mut self, seat: usize, pay: Chips) {
        let id = self.players[seat].id.clone();
        self.players[seat].chips -= pay;
        *self.hand.bets.entry(id.clone()).or_insert(0) += pay;
        *self.hand.total_bets.entry(id).or_insert(0) += pay;
        self.hand.pot += pay;
    }

    fn apply_all_in(&mut self, seat: usize, name: &Nickname) {
        let id = self.players[seat].id.clone();
        let stack = self.players[seat].chips;
        self.move_chips(seat, stack);
        let committed = self.hand.bets.get(&id).copied().unwrap_or(0);
        if committed > self.hand.current_bet {
            self.hand.current_bet = committed;
            self.hand.acted.clear();
        }
        self.hand.acted.insert(id);
        self.system_chat(format!("{name} goes all in (${committed})"));
    }

    // Event queue

    fn broadcast(&mut self, event: RoomEvent) {
        self.events.push_back(EngineEvent::Broadcast(event));
    }

    fn direct(&mut self, conn: ConnId, event: RoomEvent) {
        self.events.push_back(EngineEvent::Direct { conn, event });
    }

    fn system_chat(&mut self, message: String) {
        self.broadcast(RoomEvent::system_chat(message));
    }

    fn chat(&mut self, kind: ChatKind, message: String) {
        self.broadcast(RoomEvent::ChatBroadcast {
            message,
            kind: Some(kind),
        });
    }

    fn broadcast_room(&mut self) {
        let room = self.room_view();
        self.broadcast(RoomEvent::RoomUpdate { room });
    }

    fn broadcast_state(&mut self) {
        let state = self.game_view();
        self.broadcast(RoomEvent::GameState { state });
    }

    fn request_action(&mut self, player: PlayerId) {
        self.broadcast(RoomEvent::ActionRequest {
            player_id: player,
            seconds: ACTION_SECONDS,
        });
    }
}

fn next_street(stage: Stage) -> Stage {
    match stage {
        Stage::PreFlop => Stage::Flop,
        Stage::Flop => Stage::Turn,
        _ => Stage::River,
    }
}

/// All ids holding the best score among `ids`. Ties return everyone.
fn best_hands<'a, I>(ids: I, scores: &HashMap<PlayerId, HandScore>) -> Vec<PlayerId>
where
    I: IntoIterator<Item = &'a PlayerId>,
{
    let mut best: Option<HandScore> = None;
    let mut winners = Vec::new();
    for id in ids {
        let Some(score) = scores.get(id) else {
            continue;
        };
        match best {
            Some(top) if *score < top => {}
            Some(top) if *score == top => winners.push(id.clone()),
            _ => {
                best = Some(*score);
                winners.clear();
                winners.push(id.clone());
            }
        }
    }
    winners
}
