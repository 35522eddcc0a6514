use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashMap,
    fmt::{self},
    time::Instant,
};
use uuid::Uuid;

use super::constants;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
    // Wild is used to initialize a deck of cards.
    Wild,
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
            Self::Wild => "w",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values. Deuce is 2u8 and ace is 14u8, so
/// comparisons read the way poker players expect.
pub type Value = u8;

/// A card is a tuple of a uInt8 value (2u8 ... ace=14u8) and a suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            14 => "A".to_string(),
            13 => "K".to_string(),
            12 => "Q".to_string(),
            11 => "J".to_string(),
            v => v.to_string(),
        };
        let repr = format!("{value}/{}", self.1);
        write!(f, "{repr:>4}")
    }
}

#[derive(Debug)]
pub struct Deck {
    cards: [Card; 52],
    pub deck_idx: usize,
}

impl Deck {
    pub fn deal_card(&mut self) -> Card {
        let card = self.cards[self.deck_idx];
        self.deck_idx += 1;
        card
    }

    pub fn remaining(&self) -> usize {
        52 - self.deck_idx
    }

    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut rand::rng());
        self.deck_idx = 0;
    }
}

impl Default for Deck {
    fn default() -> Self {
        let mut cards: [Card; 52] = [Card(0, Suit::Wild); 52];
        for (i, value) in (2u8..=14u8).enumerate() {
            for (j, suit) in [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart]
                .into_iter()
                .enumerate()
            {
                cards[4 * i + j] = Card(value, suit);
            }
        }
        Self { cards, deck_idx: 0 }
    }
}

/// Type alias for whole chips. All bets and player stacks are represented
/// as whole chips (there's no point arguing over fractions).
///
/// If the total chips in a room ever surpass ~4.2 billion, then we may
/// have a problem.
pub type Chips = u32;

/// Opaque, caller-supplied player identity. Connections come and go but the
/// id is the stable key for a seat.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Display name shown in chat lines and logs. Whitespace is flattened to
/// underscores and overly long names are truncated.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Nickname(String);

impl Nickname {
    pub fn new(s: &str) -> Self {
        let mut nickname: String = s
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        nickname.truncate(constants::MAX_NICKNAME_LENGTH);
        Self(nickname)
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for Nickname {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

impl From<String> for Nickname {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for Nickname {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identity of one websocket connection. A fresh id is minted per socket so
/// a disconnect notice from a dead socket can never knock out the live one.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Blinds {
    pub small: Chips,
    pub big: Chips,
}

impl Default for Blinds {
    fn default() -> Self {
        Self {
            small: constants::DEFAULT_SMALL_BLIND,
            big: constants::DEFAULT_BIG_BLIND,
        }
    }
}

impl fmt::Display for Blinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = format!("${}/{}", self.small, self.big);
        write!(f, "{repr}")
    }
}

/// Where a room sits in the hand lifecycle. Showdown is not a resting
/// stage: automated rooms settle the pot within the river transition, and
/// manual rooms go straight to `Distribution`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Idle,
    PreFlop,
    Flop,
    Turn,
    River,
    Distribution,
}

impl Stage {
    /// Betting round number as clients count them: pre-flop is 0 and each
    /// street adds one. Distribution sits past the river.
    pub fn round(&self) -> u8 {
        match self {
            Self::Idle | Self::PreFlop => 0,
            Self::Flop => 1,
            Self::Turn => 2,
            Self::River => 3,
            Self::Distribution => 4,
        }
    }

    pub fn is_betting(&self) -> bool {
        matches!(self, Self::PreFlop | Self::Flop | Self::Turn | Self::River)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Idle => "idle",
            Self::PreFlop => "pre-flop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Distribution => "distribution",
        };
        write!(f, "{repr}")
    }
}

/// A betting action as submitted by a player. `Raise` carries the total
/// bet level to raise to, not the increment.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    Raise { amount: Chips },
    AllIn,
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Fold => "folds".to_string(),
            Self::Check => "checks".to_string(),
            Self::Call => "calls".to_string(),
            Self::Raise { amount } => format!("raises to ${amount}"),
            Self::AllIn => "goes all in".to_string(),
        };
        write!(f, "{repr}")
    }
}

/// Broad category for a chat line so clients can style it.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    System,
    CashIn,
    CashOut,
}

/// One seat in a room. Seats survive disconnects; `conn` is `None` while
/// the player is offline and `last_seen` feeds the removal grace periods.
#[derive(Clone, Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: Nickname,
    pub chips: Chips,
    pub conn: Option<ConnId>,
    pub last_seen: Instant,
    pub cash_ins: u32,
}

impl Player {
    pub fn new(id: PlayerId, name: Nickname, conn: Option<ConnId>) -> Self {
        Self {
            id,
            name,
            chips: 0,
            conn,
            last_seen: Instant::now(),
            cash_ins: 0,
        }
    }

    pub fn connected(&self) -> bool {
        self.conn.is_some()
    }
}

/// Public projection of a seat. Never exposes connection ids.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: Nickname,
    pub chips: Chips,
    pub connected: bool,
    pub cash_ins: u32,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
            chips: player.chips,
            connected: player.connected(),
            cash_ins: player.cash_ins,
        }
    }
}

/// Public projection of a room's roster and flags, broadcast as
/// `room_update`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RoomView {
    pub id: RoomId,
    pub name: String,
    pub max_players: usize,
    pub locked: bool,
    pub auto_start: bool,
    pub automated: bool,
    pub stage: Stage,
    pub players: Vec<PlayerView>,
}

/// Public projection of the table mid-hand, broadcast as `game_state`.
/// The deck and hole cards never appear here; hole cards travel only in
/// per-connection `deal_hand` events.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GameStateView {
    pub stage: Stage,
    pub round: u8,
    pub community_cards: Vec<Card>,
    pub pot: Chips,
    pub bets: HashMap<PlayerId, Chips>,
    pub total_bets: HashMap<PlayerId, Chips>,
    pub current_bet: Chips,
    pub current_turn: Option<PlayerId>,
    pub dealer: Option<PlayerId>,
    pub participants: Vec<PlayerId>,
    pub folded: Vec<PlayerId>,
    pub blinds: Blinds,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_deck_has_52_unique_cards() {
        let mut deck = Deck::default();
        let cards: BTreeSet<Card> = (0..52).map(|_| deck.deal_card()).collect();
        assert_eq!(cards.len(), 52);
        assert!(cards.iter().all(|card| card.0 >= 2 && card.0 <= 14));
        assert!(cards.iter().all(|card| card.1 != Suit::Wild));
    }

    #[test]
    fn test_deck_shuffle_resets_and_preserves_cards() {
        let mut deck = Deck::default();
        for _ in 0..10 {
            deck.deal_card();
        }
        deck.shuffle();
        assert_eq!(deck.deck_idx, 0);
        assert_eq!(deck.remaining(), 52);
        let cards: BTreeSet<Card> = (0..52).map(|_| deck.deal_card()).collect();
        assert_eq!(cards.len(), 52);
    }

    #[test]
    fn test_nickname_sanitizes_whitespace() {
        let name = Nickname::new("ol' dirty\tbastard");
        assert_eq!(name.to_string(), "ol'_dirty_bastard");
    }

    #[test]
    fn test_nickname_truncates() {
        let name = Nickname::new(&"x".repeat(100));
        assert_eq!(name.to_string().len(), constants::MAX_NICKNAME_LENGTH);
    }

    #[test]
    fn test_blinds_display() {
        let blinds = Blinds { small: 5, big: 10 };
        assert_eq!(blinds.to_string(), "$5/10");
    }

    #[test]
    fn test_stage_rounds() {
        assert_eq!(Stage::PreFlop.round(), 0);
        assert_eq!(Stage::Flop.round(), 1);
        assert_eq!(Stage::Turn.round(), 2);
        assert_eq!(Stage::River.round(), 3);
        assert_eq!(Stage::Distribution.round(), 4);
        assert!(!Stage::Idle.is_betting());
        assert!(!Stage::Distribution.is_betting());
        assert!(Stage::River.is_betting());
    }

    #[test]
    fn test_stage_wire_names() {
        assert_eq!(
            serde_json::to_string(&Stage::PreFlop).unwrap(),
            "\"PRE_FLOP\""
        );
        assert_eq!(serde_json::to_string(&Stage::Idle).unwrap(), "\"IDLE\"");
    }

    #[test]
    fn test_action_wire_format() {
        let action: PlayerAction =
            serde_json::from_str(r#"{"type":"raise","amount":50}"#).unwrap();
        assert_eq!(action, PlayerAction::Raise { amount: 50 });
        let action: PlayerAction = serde_json::from_str(r#"{"type":"allin"}"#).unwrap();
        assert_eq!(action, PlayerAction::AllIn);
        assert!(serde_json::from_str::<PlayerAction>(r#"{"type":"bet","amount":50}"#).is_err());
    }

    #[test]
    fn test_stale_conn_never_matches_fresh_one() {
        let player = Player::new(
            PlayerId::from("p1"),
            Nickname::new("p1"),
            Some(ConnId::new()),
        );
        assert!(player.connected());
        assert_ne!(player.conn, Some(ConnId::new()));
    }
}
