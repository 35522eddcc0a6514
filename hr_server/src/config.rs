//! Server configuration.
//!
//! Consolidates all environment variable reads and turns them into the
//! room roster the coordinator is provisioned with.

use std::net::SocketAddr;

use holdem_rooms::game::constants::MAX_SEATS;
use holdem_rooms::game::entities::{Blinds, Chips};
use holdem_rooms::room::RoomConfig;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Password required by `POST /reset`
    pub reset_password: String,
    /// Keep room units warm across resets and idle sweeps
    pub preserve_units: bool,
    /// Manual rooms (physical deck) to provision
    pub manual_rooms: usize,
    /// Automated rooms (server-dealt) to provision
    pub auto_rooms: usize,
    /// Seats and blinds applied to every room
    pub room_defaults: RoomDefaultsConfig,
}

/// Default per-room settings
#[derive(Debug, Clone)]
pub struct RoomDefaultsConfig {
    pub max_players: usize,
    pub small_blind: Chips,
    pub big_blind: Chips,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// CLI overrides take precedence over the environment; both fall
    /// back to the stock roster of six manual and three automated rooms.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        manual_override: Option<usize>,
        auto_override: Option<usize>,
    ) -> Self {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:3000"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let reset_password =
            std::env::var("RESET_PASSWORD").unwrap_or_else(|_| "admin123".to_string());

        ServerConfig {
            bind,
            reset_password,
            preserve_units: parse_env_or("PRESERVE_ROOM_UNITS", false),
            manual_rooms: manual_override.unwrap_or_else(|| parse_env_or("MANUAL_ROOMS", 6)),
            auto_rooms: auto_override.unwrap_or_else(|| parse_env_or("AUTO_ROOMS", 3)),
            room_defaults: RoomDefaultsConfig {
                max_players: parse_env_or("ROOM_MAX_PLAYERS", 20),
                small_blind: parse_env_or("ROOM_SMALL_BLIND", 5),
                big_blind: parse_env_or("ROOM_BIG_BLIND", 10),
            },
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reset_password.is_empty() {
            return Err(ConfigError::Invalid {
                var: "RESET_PASSWORD".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if self.manual_rooms + self.auto_rooms == 0 {
            return Err(ConfigError::Invalid {
                var: "MANUAL_ROOMS".to_string(),
                reason: "At least one room must be provisioned".to_string(),
            });
        }

        if self.room_defaults.small_blind == 0 {
            return Err(ConfigError::Invalid {
                var: "ROOM_SMALL_BLIND".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.room_defaults.big_blind <= self.room_defaults.small_blind {
            return Err(ConfigError::Invalid {
                var: "ROOM_BIG_BLIND".to_string(),
                reason: format!(
                    "Must be greater than small blind ({})",
                    self.room_defaults.small_blind
                ),
            });
        }

        if self.room_defaults.max_players < 2 {
            return Err(ConfigError::Invalid {
                var: "ROOM_MAX_PLAYERS".to_string(),
                reason: "Must be at least 2".to_string(),
            });
        }

        if self.room_defaults.max_players > MAX_SEATS {
            return Err(ConfigError::Invalid {
                var: "ROOM_MAX_PLAYERS".to_string(),
                reason: format!("Must be at most {MAX_SEATS} (max seats a 52-card deck covers)"),
            });
        }

        Ok(())
    }

    /// The room roster to provision: manual rooms first, then automated,
    /// with sequential ids (`room1`, `room2`, ...).
    pub fn room_configs(&self) -> Vec<RoomConfig> {
        let blinds = Blinds {
            small: self.room_defaults.small_blind,
            big: self.room_defaults.big_blind,
        };
        let mut configs = Vec::with_capacity(self.manual_rooms + self.auto_rooms);
        let mut counter = 0;
        for i in 1..=self.manual_rooms {
            counter += 1;
            let mut config = RoomConfig::manual(format!("room{counter}"), format!("Room {i}"));
            config.max_players = self.room_defaults.max_players;
            config.blinds = blinds;
            configs.push(config);
        }
        for i in 1..=self.auto_rooms {
            counter += 1;
            let mut config =
                RoomConfig::automated(format!("room{counter}"), format!("Auto Room {i}"));
            config.max_players = self.room_defaults.max_players;
            config.blinds = blinds;
            configs.push(config);
        }
        configs
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
