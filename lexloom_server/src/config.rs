// Per-game configuration.
//
// `GameConfig` is the host-side source of truth for one game: who plays,
// from where, and under what rules. Guests receive a tailored
// `WireGameConfig` copy (see `to_wire`) with device-private fields
// stripped and `is_local` rewritten to their point of view.

use serde::{Deserialize, Serialize};

use lexloom_protocol::message::{PhonyPolicy, SetupPlayer, WireGameConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Owns the pool, judges words, relays every move.
    Host,
    /// Plays through a host.
    Guest,
    /// All players on one device; no comms at all.
    Standalone,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotSmartness {
    /// Aims near the best human opponent's score instead of its own
    /// maximum.
    Dumb,
    #[default]
    Smart,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub name: String,
    /// Never leaves this device.
    pub password: Option<String>,
    pub is_robot: bool,
    pub is_local: bool,
    /// Running clock charge, maintained by the turn machinery when the
    /// timer is enabled.
    pub seconds_used: u16,
}

impl PlayerConfig {
    pub fn human(name: &str) -> PlayerConfig {
        PlayerConfig {
            name: name.to_string(),
            password: None,
            is_robot: false,
            is_local: true,
            seconds_used: 0,
        }
    }

    pub fn robot(name: &str) -> PlayerConfig {
        PlayerConfig {
            is_robot: true,
            ..PlayerConfig::human(name)
        }
    }

    pub fn remote() -> PlayerConfig {
        PlayerConfig {
            is_local: false,
            ..PlayerConfig::human("")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub game_id: u32,
    pub role: Role,
    /// Seat order is turn order, fixed by the host.
    pub players: Vec<PlayerConfig>,
    pub board_size: u8,
    pub tray_size: u8,
    pub phony_policy: PhonyPolicy,
    pub timer_enabled: bool,
    /// Total game clock, split evenly across players.
    pub game_seconds: u32,
    /// Score docked per minute (or part) of clock overrun.
    pub penalty_per_minute: u16,
    pub robot_smartness: RobotSmartness,
    /// Show a summary of each robot/remote move between turns.
    pub show_move_reports: bool,
    #[cfg(feature = "slow-robot")]
    pub robot_think_min_secs: u16,
    #[cfg(feature = "slow-robot")]
    pub robot_think_max_secs: u16,
}

impl GameConfig {
    pub fn n_players(&self) -> usize {
        self.players.len()
    }

    pub fn remote_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_local).count()
    }

    /// The sendable copy for one device: passwords stripped, `is_local`
    /// recomputed from which device owns each seat.
    pub fn to_wire(&self, is_local: impl Fn(usize) -> bool) -> WireGameConfig {
        WireGameConfig {
            players: self
                .players
                .iter()
                .enumerate()
                .map(|(idx, player)| SetupPlayer {
                    name: player.name.clone(),
                    is_robot: player.is_robot,
                    is_local: is_local(idx),
                })
                .collect(),
            board_size: self.board_size,
            tray_size: self.tray_size,
            phony_policy: self.phony_policy,
            timer_enabled: self.timer_enabled,
            game_seconds: self.game_seconds,
            penalty_per_minute: self.penalty_per_minute,
        }
    }

    /// Apply the host's setup on a guest. Seat list, rules, and clock all
    /// come from the wire; device-private settings stay.
    pub fn apply_wire(&mut self, wire: &WireGameConfig) {
        self.players = wire
            .players
            .iter()
            .map(|player| PlayerConfig {
                name: player.name.clone(),
                password: None,
                is_robot: player.is_robot,
                is_local: player.is_local,
                seconds_used: 0,
            })
            .collect();
        self.board_size = wire.board_size;
        self.tray_size = wire.tray_size;
        self.phony_policy = wire.phony_policy;
        self.timer_enabled = wire.timer_enabled;
        self.game_seconds = wire.game_seconds;
        self.penalty_per_minute = wire.penalty_per_minute;
    }

    /// End-of-game clock penalty: each player gets an even share of the
    /// game clock; every started minute of overrun costs
    /// `penalty_per_minute`.
    pub fn time_penalty(&self, player: usize) -> u16 {
        if !self.timer_enabled || self.players.is_empty() {
            return 0;
        }
        let allowed = self.game_seconds / self.players.len() as u32;
        let used = u32::from(self.players[player].seconds_used);
        if used <= allowed {
            return 0;
        }
        let over_minutes = (used - allowed).div_ceil(60);
        #[expect(clippy::cast_possible_truncation)]
        let penalty = (over_minutes * u32::from(self.penalty_per_minute)).min(u32::from(u16::MAX))
            as u16;
        penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_config() -> GameConfig {
        GameConfig {
            game_id: 77,
            role: Role::Host,
            players: vec![PlayerConfig::human("ada"), PlayerConfig::remote()],
            board_size: 15,
            tray_size: 7,
            phony_policy: PhonyPolicy::Ignore,
            timer_enabled: true,
            game_seconds: 1500,
            penalty_per_minute: 10,
            robot_smartness: RobotSmartness::Smart,
            show_move_reports: false,
            #[cfg(feature = "slow-robot")]
            robot_think_min_secs: 0,
            #[cfg(feature = "slow-robot")]
            robot_think_max_secs: 0,
        }
    }

    #[test]
    fn wire_copy_rewrites_locality_and_drops_passwords() {
        let mut config = two_player_config();
        config.players[0].password = Some("hunter2".to_string());

        let wire = config.to_wire(|idx| idx == 1);
        assert!(!wire.players[0].is_local);
        assert!(wire.players[1].is_local);
        // WireGameConfig has no password field at all; nothing to leak.
        assert_eq!(wire.players.len(), 2);
    }

    #[test]
    fn time_penalty_charges_started_minutes() {
        let mut config = two_player_config();
        // Share is 750 seconds each.
        config.players[0].seconds_used = 750;
        assert_eq!(config.time_penalty(0), 0);

        config.players[0].seconds_used = 751;
        assert_eq!(config.time_penalty(0), 10);

        config.players[0].seconds_used = 750 + 61;
        assert_eq!(config.time_penalty(0), 20);
    }

    #[test]
    fn time_penalty_needs_the_timer() {
        let mut config = two_player_config();
        config.timer_enabled = false;
        config.players[0].seconds_used = u16::MAX;
        assert_eq!(config.time_penalty(0), 0);
    }
}
