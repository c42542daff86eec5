// Application messages exchanged between game devices.
//
// One enum covers the whole device-to-device vocabulary: registration,
// setup, moves, move confirmation, rejected words, undo, and end-of-game.
// Bodies are JSON behind the binary `MsgHeader` — the header and every
// envelope below it are pinned byte formats, but the bodies only ever meet
// code from this workspace, so they use serde like everything else here.
//
// The comms layer treats these as opaque bytes; only the server state
// machine encodes and decodes them.

use serde::{Deserialize, Serialize};

use crate::types::Tile;
use crate::wire::WireError;

/// How a device should treat words not found in the dictionary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhonyPolicy {
    /// Accept silently.
    #[default]
    Ignore,
    /// Accept, but tell the player.
    Warn,
    /// Reject the move and forfeit the turn.
    Disallow,
}

/// One tile placed on the board during a move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedTile {
    pub row: u8,
    pub col: u8,
    pub tile: Tile,
    /// True when `tile` is a blank standing in for the face shown.
    pub is_blank: bool,
}

/// A complete placement. Empty means a pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub tiles: Vec<PlacedTile>,
}

impl Placement {
    pub fn is_pass(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// A guest-local player announced during registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegPlayer {
    pub name: String,
    pub is_robot: bool,
}

/// One seat in the game as described to a guest in its setup message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPlayer {
    pub name: String,
    pub is_robot: bool,
    /// Local from the *recipient's* point of view. The host rewrites this
    /// per guest before sending.
    pub is_local: bool,
}

/// The sendable slice of the host's game configuration. Device-private
/// settings (dictionary path, UI prefs) never appear here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireGameConfig {
    pub players: Vec<SetupPlayer>,
    pub board_size: u8,
    pub tray_size: u8,
    pub phony_policy: PhonyPolicy,
    pub timer_enabled: bool,
    /// Total game clock, split evenly across players.
    pub game_seconds: u32,
    /// Score docked per minute (or part) of clock overrun.
    pub penalty_per_minute: u16,
}

/// What the mover did with their turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveAction {
    Place {
        placement: Placement,
        /// Verdict of the host's word check. Guests relaying their own move
        /// up always claim `true`; the host decides.
        legal: bool,
        /// The words that failed the check, host -> guest only, so every
        /// device can show the same rejection. Empty when `legal`.
        bad_words: Vec<String>,
        seconds_used: Option<u16>,
    },
    Trade { traded: Vec<Tile> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMessage {
    /// Guest -> host, on channel 0: here are my players, find me seats.
    Registration { players: Vec<RegPlayer> },
    /// Host -> guest: the full game state needed to start playing.
    ClientSetup {
        game_id: u32,
        config: WireGameConfig,
        dict: Vec<u8>,
        /// One tray per seat, in player order.
        trays: Vec<Vec<Tile>>,
    },
    /// A committed (or, guest -> host, proposed) turn.
    MoveMade {
        /// True when travelling guest -> host.
        from_guest: bool,
        turn: u8,
        /// Replacement tiles the mover drew.
        new_tiles: Vec<Tile>,
        action: MoveAction,
    },
    /// Host -> guest: your proposed move passed the word check.
    MoveConfirm,
    /// Host -> guest: your move was rejected; these words lost you the turn.
    BadWordInfo { turn: u8, words: Vec<String> },
    Undo {
        from_guest: bool,
        n_undone: u16,
        last_undone: u16,
    },
    /// Guest -> host: player asked to end the game.
    ClientReqEndGame,
    /// Host -> everyone: the game is over.
    EndGame,
}

impl GameMessage {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(self).map_err(WireError::Encode)
    }

    pub fn decode(buf: &[u8]) -> Result<GameMessage, WireError> {
        serde_json::from_slice(buf).map_err(WireError::Decode)
    }
}
