// Turn synchronization for a networked word game.
//
// One `Server` per device per game keeps every participant's board, trays,
// and tile pool in lockstep over the reliable channels the comms crate
// provides. The host owns the pool and the word check; guests mirror. The
// actual board, scoring, move search, and dictionary parsing live in the
// application, reached through the `GameModel`, `RobotEngine`, and
// `Dictionary` seams.

pub mod config;
pub mod dict;
pub mod engine;
pub mod model;
mod persist;
pub mod pool;
pub mod server;
pub mod util;

pub use config::{GameConfig, PlayerConfig, Role, RobotSmartness};
pub use dict::Dictionary;
pub use engine::RobotEngine;
pub use model::{GameModel, UndoneMove};
pub use pool::{MAX_TRAY_TILES, TilePool, TileSet};
pub use server::{FinalScore, GameState, Server};
pub use util::ServerUtil;
