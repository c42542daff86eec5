// Application callbacks for the turn machine.
//
// `ServerUtil` extends the comms callback trait so one application object
// serves both layers (a `&mut dyn ServerUtil` upcasts to
// `&mut dyn CommsUtil` where the comms engine needs it).

use lexloom_comms::CommsUtil;

use crate::dict::Dictionary;
use crate::engine::RobotEngine;

pub trait ServerUtil: CommsUtil {
    /// Rebuild a dictionary from the bytes a host shipped in its setup
    /// message. `None` when the bytes are unusable; the game cannot start.
    fn make_dictionary(&mut self, bytes: &[u8]) -> Option<Box<dyn Dictionary>>;

    /// Build a search engine for a local robot seat. Called lazily, once
    /// per seat per session; engines are never persisted.
    fn make_robot_engine(&mut self, player: usize) -> Box<dyn RobotEngine>;

    /// A move was rejected by the word check. `turn_lost` is always true
    /// today; the move has already been undone and re-recorded as a
    /// zero-score turn.
    fn warn_illegal_word(&mut self, words: &[String], player: u8, turn_lost: bool);

    /// Show the between-turns summary of a robot or remote move.
    fn show_move_report(&mut self, player: u8, report: &str);
}
