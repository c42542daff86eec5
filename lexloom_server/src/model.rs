// The game-model seam.
//
// Board contents, scoring, and move history live outside this crate; the
// state machine drives them through `GameModel`. The contract mirrors the
// turn protocol: a received placement is *staged* first (so it can be
// checked, reported on, and possibly rejected) and only then committed
// together with the replacement tiles the mover drew.

use lexloom_protocol::message::Placement;
use lexloom_protocol::types::Tile;

use crate::dict::Dictionary;
use crate::pool::{TilePool, TileSet};

/// One committed move popped off the history by an undo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UndoneMove {
    /// Who made the undone move.
    pub turn: u8,
    /// Its index in the committed-move history.
    pub move_num: u16,
}

pub trait GameModel {
    fn set_num_players(&mut self, n_players: usize);

    fn init_board(&mut self, size: u8);

    /// Hand a player their starting tray. Undoing past this point is not
    /// possible.
    fn assign_tray(&mut self, player: usize, tiles: &[Tile]);

    fn tray(&self, player: usize) -> TileSet;

    /// Tray plus staged tiles; the count that decides whether a player has
    /// gone out.
    fn total_tile_count(&self, player: usize) -> u16;

    fn score(&self, player: usize) -> i32;

    /// Stage a placement as the player's pending turn, moving the tiles
    /// out of the tray.
    fn stage_move(&mut self, player: usize, placement: &Placement);

    /// Drop any staged tiles back into the tray.
    fn clear_pending(&mut self, player: usize);

    fn pending_tile_count(&self, player: usize) -> u16;

    fn pending_placement(&self, player: usize) -> Placement;

    /// Words the staged move would form that the dictionary rejects.
    /// Empty means the move is clean.
    fn check_pending_words(&self, player: usize, dict: &dyn Dictionary) -> Vec<String>;

    /// Human-readable summary of the staged move (words and score) for
    /// the between-turns report.
    fn pending_move_report(&self, player: usize, dict: &dyn Dictionary) -> String;

    /// Commit the staged move, score it, and refill the tray with
    /// `new_tiles`.
    fn commit_turn(&mut self, player: usize, new_tiles: &[Tile]);

    /// Swap `traded` out of the tray for `new_tiles`, recorded as a
    /// zero-score turn.
    fn trade_tiles(
        &mut self,
        player: usize,
        traded: &[Tile],
        new_tiles: &[Tile],
    );

    /// Pop the latest committed move, returning its drawn tiles to the
    /// pool and its placed tiles to the tray. `None` when only the tile
    /// assignment remains.
    fn undo_latest(&mut self, pool: &mut TilePool) -> Option<UndoneMove>;

    /// Undo the just-committed move and re-record it as a rejected,
    /// zero-score turn. Returns whose move was rejected.
    fn reject_last_move(&mut self, pool: &mut TilePool) -> Option<u8>;

    /// False once the pass limit has been reached and the game must end.
    fn pass_count_ok(&self) -> bool;
}
