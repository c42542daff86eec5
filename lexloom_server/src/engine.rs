// The move-search seam.
//
// The real search is the application's business. The server only needs a
// best placement for the robot whose turn it is, or `None` when no legal
// placement exists (which the server turns into a trade or a pass).

use lexloom_protocol::message::Placement;

use crate::dict::Dictionary;
use crate::model::GameModel;

pub trait RobotEngine {
    /// Find a placement for `player`'s current tray. `target_score` caps
    /// the search for handicapped robots; pass `i32::MAX` for best-play.
    fn find_move(
        &mut self,
        model: &dyn GameModel,
        dict: &dyn Dictionary,
        player: usize,
        target_score: i32,
    ) -> Option<Placement>;

    /// Drop cached search state; the board has changed under the engine.
    fn reset(&mut self);
}
