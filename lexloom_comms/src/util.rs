// Host-application callbacks and user-visible errors.
//
// The comms layer never owns a clock, a timer wheel, or a UI; it asks the
// application for all three through `CommsUtil`. The server crate's own
// util trait extends this one so a single application object can serve
// both layers.

use lexloom_protocol::relay::RelayError;
use thiserror::Error;

/// Timers the engine may ask the application to run. The application calls
/// back (`Comms::heartbeat_timer_fired`, `Server::robot_timer_fired`) when
/// one expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    Heartbeat,
    SlowRobot,
}

/// Conditions a player should hear about. These never carry recovery
/// obligations; by the time one is raised the engine has already settled
/// on its own response.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("a device tried to register more players than the game has open seats")]
    RegUnexpectedUser,
    #[error("nothing to undo but the initial tile assignment")]
    CantUndoTileAssign,
    #[error("the host's dictionary differs and replaces the local one")]
    ServerDictWins,
    #[error("another device left the game ({0:?})")]
    RelayDeviceLost(RelayError),
    #[error("the relay dropped this device ({0:?})")]
    RelayDroppedYou(RelayError),
    #[error("the relay refused the connection ({0:?})")]
    RelayDenied(RelayError),
}

/// What the comms layer needs from its host application.
pub trait CommsUtil {
    /// Surface an error to the player. Informational only.
    fn user_error(&mut self, err: UserError);

    /// Run a one-shot timer; call back into the engine after `secs`.
    /// Setting a timer that is already running replaces it.
    fn set_timer(&mut self, kind: TimerKind, secs: u32);

    fn clear_timer(&mut self, kind: TimerKind);

    /// Wall-clock seconds. Only ever compared against itself.
    fn now_secs(&self) -> u64;

    /// The peer has gone quiet past tolerance; tear down and re-establish
    /// the underlying link.
    fn transport_reset(&mut self);
}
