// lexloom_comms — reliable in-order messaging between game devices.
//
// This crate wraps an unreliable datagram transport and gives the server
// state machine (`lexloom_server`) exactly-once, in-order delivery per
// peer channel. It owns the outgoing resend queue, the per-channel id
// counters, the relay connection submachine, and (behind the `heartbeat`
// feature) keep-alive probing.
//
// Module overview:
// - `comms.rs`:     `Comms`, the engine: send, receive validation, replay.
// - `channel.rs`:   Per-peer address records and source matching.
// - `queue.rs`:     The outgoing queue and its ack-driven pruning.
// - `relay.rs`:     The Unconnected -> AllConnected relay submachine.
// - `address.rs`:   `CommsAddr`, the transport address sum type.
// - `transport.rs`: The `Transport` seam and `CommsError`.
// - `util.rs`:      `CommsUtil` application callbacks and `UserError`.
// - `heartbeat.rs`: Probing and dead-peer escalation (feature-gated).
// - `persist.rs`:   The pinned save/restore byte format.
//
// Design decisions:
// - **No recovery negotiation.** A message must carry exactly the next id
//   for its channel or it is dropped; full-queue replay is the only
//   recovery mechanism. Kept deliberately: it is simple, and any gap it
//   cannot close is a real desync.
// - **Callbacks, not ownership.** Clocks, timers, and user alerts belong
//   to the application and are reached through `CommsUtil`.

pub mod address;
mod channel;
pub mod comms;
#[cfg(feature = "heartbeat")]
mod heartbeat;
mod persist;
mod queue;
pub mod relay;
pub mod transport;
pub mod util;

pub use address::CommsAddr;
pub use comms::{Comms, IncomingMessage};
#[cfg(feature = "heartbeat")]
pub use heartbeat::HB_INTERVAL;
pub use relay::RelayState;
pub use transport::{CommsError, Transport};
pub use util::{CommsUtil, TimerKind, UserError};
