// Core ID types for the game-sync protocol.
//
// These are lightweight newtypes shared by `header.rs` (the generic message
// header), the relay frame vocabulary (`relay.rs`), and the comms layer's
// channel registry. They are wire-scoped identifiers, not in-game entities:
// a `ChannelId` names a device link, a `RelayHostId` a seat at the relay.

use serde::{Deserialize, Serialize};

/// Per-peer logical channel within a game. Channel 0 is reserved for
/// pre-registration traffic from guests that have not yet been assigned one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u16);

impl ChannelId {
    /// The unassigned channel, used by guests before the host allocates one.
    pub const NONE: ChannelId = ChannelId(0);
}

/// Per-channel monotonic message sequence number. Id 0 is never a real
/// message; it marks setup traffic and heartbeat probes. The default is
/// `ZERO`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u32);

impl MessageId {
    pub const ZERO: MessageId = MessageId(0);

    /// The id following this one in sequence.
    pub fn next(self) -> MessageId {
        MessageId(self.0 + 1)
    }
}

/// Game-wide connection id, shared by all devices in one game. Zero until
/// the host assigns it; setup messages always carry zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub const NONE: ConnectionId = ConnectionId(0);
}

/// Relay-assigned seat id for one device within a room. The host always
/// occupies seat 1; 0 means "not yet assigned".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelayHostId(pub u8);

impl RelayHostId {
    pub const NONE: RelayHostId = RelayHostId(0);
    pub const SERVER: RelayHostId = RelayHostId(1);
}

/// Relay-assigned compact id for a room, replacing the room name once
/// connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CookieId(pub u16);

impl CookieId {
    pub const NONE: CookieId = CookieId(0);
}

/// Index of a tile face in the active dictionary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tile(pub u8);
