// lexloom_protocol — wire formats for multiplayer game sync.
//
// This crate defines every byte format the comms layer (`lexloom_comms`) and
// the game server (`lexloom_server`) put on a link, plus the codec
// primitives their persistence formats are built from. It has no dependency
// on game logic.
//
// Module overview:
// - `wire.rs`:    `WireWriter`/`WireReader`, big-endian scalar codec, and
//                 `WireError`.
// - `types.rs`:   Newtype ids — `ChannelId`, `MessageId`, `ConnectionId`,
//                 `RelayHostId`, `CookieId`, `Tile`.
// - `header.rs`:  The pinned 14-byte generic message header, and the
//                 versioned optional `DiagTrailer` for persisted state.
// - `relay.rs`:   `RelayFrame`, the relay envelope vocabulary.
// - `link.rs`:    The one-byte direct-link envelope (data/reset/heartbeat).
// - `message.rs`: `GameMessage`, the device-to-device application
//                 vocabulary, JSON-encoded behind the binary header.
//
// Design decisions:
// - **Pinned binary envelopes, JSON bodies.** Headers, relay frames, link
//   frames, and persistence are hand-written big-endian formats; the
//   application bodies they carry are serde_json, which only this workspace
//   ever parses.
// - **No async runtime.** Frames are built and consumed as `Vec<u8>` /
//   `&[u8]`; transports decide how bytes move.

pub mod header;
pub mod link;
pub mod message;
pub mod relay;
pub mod types;
pub mod wire;

pub use header::{DiagTrailer, HEADER_LEN, MsgHeader};
pub use link::{LinkMsgKind, frame_link, split_link};
pub use message::{GameMessage, MoveAction, PhonyPolicy, PlacedTile, Placement};
pub use relay::{RELAY_PROTO_VERSION, RelayError, RelayFrame};
pub use types::{ChannelId, ConnectionId, CookieId, MessageId, RelayHostId, Tile};
pub use wire::{WireError, WireReader, WireWriter};
