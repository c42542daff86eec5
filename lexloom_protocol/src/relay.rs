// Relay frame vocabulary.
//
// When a device talks through the relay, every datagram it sends or receives
// is one `RelayFrame`: a command byte followed by command-specific fields.
// Application traffic rides inside `Routed` frames as opaque bytes (header
// plus body); the relay never looks past its own envelope.
//
// `Connect` and `Reconnect` carry a protocol version byte so the relay can
// deny clients it cannot serve rather than misparse them.

use crate::types::{CookieId, RelayHostId};
use crate::wire::{WireError, WireReader, WireWriter};

/// Version of the relay envelope format itself.
pub const RELAY_PROTO_VERSION: u8 = 1;

const CMD_CONNECT: u8 = 1;
const CMD_RECONNECT: u8 = 2;
const CMD_CONNECT_RESP: u8 = 3;
const CMD_RECONNECT_RESP: u8 = 4;
const CMD_ALL_CONNECTED: u8 = 5;
const CMD_ROUTED: u8 = 6;
const CMD_DISCONNECT: u8 = 7;
const CMD_DISCONNECT_OTHER: u8 = 8;
const CMD_DISCONNECT_YOU: u8 = 9;
const CMD_CONNECT_DENIED: u8 = 10;
const CMD_HEARTBEAT: u8 = 11;

/// Reasons the relay may refuse or sever a connection. Carried as a bare
/// byte so new relay builds can add reasons without breaking old clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayError(pub u8);

impl RelayError {
    pub const NONE: RelayError = RelayError(0);
    pub const ROOM_FULL: RelayError = RelayError(1);
    pub const DUPLICATE_SEAT: RelayError = RelayError(2);
    pub const BAD_PROTO: RelayError = RelayError(3);
    pub const HEARTBEAT_LOST: RelayError = RelayError(4);
    pub const RELAY_BUSY: RelayError = RelayError(5);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayFrame {
    /// First-time join of a room, by name.
    Connect {
        proto_version: u8,
        room: String,
        host_id: RelayHostId,
        players_here: u8,
        players_total: u8,
    },
    /// Rejoin of a room this device was in before; named by the relay-
    /// assigned connection name rather than the room cookie.
    Reconnect {
        proto_version: u8,
        conn_name: String,
        host_id: RelayHostId,
        players_here: u8,
        players_total: u8,
    },
    ConnectResp {
        heartbeat_secs: u16,
        cookie_id: CookieId,
        host_id: RelayHostId,
    },
    ReconnectResp {
        heartbeat_secs: u16,
        cookie_id: CookieId,
        host_id: RelayHostId,
    },
    /// Every expected seat is filled. On a first connect this also delivers
    /// the connection name to remember for reconnects.
    AllConnected { conn_name: Option<String> },
    /// Application payload routed between two seats.
    Routed {
        cookie_id: CookieId,
        src: RelayHostId,
        dest: RelayHostId,
        payload: Vec<u8>,
    },
    /// Graceful goodbye from a device.
    Disconnect {
        cookie_id: CookieId,
        host_id: RelayHostId,
    },
    /// Some other seat in the room was lost.
    DisconnectOther {
        error: RelayError,
        host_id: RelayHostId,
    },
    /// The relay dropped *this* device.
    DisconnectYou { error: RelayError },
    ConnectDenied { error: RelayError },
    /// Keep-alive ping, both directions.
    Heartbeat {
        cookie_id: CookieId,
        host_id: RelayHostId,
    },
}

impl RelayFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        match self {
            RelayFrame::Connect {
                proto_version,
                room,
                host_id,
                players_here,
                players_total,
            } => {
                w.put_u8(CMD_CONNECT);
                w.put_u8(*proto_version);
                w.put_str(room);
                w.put_u8(host_id.0);
                w.put_u8(*players_here);
                w.put_u8(*players_total);
            }
            RelayFrame::Reconnect {
                proto_version,
                conn_name,
                host_id,
                players_here,
                players_total,
            } => {
                w.put_u8(CMD_RECONNECT);
                w.put_u8(*proto_version);
                w.put_str(conn_name);
                w.put_u8(host_id.0);
                w.put_u8(*players_here);
                w.put_u8(*players_total);
            }
            RelayFrame::ConnectResp {
                heartbeat_secs,
                cookie_id,
                host_id,
            } => {
                w.put_u8(CMD_CONNECT_RESP);
                w.put_u16(*heartbeat_secs);
                w.put_u16(cookie_id.0);
                w.put_u8(host_id.0);
            }
            RelayFrame::ReconnectResp {
                heartbeat_secs,
                cookie_id,
                host_id,
            } => {
                w.put_u8(CMD_RECONNECT_RESP);
                w.put_u16(*heartbeat_secs);
                w.put_u16(cookie_id.0);
                w.put_u8(host_id.0);
            }
            RelayFrame::AllConnected { conn_name } => {
                w.put_u8(CMD_ALL_CONNECTED);
                match conn_name {
                    Some(name) => {
                        w.put_u8(1);
                        w.put_str(name);
                    }
                    None => w.put_u8(0),
                }
            }
            RelayFrame::Routed {
                cookie_id,
                src,
                dest,
                payload,
            } => {
                w.put_u8(CMD_ROUTED);
                w.put_u16(cookie_id.0);
                w.put_u8(src.0);
                w.put_u8(dest.0);
                w.put_bytes(payload);
            }
            RelayFrame::Disconnect { cookie_id, host_id } => {
                w.put_u8(CMD_DISCONNECT);
                w.put_u16(cookie_id.0);
                w.put_u8(host_id.0);
            }
            RelayFrame::DisconnectOther { error, host_id } => {
                w.put_u8(CMD_DISCONNECT_OTHER);
                w.put_u8(error.0);
                w.put_u8(host_id.0);
            }
            RelayFrame::DisconnectYou { error } => {
                w.put_u8(CMD_DISCONNECT_YOU);
                w.put_u8(error.0);
            }
            RelayFrame::ConnectDenied { error } => {
                w.put_u8(CMD_CONNECT_DENIED);
                w.put_u8(error.0);
            }
            RelayFrame::Heartbeat { cookie_id, host_id } => {
                w.put_u8(CMD_HEARTBEAT);
                w.put_u16(cookie_id.0);
                w.put_u8(host_id.0);
            }
        }
        w.finish()
    }

    pub fn decode(buf: &[u8]) -> Result<RelayFrame, WireError> {
        let mut r = WireReader::new(buf);
        let cmd = r.u8()?;
        let frame = match cmd {
            CMD_CONNECT => RelayFrame::Connect {
                proto_version: r.u8()?,
                room: r.str()?,
                host_id: RelayHostId(r.u8()?),
                players_here: r.u8()?,
                players_total: r.u8()?,
            },
            CMD_RECONNECT => RelayFrame::Reconnect {
                proto_version: r.u8()?,
                conn_name: r.str()?,
                host_id: RelayHostId(r.u8()?),
                players_here: r.u8()?,
                players_total: r.u8()?,
            },
            CMD_CONNECT_RESP => RelayFrame::ConnectResp {
                heartbeat_secs: r.u16()?,
                cookie_id: CookieId(r.u16()?),
                host_id: RelayHostId(r.u8()?),
            },
            CMD_RECONNECT_RESP => RelayFrame::ReconnectResp {
                heartbeat_secs: r.u16()?,
                cookie_id: CookieId(r.u16()?),
                host_id: RelayHostId(r.u8()?),
            },
            CMD_ALL_CONNECTED => {
                let conn_name = if r.u8()? != 0 { Some(r.str()?) } else { None };
                RelayFrame::AllConnected { conn_name }
            }
            CMD_ROUTED => RelayFrame::Routed {
                cookie_id: CookieId(r.u16()?),
                src: RelayHostId(r.u8()?),
                dest: RelayHostId(r.u8()?),
                payload: r.rest().to_vec(),
            },
            CMD_DISCONNECT => RelayFrame::Disconnect {
                cookie_id: CookieId(r.u16()?),
                host_id: RelayHostId(r.u8()?),
            },
            CMD_DISCONNECT_OTHER => RelayFrame::DisconnectOther {
                error: RelayError(r.u8()?),
                host_id: RelayHostId(r.u8()?),
            },
            CMD_DISCONNECT_YOU => RelayFrame::DisconnectYou {
                error: RelayError(r.u8()?),
            },
            CMD_CONNECT_DENIED => RelayFrame::ConnectDenied {
                error: RelayError(r.u8()?),
            },
            CMD_HEARTBEAT => RelayFrame::Heartbeat {
                cookie_id: CookieId(r.u16()?),
                host_id: RelayHostId(r.u8()?),
            },
            tag => {
                return Err(WireError::UnknownTag {
                    what: "relay frame",
                    tag,
                });
            }
        };
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routed_payload_is_the_frame_tail() {
        let frame = RelayFrame::Routed {
            cookie_id: CookieId(300),
            src: RelayHostId(2),
            dest: RelayHostId(1),
            payload: vec![0xde, 0xad],
        };
        let buf = frame.encode();
        // cmd + cookie + src + dest + payload, no length prefix
        assert_eq!(buf.len(), 1 + 2 + 1 + 1 + 2);
        assert_eq!(RelayFrame::decode(&buf).unwrap(), frame);
    }

    #[test]
    fn connect_roundtrip() {
        let frame = RelayFrame::Connect {
            proto_version: RELAY_PROTO_VERSION,
            room: "back room".to_string(),
            host_id: RelayHostId::NONE,
            players_here: 1,
            players_total: 3,
        };
        assert_eq!(RelayFrame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn all_connected_with_and_without_name() {
        for conn_name in [None, Some("game-17ac".to_string())] {
            let frame = RelayFrame::AllConnected { conn_name };
            assert_eq!(RelayFrame::decode(&frame.encode()).unwrap(), frame);
        }
    }

    #[test]
    fn unknown_command_rejected() {
        match RelayFrame::decode(&[0x7f]) {
            Err(WireError::UnknownTag { tag: 0x7f, .. }) => {}
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }

    #[test]
    fn empty_frame_rejected() {
        assert!(RelayFrame::decode(&[]).is_err());
    }
}
