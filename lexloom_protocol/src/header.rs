// The generic message header carried by every application payload.
//
// Layout is pinned, 14 bytes, big-endian:
//
//   [connection_id: u32][channel: u16][msg_id: u32][last_msg_rcd: u32]
//
// The header travels unchanged through any transport; relay and direct-link
// envelopes (see `relay.rs`, `link.rs`) wrap around it. `last_msg_rcd` is the
// receiver-side implicit ack: every outbound message reports the highest
// in-order id seen on its channel, and the peer prunes its resend queue from
// that.

use crate::types::{ChannelId, ConnectionId, MessageId};
use crate::wire::{WireError, WireReader, WireWriter};

/// Encoded size of a `MsgHeader`, always.
pub const HEADER_LEN: usize = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsgHeader {
    pub connection_id: ConnectionId,
    pub channel: ChannelId,
    pub msg_id: MessageId,
    pub last_msg_rcd: MessageId,
}

impl MsgHeader {
    pub fn write(&self, w: &mut WireWriter) {
        w.put_u32(self.connection_id.0);
        w.put_u16(self.channel.0);
        w.put_u32(self.msg_id.0);
        w.put_u32(self.last_msg_rcd.0);
    }

    pub fn read(r: &mut WireReader) -> Result<MsgHeader, WireError> {
        Ok(MsgHeader {
            connection_id: ConnectionId(r.u32()?),
            channel: ChannelId(r.u16()?),
            msg_id: MessageId(r.u32()?),
            last_msg_rcd: MessageId(r.u32()?),
        })
    }
}

/// Optional diagnostics appended after a persisted record. Explicitly
/// flagged and versioned so streams written with diagnostics enabled stay
/// readable by builds without them, and vice versa.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiagTrailer {
    pub last_ack: MessageId,
    pub unique_bytes: u32,
}

pub const DIAG_TRAILER_VERSION: u8 = 1;

impl DiagTrailer {
    /// `[present: u8]` then, if present, `[version: u8][len: u8][fields]`.
    pub fn write_opt(trailer: Option<&DiagTrailer>, w: &mut WireWriter) {
        match trailer {
            None => w.put_u8(0),
            Some(t) => {
                w.put_u8(1);
                w.put_u8(DIAG_TRAILER_VERSION);
                w.put_u8(8);
                w.put_u32(t.last_ack.0);
                w.put_u32(t.unique_bytes);
            }
        }
    }

    /// Unknown future versions are skipped via the length byte, not
    /// rejected.
    pub fn read_opt(r: &mut WireReader) -> Result<Option<DiagTrailer>, WireError> {
        if r.u8()? == 0 {
            return Ok(None);
        }
        let version = r.u8()?;
        let len = r.u8()? as usize;
        if version != DIAG_TRAILER_VERSION {
            r.take(len)?;
            return Ok(None);
        }
        let trailer = DiagTrailer {
            last_ack: MessageId(r.u32()?),
            unique_bytes: r.u32()?,
        };
        Ok(Some(trailer))
    }
}
