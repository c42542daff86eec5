// Direct-link frame envelope.
//
// Point-to-point transports (TCP/UDP direct, radio, anything without a relay
// in the middle) prefix each datagram with a single kind byte. `Data` wraps
// normal header-plus-body traffic, `Reset` asks the peer to replay its whole
// resend queue after a link-level reconnect, `Heartbeat` is an empty
// keep-alive.

use crate::wire::{WireError, WireReader};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkMsgKind {
    Data = 1,
    Reset = 2,
    Heartbeat = 3,
}

impl LinkMsgKind {
    fn from_u8(b: u8) -> Result<LinkMsgKind, WireError> {
        match b {
            1 => Ok(LinkMsgKind::Data),
            2 => Ok(LinkMsgKind::Reset),
            3 => Ok(LinkMsgKind::Heartbeat),
            tag => Err(WireError::UnknownTag {
                what: "link frame",
                tag,
            }),
        }
    }
}

/// Prefix `payload` with the kind byte.
pub fn frame_link(kind: LinkMsgKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(kind as u8);
    out.extend_from_slice(payload);
    out
}

/// Split a received datagram into its kind and payload.
pub fn split_link(buf: &[u8]) -> Result<(LinkMsgKind, &[u8]), WireError> {
    let mut r = WireReader::new(buf);
    let kind = LinkMsgKind::from_u8(r.u8()?)?;
    Ok((kind, r.rest()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_roundtrip() {
        let framed = frame_link(LinkMsgKind::Data, &[1, 2, 3]);
        let (kind, payload) = split_link(&framed).unwrap();
        assert_eq!(kind, LinkMsgKind::Data);
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn reset_frame_carries_no_payload() {
        let framed = frame_link(LinkMsgKind::Reset, &[]);
        assert_eq!(framed, vec![2]);
        let (kind, payload) = split_link(&framed).unwrap();
        assert_eq!(kind, LinkMsgKind::Reset);
        assert!(payload.is_empty());
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(split_link(&[9, 0, 0]).is_err());
        assert!(split_link(&[]).is_err());
    }
}
