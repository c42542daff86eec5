// Per-peer channel records.
//
// One `AddressRecord` exists per established peer channel. It carries the
// reliable-delivery counters (`next_msg_id` for sends, `last_msg_rcd` for
// receipt validation) and the last known address for the peer, which is
// refreshed on every valid message since socket resets can change it.
//
// Lookups are free functions over the record list rather than methods on
// the comms context so callers can hold the queue and the records
// mutably at the same time.

use lexloom_protocol::types::{ChannelId, MessageId, RelayHostId};

use crate::address::CommsAddr;

pub(crate) struct AddressRecord {
    pub addr: CommsAddr,
    pub next_msg_id: MessageId,
    pub last_msg_rcd: MessageId,
    pub channel: ChannelId,
    /// Relay seat of the peer; `NONE` on other transports.
    pub host_id: RelayHostId,
    /// Set once a real (non-probe) initial message arrived on this
    /// channel. A second initial message on a seen channel is a dup.
    pub initial_seen: bool,
    // Diagnostics, carried in the persisted trailer.
    pub last_ack: MessageId,
    pub unique_bytes: u32,
}

impl AddressRecord {
    pub fn new(channel: ChannelId, host_id: RelayHostId, addr: CommsAddr) -> AddressRecord {
        AddressRecord {
            addr,
            next_msg_id: MessageId::ZERO,
            last_msg_rcd: MessageId::ZERO,
            channel,
            host_id,
            initial_seen: false,
            last_ack: MessageId::ZERO,
            unique_bytes: 0,
        }
    }
}

pub(crate) fn by_channel(recs: &[AddressRecord], channel: ChannelId) -> Option<usize> {
    recs.iter().position(|rec| rec.channel == channel)
}

/// Find the record an incoming message belongs to. With an address we match
/// on route, additionally requiring the relay seat to agree when both sides
/// know it (all relay peers share one route). Without an address only the
/// channel number can identify the sender.
pub(crate) fn by_source(
    recs: &[AddressRecord],
    addr: Option<&CommsAddr>,
    sender: RelayHostId,
    channel: ChannelId,
) -> Option<usize> {
    let Some(addr) = addr else {
        return by_channel(recs, channel);
    };
    if *addr == CommsAddr::Nothing {
        return by_channel(recs, channel);
    }
    recs.iter().position(|rec| {
        if !addr.same_route(&rec.addr) {
            return false;
        }
        if matches!(addr, CommsAddr::Relay { .. })
            && sender != RelayHostId::NONE
            && rec.host_id != RelayHostId::NONE
        {
            return rec.host_id == sender;
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_addr() -> CommsAddr {
        CommsAddr::Relay {
            host: "relay".to_string(),
            port: 1,
            room: "r".to_string(),
        }
    }

    #[test]
    fn relay_records_are_told_apart_by_seat() {
        let recs = vec![
            AddressRecord::new(ChannelId(1), RelayHostId(2), relay_addr()),
            AddressRecord::new(ChannelId(2), RelayHostId(3), relay_addr()),
        ];
        let found = by_source(&recs, Some(&relay_addr()), RelayHostId(3), ChannelId::NONE);
        assert_eq!(found, Some(1));
    }

    #[test]
    fn direct_records_match_on_route() {
        let a = CommsAddr::DirectIp {
            host: "10.0.0.9".to_string(),
            port: 5,
        };
        let recs = vec![AddressRecord::new(ChannelId(1), RelayHostId::NONE, a.clone())];
        assert_eq!(by_source(&recs, Some(&a), RelayHostId::NONE, ChannelId::NONE), Some(0));
        let other = CommsAddr::DirectIp {
            host: "10.0.0.10".to_string(),
            port: 5,
        };
        assert_eq!(
            by_source(&recs, Some(&other), RelayHostId::NONE, ChannelId::NONE),
            None
        );
    }

    #[test]
    fn no_address_falls_back_to_channel() {
        let recs = vec![AddressRecord::new(
            ChannelId(4),
            RelayHostId::NONE,
            CommsAddr::Nothing,
        )];
        assert_eq!(by_source(&recs, None, RelayHostId::NONE, ChannelId(4)), Some(0));
        assert_eq!(by_source(&recs, None, RelayHostId::NONE, ChannelId(5)), None);
    }
}
