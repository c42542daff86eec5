// Saving and restoring comms state.
//
// The persisted image carries everything needed to resume a game's
// messaging after a process restart: identity (role, connection id,
// channel counter, relay naming), every address record with its counters,
// and the outgoing queue byte-for-byte. Send counts are transient and
// restart at zero.
//
// The layout is pinned and versioned with a leading format byte.
// Diagnostic counters ride in explicit optional trailers so the format
// never forks between builds that track them and builds that don't.

use tracing::warn;

use lexloom_protocol::header::DiagTrailer;
use lexloom_protocol::types::{ChannelId, ConnectionId, MessageId, RelayHostId};
use lexloom_protocol::wire::{WireError, WireReader, WireWriter};

use crate::address::CommsAddr;
use crate::channel::AddressRecord;
use crate::comms::Comms;
use crate::queue::{OutgoingQueue, QueuedMessage};
use crate::relay::RelaySub;
use crate::transport::{CommsError, Transport};

const FORMAT_VERSION: u8 = 1;

impl Comms {
    pub fn save(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_u8(FORMAT_VERSION);
        w.put_u8(u8::from(self.is_server));
        self.addr.write(&mut w);
        if matches!(self.addr, CommsAddr::Relay { .. }) {
            w.put_u8((self.relay.players_here << 4) | (self.relay.players_total & 0x0f));
        }
        w.put_u32(self.conn_id.0);
        w.put_u16(self.next_channel);
        if matches!(self.addr, CommsAddr::Relay { .. }) {
            w.put_u8(self.relay.my_host_id.0);
            w.put_str(&self.relay.conn_name);
        }
        DiagTrailer::write_opt(
            Some(&DiagTrailer {
                last_ack: MessageId::ZERO,
                unique_bytes: self.unique_bytes,
            }),
            &mut w,
        );

        // A message too large for the blob prefix cannot be persisted;
        // leaving it out beats corrupting everything written after it.
        let queue: Vec<&QueuedMessage> = self
            .queue
            .iter()
            .filter(|elem| elem.bytes.len() <= usize::from(u16::MAX))
            .collect();
        if queue.len() < usize::from(self.queue.len()) {
            warn!(
                n_dropped = usize::from(self.queue.len()) - queue.len(),
                "oversized queued messages left out of the save"
            );
        }
        #[expect(clippy::cast_possible_truncation)]
        w.put_u16(queue.len() as u16);
        debug_assert!(self.recs.len() <= usize::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.recs.len() as u8);
        for rec in &self.recs {
            rec.addr.write(&mut w);
            w.put_u32(rec.next_msg_id.0);
            w.put_u32(rec.last_msg_rcd.0);
            w.put_u16(rec.channel.0);
            if matches!(rec.addr, CommsAddr::Relay { .. }) {
                w.put_u8(rec.host_id.0);
            }
            w.put_u8(u8::from(rec.initial_seen));
            DiagTrailer::write_opt(
                Some(&DiagTrailer {
                    last_ack: rec.last_ack,
                    unique_bytes: rec.unique_bytes,
                }),
                &mut w,
            );
        }

        for elem in queue {
            w.put_u16(elem.channel.0);
            w.put_u32(elem.msg_id.0);
            // Length vetted by the filter above.
            let _ = w.put_blob(&elem.bytes);
        }
        w.finish()
    }

    pub fn restore(bytes: &[u8], transport: Box<dyn Transport>) -> Result<Comms, CommsError> {
        let mut r = WireReader::new(bytes);
        let version = r.u8()?;
        if version != FORMAT_VERSION {
            return Err(CommsError::Wire(WireError::BadVersion {
                what: "comms state",
                version,
            }));
        }
        let is_server = r.u8()? != 0;
        let addr = CommsAddr::read(&mut r)?;
        let on_relay = matches!(addr, CommsAddr::Relay { .. });
        let (players_here, players_total) = if on_relay {
            let packed = r.u8()?;
            (packed >> 4, packed & 0x0f)
        } else {
            (0, 0)
        };
        let conn_id = ConnectionId(r.u32()?);
        let next_channel = r.u16()?;
        let mut relay = RelaySub::new(players_here, players_total);
        if on_relay {
            relay.my_host_id = RelayHostId(r.u8()?);
            relay.conn_name = r.str()?;
        }
        let unique_bytes = DiagTrailer::read_opt(&mut r)?
            .map(|t| t.unique_bytes)
            .unwrap_or(0);

        let queue_len = r.u16()?;
        let n_recs = r.u8()?;
        let mut recs = Vec::with_capacity(usize::from(n_recs));
        for _ in 0..n_recs {
            let rec_addr = CommsAddr::read(&mut r)?;
            let next_msg_id = MessageId(r.u32()?);
            let last_msg_rcd = MessageId(r.u32()?);
            let channel = ChannelId(r.u16()?);
            let host_id = if matches!(rec_addr, CommsAddr::Relay { .. }) {
                RelayHostId(r.u8()?)
            } else {
                RelayHostId::NONE
            };
            let initial_seen = r.u8()? != 0;
            let diag = DiagTrailer::read_opt(&mut r)?.unwrap_or_default();
            let mut rec = AddressRecord::new(channel, host_id, rec_addr);
            rec.next_msg_id = next_msg_id;
            rec.last_msg_rcd = last_msg_rcd;
            rec.initial_seen = initial_seen;
            rec.last_ack = diag.last_ack;
            rec.unique_bytes = diag.unique_bytes;
            recs.push(rec);
        }

        let mut queue = OutgoingQueue::default();
        for _ in 0..queue_len {
            let channel = ChannelId(r.u16()?);
            let msg_id = MessageId(r.u32()?);
            let msg_bytes = r.blob()?.to_vec();
            queue.push(QueuedMessage {
                channel,
                msg_id,
                bytes: msg_bytes,
                send_count: 0,
            });
        }

        let mut comms = Comms::new(is_server, addr, players_here, players_total, transport);
        comms.conn_id = conn_id;
        comms.next_channel = next_channel;
        comms.relay = relay;
        comms.unique_bytes = unique_bytes;
        comms.recs = recs;
        comms.queue = queue;
        #[cfg(feature = "heartbeat")]
        comms.set_do_heartbeat();
        Ok(comms)
    }
}
