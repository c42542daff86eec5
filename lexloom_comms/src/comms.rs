// The reliable-messaging engine.
//
// `Comms` sits between the game server and a raw datagram transport and
// guarantees exactly-once, in-order delivery per channel on top of a link
// that may drop, duplicate, or replay. The mechanism:
//
// - every outbound message gets the next id on its channel and stays in
//   the outgoing queue until acked;
// - every outbound header carries `last_msg_rcd`, the highest in-order id
//   received on that channel, which is the only ack there is;
// - every inbound message must carry *exactly* `last_msg_rcd + 1` for its
//   channel or it is dropped silently. Duplicates fall below the expected
//   id, reordered messages jump above it; either way the sender's resend
//   of the full queue in order is what recovers the stream.
//
// There is deliberately no negotiation or recovery protocol beyond that.

use tracing::{debug, warn};

use lexloom_protocol::header::{HEADER_LEN, MsgHeader};
use lexloom_protocol::link::{LinkMsgKind, frame_link, split_link};
use lexloom_protocol::types::{ChannelId, ConnectionId, MessageId, RelayHostId};
use lexloom_protocol::wire::{WireReader, WireWriter};

use crate::address::CommsAddr;
use crate::channel::{self, AddressRecord};
use crate::queue::{OutgoingQueue, QueuedMessage};
use crate::relay::{RelayState, RelaySub};
use crate::transport::{CommsError, Transport};
use crate::util::CommsUtil;

/// A validated application message, ready for the server state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub channel: ChannelId,
    pub payload: Vec<u8>,
}

pub struct Comms {
    pub(crate) is_server: bool,
    pub(crate) addr: CommsAddr,
    pub(crate) conn_id: ConnectionId,
    /// Highest channel number handed out so far; host side only.
    pub(crate) next_channel: u16,
    pub(crate) recs: Vec<AddressRecord>,
    pub(crate) queue: OutgoingQueue,
    pub(crate) relay: RelaySub,
    pub(crate) transport: Box<dyn Transport>,
    /// Bytes sent before any channel record existed. Diagnostic.
    pub(crate) unique_bytes: u32,
    #[cfg(feature = "heartbeat")]
    pub(crate) hb: crate::heartbeat::Heartbeat,
}

impl Comms {
    pub fn new(
        is_server: bool,
        addr: CommsAddr,
        players_here: u8,
        players_total: u8,
        transport: Box<dyn Transport>,
    ) -> Comms {
        Comms {
            is_server,
            addr,
            conn_id: ConnectionId::NONE,
            next_channel: 0,
            recs: Vec::new(),
            queue: OutgoingQueue::default(),
            relay: RelaySub::new(players_here, players_total),
            transport,
            unique_bytes: 0,
            #[cfg(feature = "heartbeat")]
            hb: crate::heartbeat::Heartbeat::default(),
        }
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn addr(&self) -> &CommsAddr {
        &self.addr
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Bind all future traffic to one game. Setup messages built before
    /// this call carry `ConnectionId::NONE` and take the initial-message
    /// path on the peer.
    pub fn set_conn_id(&mut self, conn_id: ConnectionId) {
        debug!(conn_id = conn_id.0, "connection id set");
        self.conn_id = conn_id;
    }

    pub fn queue_len(&self) -> u16 {
        self.queue.len()
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.recs.iter().map(|rec| rec.channel).collect()
    }

    /// Bring the link up: relay connect handshake, or a link reset plus
    /// queue replay on direct transports.
    pub fn start(&mut self, util: &mut dyn CommsUtil) {
        #[cfg(feature = "heartbeat")]
        self.set_do_heartbeat();
        self.send_connect(util);
    }

    /// Point at a different address mid-game, reconnecting through it.
    pub fn set_addr(&mut self, addr: CommsAddr, util: &mut dyn CommsUtil) {
        self.addr = addr;
        #[cfg(feature = "heartbeat")]
        self.set_do_heartbeat();
        self.send_connect(util);
    }

    /// Forget everything about the current game and begin a new one on the
    /// same transport.
    pub fn reset(
        &mut self,
        is_server: bool,
        players_here: u8,
        players_total: u8,
        util: &mut dyn CommsUtil,
    ) {
        self.relay_disconnect();
        self.queue.clear();
        self.recs.clear();
        self.is_server = is_server;
        self.next_channel = 0;
        self.conn_id = ConnectionId::NONE;
        self.relay.begin_new_game(players_here, players_total);
        self.relay_connect();
        self.arm_heartbeat(util);
    }

    fn send_connect(&mut self, util: &mut dyn CommsUtil) {
        match self.addr {
            CommsAddr::Relay { .. } => {
                self.relay.state = RelayState::Unconnected;
                self.relay_connect();
            }
            CommsAddr::DirectIp { .. } | CommsAddr::Radio { .. } => {
                let framed = frame_link(LinkMsgKind::Reset, &[]);
                let dest = self.addr.clone();
                if let Err(err) = self.transport.send(&framed, &dest) {
                    warn!(%err, "link reset send failed");
                }
                self.resend_all();
            }
            _ => {}
        }
        self.arm_heartbeat(util);
    }

    /// Queue `payload` on `channel` with the next message id and try to
    /// put it on the wire. Returns the payload bytes delivered; 0 means
    /// the message is queued but not yet sent (link down, relay not fully
    /// connected), which resolves itself on the next replay.
    pub fn send(&mut self, payload: &[u8], channel: ChannelId) -> Result<usize, CommsError> {
        let (msg_id, last_msg_rcd) = match channel::by_channel(&self.recs, channel) {
            Some(idx) => {
                let rec = &mut self.recs[idx];
                rec.next_msg_id = rec.next_msg_id.next();
                rec.unique_bytes += payload.len() as u32;
                (rec.next_msg_id, rec.last_msg_rcd)
            }
            None => {
                // Pre-registration: id 0, acked by any later traffic.
                self.unique_bytes += payload.len() as u32;
                (MessageId::ZERO, MessageId::ZERO)
            }
        };
        debug!(
            channel = channel.0,
            msg_id = msg_id.0,
            len = payload.len(),
            "queueing message"
        );

        let mut w = WireWriter::new();
        MsgHeader {
            connection_id: self.conn_id,
            channel,
            msg_id,
            last_msg_rcd,
        }
        .write(&mut w);
        w.put_bytes(payload);

        self.queue.push(QueuedMessage {
            channel,
            msg_id,
            bytes: w.finish(),
            send_count: 0,
        });
        self.transmit(self.queue.len() as usize - 1)
    }

    /// Replay the whole outgoing queue in order. Transport errors are
    /// logged, not propagated; an unreachable peer just means the next
    /// replay tries again. Returns total payload bytes delivered.
    pub fn resend_all(&mut self) -> usize {
        let mut total = 0;
        for idx in 0..self.queue.len() as usize {
            match self.transmit(idx) {
                Ok(n) => total += n,
                Err(err) => warn!(%err, "resend failed"),
            }
        }
        total
    }

    /// Put one queued element on the wire, if the link allows it now.
    fn transmit(&mut self, idx: usize) -> Result<usize, CommsError> {
        let (channel, bytes) = match self.queue.get_mut(idx) {
            Some(elem) => (elem.channel, elem.bytes.clone()),
            None => return Ok(0),
        };
        let len = bytes.len();

        let delivered = match &self.addr {
            CommsAddr::Relay { .. } => {
                if self.relay.state == RelayState::AllConnected {
                    let dest = self.dest_for(channel);
                    self.send_routed(dest, bytes)?
                } else {
                    debug!(channel = channel.0, "send deferred: relay not fully connected");
                    false
                }
            }
            CommsAddr::DirectIp { .. } | CommsAddr::Radio { .. } => {
                let framed = frame_link(LinkMsgKind::Data, &bytes);
                let dest = self.dest_addr(channel);
                let n = self.transport.send(&framed, &dest)?;
                n == framed.len()
            }
            _ => {
                let dest = self.dest_addr(channel);
                let n = self.transport.send(&bytes, &dest)?;
                n == len
            }
        };

        if delivered {
            if let Some(elem) = self.queue.get_mut(idx) {
                elem.send_count += 1;
            }
            Ok(len)
        } else {
            Ok(0)
        }
    }

    /// Best known address for a channel, falling back to our own.
    fn dest_addr(&self, channel: ChannelId) -> CommsAddr {
        channel::by_channel(&self.recs, channel)
            .map(|idx| &self.recs[idx].addr)
            .filter(|addr| **addr != CommsAddr::Nothing)
            .unwrap_or(&self.addr)
            .clone()
    }

    /// Validate one received datagram and, if it carries the next expected
    /// application message, surface it. Everything else (relay control
    /// traffic, heartbeats, duplicates, gaps, wrong connection ids) is
    /// handled or dropped internally.
    pub fn check_incoming(
        &mut self,
        raw: &[u8],
        from: Option<&CommsAddr>,
        util: &mut dyn CommsUtil,
    ) -> Option<IncomingMessage> {
        let result = self.check_incoming_inner(raw, from, util);
        self.note_traffic(util);
        result
    }

    fn check_incoming_inner(
        &mut self,
        raw: &[u8],
        from: Option<&CommsAddr>,
        util: &mut dyn CommsUtil,
    ) -> Option<IncomingMessage> {
        let mut sender = RelayHostId::NONE;
        let relay_payload;
        let data: &[u8] = match &self.addr {
            CommsAddr::Relay { .. } => {
                let (src, inner) = self.relay_pre_process(raw, util)?;
                sender = src;
                relay_payload = inner;
                &relay_payload
            }
            CommsAddr::DirectIp { .. } | CommsAddr::Radio { .. } => match split_link(raw) {
                Ok((LinkMsgKind::Data, rest)) => rest,
                Ok((LinkMsgKind::Reset, _)) => {
                    debug!("link reset received; replaying queue");
                    self.resend_all();
                    return None;
                }
                Ok((LinkMsgKind::Heartbeat, _)) => return None,
                Err(err) => {
                    warn!(%err, "bad link frame dropped");
                    return None;
                }
            },
            _ => raw,
        };

        if data.len() < HEADER_LEN {
            debug!(len = data.len(), "message too small");
            return None;
        }
        let mut r = WireReader::new(data);
        let header = match MsgHeader::read(&mut r) {
            Ok(header) => header,
            Err(err) => {
                warn!(%err, "unreadable header");
                return None;
            }
        };
        let body = r.rest();
        let has_payload = !body.is_empty();
        let mut channel = header.channel;

        let rec_idx = if header.connection_id == ConnectionId::NONE {
            self.validate_initial(has_payload, from, sender, &mut channel)
        } else if header.connection_id == self.conn_id {
            self.validate_channel(from, channel, header.msg_id, header.last_msg_rcd)
        } else {
            debug!(
                got = header.connection_id.0,
                want = self.conn_id.0,
                "message for a different game dropped"
            );
            None
        }?;

        self.recs[rec_idx].last_msg_rcd = header.msg_id;
        if has_payload {
            Some(IncomingMessage {
                channel,
                payload: body.to_vec(),
            })
        } else {
            None
        }
    }

    /// An initial message (connection id 0) is a guest's registration, the
    /// host's setup reply, or a pre-connection heartbeat probe. A real
    /// initial message must be the first seen for its source; the danger
    /// is a resent duplicate, and a known source is how we spot one.
    /// Probes get their source remembered, with a channel on the host
    /// side, but deliver nothing.
    fn validate_initial(
        &mut self,
        has_payload: bool,
        from: Option<&CommsAddr>,
        sender: RelayHostId,
        channel: &mut ChannelId,
    ) -> Option<usize> {
        if let Some(idx) = channel::by_source(&self.recs, from, sender, *channel) {
            if !has_payload {
                return None;
            }
            let rec = &mut self.recs[idx];
            if rec.initial_seen {
                debug!(channel = rec.channel.0, "duplicate initial message dropped");
                return None;
            }
            rec.initial_seen = true;
            *channel = rec.channel;
            return Some(idx);
        }

        if !has_payload && !self.is_server {
            return None;
        }
        if self.is_server {
            debug_assert_eq!(*channel, ChannelId::NONE);
            self.next_channel += 1;
            *channel = ChannelId(self.next_channel);
        }
        let addr = from.cloned().unwrap_or_default();
        let mut rec = AddressRecord::new(*channel, sender, addr);
        rec.initial_seen = has_payload;
        debug!(
            channel = channel.0,
            initial = has_payload,
            "new channel record"
        );
        self.recs.push(rec);
        if has_payload {
            Some(self.recs.len() - 1)
        } else {
            None
        }
    }

    /// A message on an established connection is valid only if it carries
    /// exactly the next id for its channel. Its ack prunes the queue even
    /// when the message itself is a dup; its address refreshes the record
    /// since a socket reset can change where a peer sends from.
    fn validate_channel(
        &mut self,
        from: Option<&CommsAddr>,
        channel: ChannelId,
        msg_id: MessageId,
        last_msg_rcd: MessageId,
    ) -> Option<usize> {
        let Some(idx) = channel::by_channel(&self.recs, channel) else {
            debug!(channel = channel.0, "no record for channel");
            return None;
        };
        self.queue.prune(channel, last_msg_rcd);
        let rec = &mut self.recs[idx];
        if msg_id == rec.last_msg_rcd.next() {
            if let Some(addr) = from {
                if *addr != CommsAddr::Nothing {
                    rec.addr = addr.clone();
                }
            }
            rec.last_ack = last_msg_rcd;
            Some(idx)
        } else {
            warn!(
                expected = rec.last_msg_rcd.0 + 1,
                got = msg_id.0,
                channel = channel.0,
                "out-of-sequence message dropped"
            );
            None
        }
    }

    #[cfg(feature = "heartbeat")]
    fn arm_heartbeat(&mut self, util: &mut dyn CommsUtil) {
        self.set_heartbeat_timer(util);
    }

    #[cfg(not(feature = "heartbeat"))]
    fn arm_heartbeat(&mut self, _util: &mut dyn CommsUtil) {}

    #[cfg(not(feature = "heartbeat"))]
    fn note_traffic(&mut self, _util: &mut dyn CommsUtil) {}
}
