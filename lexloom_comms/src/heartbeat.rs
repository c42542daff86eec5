// Keep-alive probing and dead-peer detection.
//
// Two flavors share one timer. On the relay, the relay itself dictates the
// interval (from its connect response) and we ping it with relay heartbeat
// frames. On direct links we probe peers every `HB_INTERVAL` seconds with
// empty messages: a header whose id is 0, below anything ever acked, so
// the receiver drops it without disturbing the sequence. If nothing at all
// arrives for twice the interval, the application is asked to reset the
// transport. That escalation is one-shot; the receipt clock restarts only
// when traffic resumes.
//
// The timer is one-shot and re-armed from its own expiry. `timer_pending`
// keeps a second one from being scheduled alongside it.

use tracing::{debug, warn};

use lexloom_protocol::header::MsgHeader;
use lexloom_protocol::link::{LinkMsgKind, frame_link};
use lexloom_protocol::relay::RelayFrame;
use lexloom_protocol::types::{ChannelId, MessageId};
use lexloom_protocol::wire::WireWriter;

use crate::address::CommsAddr;
use crate::comms::Comms;
use crate::util::{CommsUtil, TimerKind};

/// Probe interval for direct links, seconds.
pub const HB_INTERVAL: u16 = 5;

#[derive(Default)]
pub(crate) struct Heartbeat {
    pub do_heartbeat: bool,
    pub timer_pending: bool,
    /// Seconds timestamp of the last received datagram; 0 after an
    /// escalation, which suppresses repeat resets until traffic resumes.
    pub last_rcvd_secs: u64,
}

impl Comms {
    /// Probing only makes sense on links that are cheap and connectionless
    /// from our point of view.
    pub(crate) fn set_do_heartbeat(&mut self) {
        self.hb.do_heartbeat = matches!(
            self.addr,
            CommsAddr::DirectIp { .. } | CommsAddr::Radio { .. }
        );
    }

    pub(crate) fn set_heartbeat_timer(&mut self, util: &mut dyn CommsUtil) {
        if self.hb.timer_pending {
            return;
        }
        let when = match self.addr {
            CommsAddr::Relay { .. } => self.relay.heartbeat_secs,
            _ if self.hb.do_heartbeat => HB_INTERVAL,
            _ => 0,
        };
        if when != 0 {
            util.set_timer(TimerKind::Heartbeat, u32::from(when));
            self.hb.timer_pending = true;
        }
    }

    /// Application callback for the heartbeat timer.
    pub fn heartbeat_timer_fired(&mut self, util: &mut dyn CommsUtil) {
        self.hb.timer_pending = false;
        match self.addr {
            CommsAddr::Relay { .. } => {
                if self.relay.heartbeat_secs != 0 {
                    let frame = RelayFrame::Heartbeat {
                        cookie_id: self.relay.cookie_id,
                        host_id: self.relay.my_host_id,
                    };
                    if let Err(err) = self.send_relay_frame(&frame) {
                        warn!(%err, "relay heartbeat send failed");
                    }
                    self.set_heartbeat_timer(util);
                }
            }
            _ if self.hb.do_heartbeat => self.heartbeat_checks(util),
            _ => {}
        }
    }

    fn heartbeat_checks(&mut self, util: &mut dyn CommsUtil) {
        if self.hb.last_rcvd_secs > 0 {
            let now = util.now_secs();
            let too_long_ago = now.saturating_sub(u64::from(HB_INTERVAL) * 2);
            if self.hb.last_rcvd_secs < too_long_ago {
                warn!(
                    quiet_secs = now - self.hb.last_rcvd_secs,
                    "peer quiet too long; requesting transport reset"
                );
                util.transport_reset();
                self.hb.last_rcvd_secs = 0;
                self.set_heartbeat_timer(util);
                return;
            }
        }

        if self.recs.is_empty() {
            if !self.is_server {
                // Still waiting for setup; probe so the host learns our
                // address.
                self.send_empty_msg(None);
            }
        } else {
            for idx in 0..self.recs.len() {
                self.send_empty_msg(Some(idx));
            }
        }
        self.set_heartbeat_timer(util);
    }

    /// A probe datagram: bare header, id 0, never queued.
    fn send_empty_msg(&mut self, rec_idx: Option<usize>) {
        let (channel, last_msg_rcd, dest) = match rec_idx {
            Some(idx) => {
                let rec = &self.recs[idx];
                let dest = if rec.addr == CommsAddr::Nothing {
                    self.addr.clone()
                } else {
                    rec.addr.clone()
                };
                (rec.channel, rec.last_msg_rcd, dest)
            }
            None => (ChannelId::NONE, MessageId::ZERO, self.addr.clone()),
        };
        let mut w = WireWriter::new();
        MsgHeader {
            connection_id: self.conn_id,
            channel,
            msg_id: MessageId::ZERO,
            last_msg_rcd,
        }
        .write(&mut w);
        let framed = frame_link(LinkMsgKind::Data, &w.finish());
        match self.transport.send(&framed, &dest) {
            Ok(_) => debug!(channel = channel.0, "heartbeat probe sent"),
            Err(err) => warn!(%err, "heartbeat probe send failed"),
        }
    }

    pub(crate) fn note_traffic(&mut self, util: &mut dyn CommsUtil) {
        self.hb.last_rcvd_secs = util.now_secs();
        self.set_heartbeat_timer(util);
    }
}
