// The relay connection submachine.
//
// When the active address is `CommsAddr::Relay`, a small state machine
// rides along with the comms engine: Unconnected -> ConnectPending ->
// Connected -> AllConnected. Application sends are deferred (left queued)
// until AllConnected; the relay's ALLHERE signal triggers a full queue
// replay, which is what delivers anything queued while waiting.
//
// A device that has connected once holds a relay-assigned `conn_name` and
// rejoins with `Reconnect` instead of `Connect`.

use tracing::{debug, warn};

use lexloom_protocol::RELAY_PROTO_VERSION;
use lexloom_protocol::relay::RelayFrame;
use lexloom_protocol::types::{ChannelId, CookieId, RelayHostId};

use crate::address::CommsAddr;
use crate::channel;
use crate::comms::Comms;
use crate::transport::CommsError;
use crate::util::{CommsUtil, UserError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    Unconnected,
    ConnectPending,
    Connected,
    AllConnected,
}

pub(crate) struct RelaySub {
    pub state: RelayState,
    pub my_host_id: RelayHostId,
    pub cookie_id: CookieId,
    /// Relay-assigned name for this game instance; empty until the first
    /// ALLHERE. Non-empty means reconnect on the next join.
    pub conn_name: String,
    /// Ping interval the relay asked for in its connect response.
    pub heartbeat_secs: u16,
    pub players_here: u8,
    pub players_total: u8,
    connecting: bool,
}

impl RelaySub {
    pub fn new(players_here: u8, players_total: u8) -> RelaySub {
        RelaySub {
            state: RelayState::Unconnected,
            my_host_id: RelayHostId::NONE,
            cookie_id: CookieId::NONE,
            conn_name: String::new(),
            heartbeat_secs: 0,
            players_here,
            players_total,
            connecting: false,
        }
    }

    pub fn begin_new_game(&mut self, players_here: u8, players_total: u8) {
        self.cookie_id = CookieId::NONE;
        self.players_here = players_here;
        self.players_total = players_total;
    }
}

impl Comms {
    pub fn relay_state(&self) -> RelayState {
        self.relay.state
    }

    /// Handle the relay envelope on an incoming datagram. Returns the
    /// sender seat and inner payload when the frame routes application
    /// data to us; control frames are fully handled here.
    pub(crate) fn relay_pre_process(
        &mut self,
        raw: &[u8],
        util: &mut dyn CommsUtil,
    ) -> Option<(RelayHostId, Vec<u8>)> {
        let frame = match RelayFrame::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "undecodable relay frame dropped");
                return None;
            }
        };
        match frame {
            RelayFrame::ConnectResp {
                heartbeat_secs,
                cookie_id,
                host_id,
            }
            | RelayFrame::ReconnectResp {
                heartbeat_secs,
                cookie_id,
                host_id,
            } => {
                self.relay.state = RelayState::Connected;
                self.relay.heartbeat_secs = heartbeat_secs;
                self.relay.cookie_id = cookie_id;
                self.relay.my_host_id = host_id;
                debug!(
                    cookie_id = cookie_id.0,
                    host_id = host_id.0,
                    "relay connect response"
                );
                self.arm_relay_heartbeat(util);
            }
            RelayFrame::AllConnected { conn_name } => {
                self.relay.state = RelayState::AllConnected;
                if let Some(name) = conn_name {
                    debug!(conn_name = %name, "relay assigned connection name");
                    self.relay.conn_name = name;
                } else {
                    debug_assert!(!self.relay.conn_name.is_empty());
                }
                // Deliver whatever piled up while we waited.
                self.resend_all();
            }
            RelayFrame::Routed {
                cookie_id,
                src,
                dest,
                payload,
            } => {
                if cookie_id == self.relay.cookie_id && dest == self.relay.my_host_id {
                    return Some((src, payload));
                }
                debug!(
                    cookie_id = cookie_id.0,
                    dest = dest.0,
                    "routed frame for someone else dropped"
                );
            }
            RelayFrame::DisconnectOther { error, host_id } => {
                debug!(host_id = host_id.0, "another seat disconnected");
                util.user_error(UserError::RelayDeviceLost(error));
            }
            RelayFrame::DisconnectYou { error } => {
                util.user_error(UserError::RelayDroppedYou(error));
                self.relay.state = RelayState::Unconnected;
            }
            RelayFrame::ConnectDenied { error } => {
                util.user_error(UserError::RelayDenied(error));
                self.relay.state = RelayState::Unconnected;
            }
            RelayFrame::Heartbeat { .. } => {}
            RelayFrame::Connect { .. }
            | RelayFrame::Reconnect { .. }
            | RelayFrame::Disconnect { .. } => {
                debug!("client-bound relay frame ignored");
            }
        }
        None
    }

    /// Open (or re-open) our seat at the relay. No-op off-relay or while a
    /// connect is already being sent.
    pub(crate) fn relay_connect(&mut self) {
        let CommsAddr::Relay { room, .. } = &self.addr else {
            return;
        };
        if self.relay.connecting {
            return;
        }
        let frame = if self.relay.conn_name.is_empty() {
            RelayFrame::Connect {
                proto_version: RELAY_PROTO_VERSION,
                room: room.clone(),
                host_id: self.relay.my_host_id,
                players_here: self.relay.players_here,
                players_total: self.relay.players_total,
            }
        } else {
            RelayFrame::Reconnect {
                proto_version: RELAY_PROTO_VERSION,
                conn_name: self.relay.conn_name.clone(),
                host_id: self.relay.my_host_id,
                players_here: self.relay.players_here,
                players_total: self.relay.players_total,
            }
        };
        self.relay.connecting = true;
        self.relay.state = RelayState::ConnectPending;
        if let Err(err) = self.send_relay_frame(&frame) {
            warn!(%err, "relay connect send failed");
        }
        self.relay.connecting = false;
    }

    pub(crate) fn relay_disconnect(&mut self) {
        if !matches!(self.addr, CommsAddr::Relay { .. }) {
            return;
        }
        if self.relay.state == RelayState::Unconnected {
            return;
        }
        self.relay.state = RelayState::Unconnected;
        let frame = RelayFrame::Disconnect {
            cookie_id: self.relay.cookie_id,
            host_id: self.relay.my_host_id,
        };
        if let Err(err) = self.send_relay_frame(&frame) {
            warn!(%err, "relay disconnect send failed");
        }
    }

    /// Wrap an application datagram for one seat and send it.
    pub(crate) fn send_routed(
        &mut self,
        dest: RelayHostId,
        payload: Vec<u8>,
    ) -> Result<bool, CommsError> {
        let frame = RelayFrame::Routed {
            cookie_id: self.relay.cookie_id,
            src: self.relay.my_host_id,
            dest,
            payload,
        };
        self.send_relay_frame(&frame)
    }

    pub(crate) fn send_relay_frame(&mut self, frame: &RelayFrame) -> Result<bool, CommsError> {
        let buf = frame.encode();
        let dest = self.addr.clone();
        let n = self.transport.send(&buf, &dest).map_err(CommsError::from)?;
        Ok(n == buf.len())
    }

    /// Relay seat a channel's traffic should be routed to. Channel 0 (a
    /// guest before setup) always means the host seat.
    pub(crate) fn dest_for(&self, channel: ChannelId) -> RelayHostId {
        if channel == ChannelId::NONE {
            return RelayHostId::SERVER;
        }
        channel::by_channel(&self.recs, channel)
            .map(|idx| self.recs[idx].host_id)
            .unwrap_or(RelayHostId::NONE)
    }

    #[cfg(feature = "heartbeat")]
    fn arm_relay_heartbeat(&mut self, util: &mut dyn CommsUtil) {
        self.set_heartbeat_timer(util);
    }

    #[cfg(not(feature = "heartbeat"))]
    fn arm_relay_heartbeat(&mut self, _util: &mut dyn CommsUtil) {}
}
