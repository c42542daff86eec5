// End-to-end exercises of the comms engine over an in-process capture
// transport: the host/guest handshake, channel assignment, implicit acks,
// duplicate and gap rejection, and the relay submachine's send deferral.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use lexloom_comms::{
    Comms, CommsAddr, CommsUtil, RelayState, TimerKind, Transport, UserError,
};
use lexloom_protocol::relay::{RelayError, RelayFrame};
use lexloom_protocol::types::{ChannelId, ConnectionId, CookieId, RelayHostId};

type Sent = Rc<RefCell<Vec<Vec<u8>>>>;

struct CaptureTransport {
    sent: Sent,
}

impl Transport for CaptureTransport {
    fn send(&mut self, buf: &[u8], _dest: &CommsAddr) -> io::Result<usize> {
        self.sent.borrow_mut().push(buf.to_vec());
        Ok(buf.len())
    }
}

fn capture() -> (Sent, Box<dyn Transport>) {
    let sent: Sent = Rc::new(RefCell::new(Vec::new()));
    let transport = CaptureTransport { sent: sent.clone() };
    (sent, Box::new(transport))
}

fn last(sent: &Sent) -> Vec<u8> {
    sent.borrow().last().cloned().expect("nothing was sent")
}

#[derive(Default)]
struct TestUtil {
    errors: Vec<UserError>,
    timers: Vec<(TimerKind, u32)>,
    resets: usize,
    now: u64,
}

impl CommsUtil for TestUtil {
    fn user_error(&mut self, err: UserError) {
        self.errors.push(err);
    }
    fn set_timer(&mut self, kind: TimerKind, secs: u32) {
        self.timers.push((kind, secs));
    }
    fn clear_timer(&mut self, _kind: TimerKind) {}
    fn now_secs(&self) -> u64 {
        self.now
    }
    fn transport_reset(&mut self) {
        self.resets += 1;
    }
}

fn host_addr() -> CommsAddr {
    CommsAddr::DirectIp {
        host: "10.0.0.1".to_string(),
        port: 4001,
    }
}

fn guest_addr() -> CommsAddr {
    CommsAddr::DirectIp {
        host: "10.0.0.2".to_string(),
        port: 4002,
    }
}

fn relay_addr() -> CommsAddr {
    CommsAddr::Relay {
        host: "relay.example.net".to_string(),
        port: 10999,
        room: "study".to_string(),
    }
}

/// Run the setup handshake between a fresh host and guest, leaving both
/// with an established channel 1 and matching connection ids.
fn connected_pair() -> (Comms, Sent, Comms, Sent, TestUtil) {
    let (host_sent, host_transport) = capture();
    let (guest_sent, guest_transport) = capture();
    let mut host = Comms::new(true, guest_addr(), 0, 0, host_transport);
    let mut guest = Comms::new(false, host_addr(), 0, 0, guest_transport);
    let mut util = TestUtil::default();

    guest.send(b"reg", ChannelId::NONE).unwrap();
    let wire = last(&guest_sent);
    let msg = host
        .check_incoming(&wire, Some(&guest_addr()), &mut util)
        .expect("registration should be delivered");
    assert_eq!(msg.channel, ChannelId(1));
    assert_eq!(msg.payload, b"reg");

    host.send(b"setup", ChannelId(1)).unwrap();
    host.set_conn_id(ConnectionId(42));
    let wire = last(&host_sent);
    let msg = guest
        .check_incoming(&wire, Some(&host_addr()), &mut util)
        .expect("setup should be delivered");
    assert_eq!(msg.channel, ChannelId(1));
    assert_eq!(msg.payload, b"setup");
    guest.set_conn_id(ConnectionId(42));

    (host, host_sent, guest, guest_sent, util)
}

#[test]
fn handshake_sequences_and_acks_flow() {
    let (mut host, host_sent, mut guest, guest_sent, mut util) = connected_pair();

    // Guest's first real message carries the ack of the setup message.
    guest.send(b"move1", ChannelId(1)).unwrap();
    let wire = last(&guest_sent);
    let msg = host
        .check_incoming(&wire, Some(&guest_addr()), &mut util)
        .expect("move should be delivered");
    assert_eq!(msg.payload, b"move1");
    assert_eq!(host.queue_len(), 0, "setup message should be acked away");

    // The host's reply acks the move and the pre-registration send.
    host.send(b"reply", ChannelId(1)).unwrap();
    let wire = last(&host_sent);
    assert!(
        guest
            .check_incoming(&wire, Some(&host_addr()), &mut util)
            .is_some()
    );
    assert_eq!(guest.queue_len(), 0);
}

#[test]
fn redelivered_message_is_dropped() {
    let (mut host, _host_sent, mut guest, guest_sent, mut util) = connected_pair();

    guest.send(b"once", ChannelId(1)).unwrap();
    let wire = last(&guest_sent);
    assert!(
        host.check_incoming(&wire, Some(&guest_addr()), &mut util)
            .is_some()
    );
    assert!(
        host.check_incoming(&wire, Some(&guest_addr()), &mut util)
            .is_none(),
        "byte-identical redelivery must not reach the application"
    );
}

#[test]
fn gap_is_dropped_until_replay_closes_it() {
    let (mut host, _host_sent, mut guest, guest_sent, mut util) = connected_pair();

    guest.send(b"first", ChannelId(1)).unwrap();
    let w1 = last(&guest_sent);
    guest.send(b"second", ChannelId(1)).unwrap();
    let w2 = last(&guest_sent);

    // Reordered arrival: the later message is not buffered, just dropped.
    assert!(
        host.check_incoming(&w2, Some(&guest_addr()), &mut util)
            .is_none()
    );
    // In-order replay recovers both.
    let m1 = host
        .check_incoming(&w1, Some(&guest_addr()), &mut util)
        .unwrap();
    assert_eq!(m1.payload, b"first");
    let m2 = host
        .check_incoming(&w2, Some(&guest_addr()), &mut util)
        .unwrap();
    assert_eq!(m2.payload, b"second");
}

#[test]
fn duplicate_registration_gets_no_second_channel() {
    let (host_sent, host_transport) = capture();
    let (guest_sent, guest_transport) = capture();
    let mut host = Comms::new(true, guest_addr(), 0, 0, host_transport);
    let mut guest = Comms::new(false, host_addr(), 0, 0, guest_transport);
    let mut util = TestUtil::default();
    drop(host_sent);

    guest.send(b"reg", ChannelId::NONE).unwrap();
    let wire = last(&guest_sent);
    assert!(
        host.check_incoming(&wire, Some(&guest_addr()), &mut util)
            .is_some()
    );
    assert!(
        host.check_incoming(&wire, Some(&guest_addr()), &mut util)
            .is_none(),
        "a resent registration is a dup, not a new player"
    );
    assert_eq!(host.channels(), vec![ChannelId(1)]);
}

#[test]
fn each_new_guest_gets_its_own_channel() {
    let (_host_sent, host_transport) = capture();
    let mut host = Comms::new(true, guest_addr(), 0, 0, host_transport);
    let mut util = TestUtil::default();

    for (n, port) in [(1u16, 5001u16), (2, 5002)] {
        let (guest_sent, guest_transport) = capture();
        let addr = CommsAddr::DirectIp {
            host: "10.0.0.9".to_string(),
            port,
        };
        let mut guest = Comms::new(false, host_addr(), 0, 0, guest_transport);
        guest.send(b"reg", ChannelId::NONE).unwrap();
        let wire = last(&guest_sent);
        let msg = host.check_incoming(&wire, Some(&addr), &mut util).unwrap();
        assert_eq!(msg.channel, ChannelId(n));
    }
    assert_eq!(host.channels().len(), 2);
}

#[test]
fn relay_sends_wait_for_all_connected() {
    let (sent, transport) = capture();
    let mut comms = Comms::new(false, relay_addr(), 1, 2, transport);
    let mut util = TestUtil::default();

    comms.start(&mut util);
    assert_eq!(comms.relay_state(), RelayState::ConnectPending);
    match RelayFrame::decode(&last(&sent)).unwrap() {
        RelayFrame::Connect {
            room,
            players_here,
            players_total,
            ..
        } => {
            assert_eq!(room, "study");
            assert_eq!((players_here, players_total), (1, 2));
        }
        other => panic!("expected Connect, got {other:?}"),
    }

    // Queued, not sent: the room is not full yet.
    let frames_before = sent.borrow().len();
    assert_eq!(comms.send(b"reg", ChannelId::NONE).unwrap(), 0);
    assert_eq!(comms.queue_len(), 1);
    assert_eq!(sent.borrow().len(), frames_before);

    let resp = RelayFrame::ConnectResp {
        heartbeat_secs: 0,
        cookie_id: CookieId(7),
        host_id: RelayHostId(2),
    }
    .encode();
    assert!(
        comms
            .check_incoming(&resp, Some(&relay_addr()), &mut util)
            .is_none()
    );
    assert_eq!(comms.relay_state(), RelayState::Connected);

    let all = RelayFrame::AllConnected {
        conn_name: Some("game-17ac".to_string()),
    }
    .encode();
    assert!(
        comms
            .check_incoming(&all, Some(&relay_addr()), &mut util)
            .is_none()
    );
    assert_eq!(comms.relay_state(), RelayState::AllConnected);

    // ALLHERE replayed the queue; pre-setup traffic goes to the host seat.
    match RelayFrame::decode(&last(&sent)).unwrap() {
        RelayFrame::Routed {
            cookie_id,
            src,
            dest,
            payload,
        } => {
            assert_eq!(cookie_id, CookieId(7));
            assert_eq!(src, RelayHostId(2));
            assert_eq!(dest, RelayHostId::SERVER);
            assert!(payload.len() > b"reg".len());
        }
        other => panic!("expected Routed, got {other:?}"),
    }
}

#[test]
fn misrouted_relay_frame_is_dropped() {
    let (sent, transport) = capture();
    let mut comms = Comms::new(false, relay_addr(), 1, 2, transport);
    let mut util = TestUtil::default();
    comms.start(&mut util);
    drop(sent);

    let resp = RelayFrame::ConnectResp {
        heartbeat_secs: 0,
        cookie_id: CookieId(7),
        host_id: RelayHostId(2),
    }
    .encode();
    comms.check_incoming(&resp, Some(&relay_addr()), &mut util);

    let misrouted = RelayFrame::Routed {
        cookie_id: CookieId(7),
        src: RelayHostId::SERVER,
        dest: RelayHostId(3),
        payload: vec![0; 20],
    }
    .encode();
    assert!(
        comms
            .check_incoming(&misrouted, Some(&relay_addr()), &mut util)
            .is_none()
    );

    let wrong_room = RelayFrame::Routed {
        cookie_id: CookieId(8),
        src: RelayHostId::SERVER,
        dest: RelayHostId(2),
        payload: vec![0; 20],
    }
    .encode();
    assert!(
        comms
            .check_incoming(&wrong_room, Some(&relay_addr()), &mut util)
            .is_none()
    );
}

#[test]
fn relay_dropping_us_surfaces_and_disconnects() {
    let (sent, transport) = capture();
    let mut comms = Comms::new(false, relay_addr(), 1, 2, transport);
    let mut util = TestUtil::default();
    comms.start(&mut util);
    drop(sent);

    let dropped = RelayFrame::DisconnectYou {
        error: RelayError::HEARTBEAT_LOST,
    }
    .encode();
    assert!(
        comms
            .check_incoming(&dropped, Some(&relay_addr()), &mut util)
            .is_none()
    );
    assert_eq!(comms.relay_state(), RelayState::Unconnected);
    assert_eq!(
        util.errors,
        vec![UserError::RelayDroppedYou(RelayError::HEARTBEAT_LOST)]
    );
}

#[cfg(feature = "heartbeat")]
mod heartbeat {
    use super::*;
    use lexloom_comms::HB_INTERVAL;
    use lexloom_protocol::header::HEADER_LEN;
    use lexloom_protocol::link::{LinkMsgKind, split_link};

    #[test]
    fn direct_link_probes_on_the_interval() {
        let (sent, transport) = capture();
        let mut guest = Comms::new(false, host_addr(), 0, 0, transport);
        let mut util = TestUtil::default();

        guest.start(&mut util);
        assert!(
            util.timers
                .contains(&(TimerKind::Heartbeat, u32::from(HB_INTERVAL)))
        );

        guest.heartbeat_timer_fired(&mut util);
        let probe = last(&sent);
        let (kind, payload) = split_link(&probe).unwrap();
        assert_eq!(kind, LinkMsgKind::Data);
        assert_eq!(payload.len(), HEADER_LEN, "probes carry no body");
    }

    #[test]
    fn probe_registers_address_but_delivers_nothing() {
        let (guest_sent, guest_transport) = capture();
        let (_host_sent, host_transport) = capture();
        let mut guest = Comms::new(false, host_addr(), 0, 0, guest_transport);
        let mut host = Comms::new(true, guest_addr(), 0, 0, host_transport);
        let mut util = TestUtil::default();

        guest.start(&mut util);
        guest.heartbeat_timer_fired(&mut util);
        let probe = last(&guest_sent);
        assert!(
            host.check_incoming(&probe, Some(&guest_addr()), &mut util)
                .is_none()
        );
        assert_eq!(host.channels().len(), 1, "probe source is remembered");
    }

    #[test]
    fn quiet_peer_triggers_one_transport_reset() {
        let (sent, transport) = capture();
        let mut guest = Comms::new(false, host_addr(), 0, 0, transport);
        let mut util = TestUtil::default();
        guest.start(&mut util);
        drop(sent);

        // Any inbound datagram counts as a sign of life.
        util.now = 10;
        guest.check_incoming(&[0xff], Some(&host_addr()), &mut util);

        util.now = 10 + u64::from(HB_INTERVAL) * 3;
        guest.heartbeat_timer_fired(&mut util);
        assert_eq!(util.resets, 1);

        // One-shot: no repeat until traffic resumes.
        util.now += u64::from(HB_INTERVAL);
        guest.heartbeat_timer_fired(&mut util);
        assert_eq!(util.resets, 1);
    }
}
