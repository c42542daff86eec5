// Test-only harness for multi-device game tests.
//
// Builds real `Server` + `Comms` stacks for a host and its guests and wires
// them together through an in-process datagram hub, so the integration
// tests exercise the same code paths a deployed game uses: register ->
// setup -> moves/trades/undo -> end of game. The only test-specific code
// is the seams the application would normally fill: a flat board model
// (`TestModel`), a table dictionary (`WordListDict`), a first-tile robot,
// and a recording `TestUtil`. `TestRelay` plays the relay service for the
// routed-transport scenarios.
//
// `TestModel` state lives behind an `Rc` so a test can keep a handle across
// a save/restore cycle, standing in for the application restoring its own
// board state.
//
// See the files under `tests/` for the scenarios.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use lexloom_comms::{Comms, CommsAddr, CommsUtil, TimerKind, Transport, UserError};
use lexloom_protocol::message::{PhonyPolicy, PlacedTile, Placement};
use lexloom_protocol::relay::RelayFrame;
use lexloom_protocol::types::{CookieId, RelayHostId, Tile};
use lexloom_protocol::wire::{WireReader, WireWriter};
use lexloom_server::{
    Dictionary, GameConfig, GameModel, PlayerConfig, Role, RobotEngine, RobotSmartness, Server,
    ServerUtil, TilePool, TileSet, UndoneMove,
};

// ---------------------------------------------------------------------
// Dictionary
// ---------------------------------------------------------------------

/// Fixed-table dictionary: faces with counts and values, plus either an
/// explicit word list or accept-everything mode. Byte form survives the
/// host -> guest setup trip.
pub struct WordListDict {
    faces: Vec<(String, u8, u8)>,
    words: Vec<String>,
    accept_all: bool,
}

impl WordListDict {
    pub fn new(faces: &[(&str, u8, u8)], words: &[&str]) -> WordListDict {
        WordListDict {
            faces: faces
                .iter()
                .map(|(face, count, value)| (face.to_string(), *count, *value))
                .collect(),
            words: words.iter().map(|word| word.to_string()).collect(),
            accept_all: false,
        }
    }

    /// Every word passes the check. For tests of the legal-move paths that
    /// should not depend on what the random trays spell.
    pub fn accepting(faces: &[(&str, u8, u8)]) -> WordListDict {
        WordListDict {
            accept_all: true,
            ..WordListDict::new(faces, &[])
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<WordListDict> {
        let mut r = WireReader::new(bytes);
        let n_faces = r.u8().ok()?;
        let mut faces = Vec::with_capacity(usize::from(n_faces));
        for _ in 0..n_faces {
            let face = r.str().ok()?;
            let count = r.u8().ok()?;
            let value = r.u8().ok()?;
            faces.push((face, count, value));
        }
        let accept_all = r.u8().ok()? != 0;
        let n_words = r.u16().ok()?;
        let mut words = Vec::with_capacity(usize::from(n_words));
        for _ in 0..n_words {
            words.push(r.str().ok()?);
        }
        Some(WordListDict {
            faces,
            words,
            accept_all,
        })
    }
}

impl Dictionary for WordListDict {
    fn n_faces(&self) -> u8 {
        #[expect(clippy::cast_possible_truncation)]
        let n = self.faces.len() as u8;
        n
    }

    fn count_for(&self, tile: Tile) -> u8 {
        self.faces[usize::from(tile.0)].1
    }

    fn value_of(&self, tile: Tile) -> u8 {
        self.faces[usize::from(tile.0)].2
    }

    fn face(&self, tile: Tile) -> &str {
        &self.faces[usize::from(tile.0)].0
    }

    fn is_word(&self, word: &str) -> bool {
        self.accept_all || self.words.iter().any(|known| known == word)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.faces.len() as u8);
        for (face, count, value) in &self.faces {
            w.put_str(face);
            w.put_u8(*count);
            w.put_u8(*value);
        }
        w.put_u8(u8::from(self.accept_all));
        #[expect(clippy::cast_possible_truncation)]
        w.put_u16(self.words.len() as u16);
        for word in &self.words {
            w.put_str(word);
        }
        w.finish()
    }
}

/// 23 tiles: a three-player deal of 7 leaves 2 in the pool. No single
/// letter is a word.
pub fn standard_dict() -> WordListDict {
    WordListDict::new(
        &[("a", 9, 1), ("b", 5, 2), ("c", 5, 3), ("d", 4, 2)],
        &["ab", "ba", "aa", "abc"],
    )
}

// ---------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------

enum Recorded {
    Place { placement: Placement, drawn: TileSet },
    Trade { traded: TileSet, drawn: TileSet },
}

struct HistoryEntry {
    turn: u8,
    move_num: u16,
    what: Recorded,
}

struct ModelInner {
    trays: Vec<TileSet>,
    pending: Vec<Placement>,
    scores: Vec<i32>,
    history: Vec<HistoryEntry>,
    next_move_num: u16,
    consecutive_passes: usize,
    pass_limit: usize,
}

/// Flat stand-in for the board: trays, scores, and an undoable history.
/// One point per tile placed. Clones share state, so a handle kept by the
/// test survives a `Server` save/restore cycle.
#[derive(Clone)]
pub struct TestModel {
    inner: Rc<RefCell<ModelInner>>,
}

impl Default for TestModel {
    fn default() -> TestModel {
        TestModel::new()
    }
}

impl TestModel {
    pub fn new() -> TestModel {
        TestModel {
            inner: Rc::new(RefCell::new(ModelInner {
                trays: Vec::new(),
                pending: Vec::new(),
                scores: Vec::new(),
                history: Vec::new(),
                next_move_num: 0,
                consecutive_passes: 0,
                pass_limit: usize::MAX,
            })),
        }
    }

    pub fn boxed(&self) -> Box<TestModel> {
        Box::new(self.clone())
    }

    pub fn set_pass_limit(&self, limit: usize) {
        self.inner.borrow_mut().pass_limit = limit;
    }
}

impl ModelInner {
    fn word_of(&self, placement: &Placement, dict: &dyn Dictionary) -> String {
        placement
            .tiles
            .iter()
            .map(|placed| dict.face(placed.tile))
            .collect()
    }

    fn remove_from_tray(&mut self, player: usize, tiles: &[Tile]) {
        for tile in tiles {
            if let Some(pos) = self.trays[player].iter().position(|held| held == tile) {
                self.trays[player].remove(pos);
            }
        }
    }

    fn grow_to(&mut self, n_players: usize) {
        self.trays.resize_with(n_players, TileSet::new);
        self.pending.resize_with(n_players, Placement::default);
        self.scores.resize(n_players, 0);
    }
}

impl GameModel for TestModel {
    fn set_num_players(&mut self, n_players: usize) {
        self.inner.borrow_mut().grow_to(n_players);
    }

    fn init_board(&mut self, _size: u8) {}

    fn assign_tray(&mut self, player: usize, tiles: &[Tile]) {
        let mut inner = self.inner.borrow_mut();
        if inner.trays.len() <= player {
            inner.grow_to(player + 1);
        }
        inner.trays[player] = TileSet::from_slice(tiles);
    }

    fn tray(&self, player: usize) -> TileSet {
        self.inner.borrow().trays[player].clone()
    }

    fn total_tile_count(&self, player: usize) -> u16 {
        let inner = self.inner.borrow();
        (inner.trays[player].len() + inner.pending[player].tiles.len()) as u16
    }

    fn score(&self, player: usize) -> i32 {
        self.inner.borrow().scores[player]
    }

    fn stage_move(&mut self, player: usize, placement: &Placement) {
        self.clear_pending(player);
        let mut inner = self.inner.borrow_mut();
        let tiles: Vec<Tile> = placement.tiles.iter().map(|placed| placed.tile).collect();
        inner.remove_from_tray(player, &tiles);
        inner.pending[player] = placement.clone();
    }

    fn clear_pending(&mut self, player: usize) {
        let mut inner = self.inner.borrow_mut();
        let placement = std::mem::take(&mut inner.pending[player]);
        for placed in &placement.tiles {
            inner.trays[player].push(placed.tile);
        }
    }

    fn pending_tile_count(&self, player: usize) -> u16 {
        self.inner.borrow().pending[player].tiles.len() as u16
    }

    fn pending_placement(&self, player: usize) -> Placement {
        self.inner.borrow().pending[player].clone()
    }

    fn check_pending_words(&self, player: usize, dict: &dyn Dictionary) -> Vec<String> {
        let inner = self.inner.borrow();
        let word = inner.word_of(&inner.pending[player], dict);
        if word.is_empty() || dict.is_word(&word) {
            Vec::new()
        } else {
            vec![word]
        }
    }

    fn pending_move_report(&self, player: usize, dict: &dyn Dictionary) -> String {
        let inner = self.inner.borrow();
        let word = inner.word_of(&inner.pending[player], dict);
        if word.is_empty() {
            "passed".to_string()
        } else {
            format!("played {word}")
        }
    }

    fn commit_turn(&mut self, player: usize, new_tiles: &[Tile]) {
        let mut inner = self.inner.borrow_mut();
        let placement = std::mem::take(&mut inner.pending[player]);
        if placement.is_pass() {
            inner.consecutive_passes += 1;
        } else {
            inner.consecutive_passes = 0;
        }
        inner.scores[player] += placement.tiles.len() as i32;
        inner.trays[player].extend_from_slice(new_tiles);
        let move_num = inner.next_move_num;
        inner.history.push(HistoryEntry {
            turn: player as u8,
            move_num,
            what: Recorded::Place {
                placement,
                drawn: TileSet::from_slice(new_tiles),
            },
        });
        inner.next_move_num += 1;
    }

    fn trade_tiles(&mut self, player: usize, traded: &[Tile], new_tiles: &[Tile]) {
        let mut inner = self.inner.borrow_mut();
        inner.remove_from_tray(player, traded);
        inner.trays[player].extend_from_slice(new_tiles);
        inner.consecutive_passes = 0;
        let move_num = inner.next_move_num;
        inner.history.push(HistoryEntry {
            turn: player as u8,
            move_num,
            what: Recorded::Trade {
                traded: TileSet::from_slice(traded),
                drawn: TileSet::from_slice(new_tiles),
            },
        });
        inner.next_move_num += 1;
    }

    fn undo_latest(&mut self, pool: &mut TilePool) -> Option<UndoneMove> {
        let mut inner = self.inner.borrow_mut();
        let entry = inner.history.pop()?;
        let player = usize::from(entry.turn);
        match entry.what {
            Recorded::Place { placement, drawn } => {
                inner.remove_from_tray(player, &drawn);
                pool.replace_tiles(&drawn);
                for placed in &placement.tiles {
                    inner.trays[player].push(placed.tile);
                }
                inner.scores[player] -= placement.tiles.len() as i32;
            }
            Recorded::Trade { traded, drawn } => {
                inner.remove_from_tray(player, &drawn);
                pool.replace_tiles(&drawn);
                pool.remove_tiles(&traded);
                inner.trays[player].extend_from_slice(&traded);
            }
        }
        Some(UndoneMove {
            turn: entry.turn,
            move_num: entry.move_num,
        })
    }

    fn reject_last_move(&mut self, pool: &mut TilePool) -> Option<u8> {
        let undone = self.undo_latest(pool)?;
        let mut inner = self.inner.borrow_mut();
        // Re-record as a scoreless turn.
        let move_num = inner.next_move_num;
        inner.history.push(HistoryEntry {
            turn: undone.turn,
            move_num,
            what: Recorded::Place {
                placement: Placement::default(),
                drawn: TileSet::new(),
            },
        });
        inner.next_move_num += 1;
        Some(undone.turn)
    }

    fn pass_count_ok(&self) -> bool {
        let inner = self.inner.borrow();
        inner.consecutive_passes < inner.pass_limit
    }
}

// ---------------------------------------------------------------------
// Engine and util
// ---------------------------------------------------------------------

/// Robot that plays the first tile in its tray, anywhere.
pub struct FirstTileEngine;

impl RobotEngine for FirstTileEngine {
    fn find_move(
        &mut self,
        model: &dyn GameModel,
        _dict: &dyn Dictionary,
        player: usize,
        _target_score: i32,
    ) -> Option<Placement> {
        model.tray(player).first().map(|tile| placement_of(&[*tile]))
    }

    fn reset(&mut self) {}
}

/// Records every callback for the tests to inspect.
#[derive(Default)]
pub struct TestUtil {
    pub errors: Vec<UserError>,
    pub warned: Vec<(Vec<String>, u8)>,
    pub reports: Vec<(u8, String)>,
    pub timers: Vec<(TimerKind, u32)>,
    pub resets: usize,
    pub now: u64,
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

impl ServerUtil for TestUtil {
    fn make_dictionary(&mut self, bytes: &[u8]) -> Option<Box<dyn Dictionary>> {
        WordListDict::from_bytes(bytes).map(|dict| Box::new(dict) as Box<dyn Dictionary>)
    }

    fn make_robot_engine(&mut self, _player: usize) -> Box<dyn RobotEngine> {
        Box::new(FirstTileEngine)
    }

    fn warn_illegal_word(&mut self, words: &[String], player: u8, _turn_lost: bool) {
        self.warned.push((words.to_vec(), player));
    }

    fn show_move_report(&mut self, player: u8, report: &str) {
        self.reports.push((player, report.to_string()));
    }
}

// ---------------------------------------------------------------------
// The datagram hub
// ---------------------------------------------------------------------

pub type Outbox = Rc<RefCell<Vec<(CommsAddr, Vec<u8>)>>>;

struct HubTransport {
    outbox: Outbox,
}

impl Transport for HubTransport {
    fn send(&mut self, buf: &[u8], dest: &CommsAddr) -> io::Result<usize> {
        self.outbox.borrow_mut().push((dest.clone(), buf.to_vec()));
        Ok(buf.len())
    }
}

/// A fresh transport writing into `outbox`, for hand-built devices (the
/// save/restore tests).
pub fn hub_transport(outbox: &Outbox) -> Box<dyn Transport> {
    Box::new(HubTransport {
        outbox: outbox.clone(),
    })
}

pub fn device_addr(n: u16) -> CommsAddr {
    CommsAddr::DirectIp {
        host: format!("10.0.0.{n}"),
        port: 4000 + n,
    }
}

/// One device in a game: a real server and comms stack plus its mailbox.
pub struct TestDevice {
    pub server: Server,
    pub util: TestUtil,
    pub addr: CommsAddr,
    pub outbox: Outbox,
    /// Handle into the same state the server's model sees.
    pub model: TestModel,
}

impl TestDevice {
    /// `comms_dest` is the default peer: the host's address on a guest,
    /// anything route-compatible on the host (real destinations come from
    /// the channel records).
    pub fn new(
        config: GameConfig,
        dict: Option<WordListDict>,
        own: CommsAddr,
        comms_dest: CommsAddr,
    ) -> TestDevice {
        let outbox: Outbox = Rc::new(RefCell::new(Vec::new()));
        let transport = Box::new(HubTransport {
            outbox: outbox.clone(),
        });
        let comms = Comms::new(config.role == Role::Host, comms_dest, 0, 0, transport);
        let model = TestModel::new();
        let server = Server::new(
            config,
            model.boxed(),
            dict.map(|dict| Box::new(dict) as Box<dyn Dictionary>),
            Some(comms),
        );
        TestDevice {
            server,
            util: TestUtil::default(),
            addr: own,
            outbox,
            model,
        }
    }

    /// Push one raw datagram through comms validation into the server.
    pub fn deliver(&mut self, raw: &[u8], from: &CommsAddr) -> bool {
        let msg = match self.server.comms_mut() {
            Some(comms) => comms.check_incoming(raw, Some(from), &mut self.util),
            None => None,
        };
        match msg {
            Some(msg) => self.server.receive_message(&msg, &mut self.util),
            None => false,
        }
    }

    /// Stage the current player's first `n` tray tiles and commit.
    pub fn play_tiles(&mut self, n: usize) -> bool {
        let turn = self.server.current_turn().expect("no current turn");
        let tiles: Vec<Tile> = self
            .server
            .model()
            .tray(turn)
            .iter()
            .take(n)
            .copied()
            .collect();
        let placement = placement_of(&tiles);
        self.server.model_mut().stage_move(turn, &placement);
        self.server.commit_move(&mut self.util)
    }

    pub fn pass(&mut self) -> bool {
        self.server.commit_move(&mut self.util)
    }

    pub fn trade_tiles(&mut self, n: usize) -> bool {
        let turn = self.server.current_turn().expect("no current turn");
        let traded: Vec<Tile> = self
            .server
            .model()
            .tray(turn)
            .iter()
            .take(n)
            .copied()
            .collect();
        self.server.commit_trade(&traded, &mut self.util)
    }
}

pub fn placement_of(tiles: &[Tile]) -> Placement {
    Placement {
        tiles: tiles
            .iter()
            .map(|tile| PlacedTile {
                row: 0,
                col: 0,
                tile: *tile,
                is_blank: false,
            })
            .collect(),
    }
}

/// Shuttle datagrams between devices until everything settles.
pub fn pump(devices: &mut [&mut TestDevice]) {
    for _ in 0..64 {
        let mut moved = false;
        for i in 0..devices.len() {
            let batch: Vec<(CommsAddr, Vec<u8>)> =
                devices[i].outbox.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                continue;
            }
            moved = true;
            let from = devices[i].addr.clone();
            for (dest, bytes) in batch {
                if let Some(j) = (0..devices.len()).find(|&j| devices[j].addr == dest) {
                    devices[j].deliver(&bytes, &from);
                }
            }
        }
        if !moved {
            return;
        }
    }
    panic!("traffic did not settle within the iteration cap");
}

// ---------------------------------------------------------------------
// The relay coordinator
// ---------------------------------------------------------------------

/// In-process stand-in for the relay service: seats devices in connect
/// order (the game host connects first and takes seat 1), holds the join
/// barrier until every expected player is present, and forwards routed
/// frames by destination seat.
pub struct TestRelay {
    addr: CommsAddr,
    room: String,
    cookie: CookieId,
    /// Device index (position in the pumped slice) per seat, seat n at
    /// entry n-1.
    seats: Vec<usize>,
    players_present: u8,
    players_total: u8,
    all_connected_sent: bool,
}

impl TestRelay {
    pub fn new(addr: CommsAddr) -> TestRelay {
        let room = match &addr {
            CommsAddr::Relay { room, .. } => room.clone(),
            _ => String::new(),
        };
        TestRelay {
            addr,
            room,
            cookie: CookieId(7),
            seats: Vec::new(),
            players_present: 0,
            players_total: u8::MAX,
            all_connected_sent: false,
        }
    }

    pub fn addr(&self) -> &CommsAddr {
        &self.addr
    }

    /// Process one frame from device `from`, returning the frames to hand
    /// out in response as (device index, bytes).
    fn handle(&mut self, from: usize, raw: &[u8]) -> Vec<(usize, Vec<u8>)> {
        let frame = match RelayFrame::decode(raw) {
            Ok(frame) => frame,
            Err(_) => return Vec::new(),
        };
        match frame {
            RelayFrame::Connect {
                players_here,
                players_total,
                ..
            } => {
                let seat_idx = match self.seats.iter().position(|device| *device == from) {
                    Some(idx) => idx,
                    None => {
                        self.seats.push(from);
                        self.players_present += players_here;
                        self.players_total = players_total;
                        self.seats.len() - 1
                    }
                };
                #[expect(clippy::cast_possible_truncation)]
                let seat = RelayHostId(seat_idx as u8 + 1);
                let mut out = vec![(
                    from,
                    RelayFrame::ConnectResp {
                        heartbeat_secs: 0,
                        cookie_id: self.cookie,
                        host_id: seat,
                    }
                    .encode(),
                )];
                if self.players_present >= self.players_total && !self.all_connected_sent {
                    self.all_connected_sent = true;
                    let conn_name = format!("{}-1", self.room);
                    for &device in &self.seats {
                        out.push((
                            device,
                            RelayFrame::AllConnected {
                                conn_name: Some(conn_name.clone()),
                            }
                            .encode(),
                        ));
                    }
                }
                out
            }
            RelayFrame::Routed { dest, .. } => {
                let Some(seat_idx) = usize::from(dest.0).checked_sub(1) else {
                    return Vec::new();
                };
                match self.seats.get(seat_idx) {
                    Some(&device) => vec![(device, raw.to_vec())],
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Shuttle frames through the relay until everything settles. Keep the
/// device order stable across calls: the relay remembers seats by slice
/// position.
pub fn pump_relay(relay: &mut TestRelay, devices: &mut [&mut TestDevice]) {
    for _ in 0..64 {
        let mut moved = false;
        for i in 0..devices.len() {
            let batch: Vec<(CommsAddr, Vec<u8>)> =
                devices[i].outbox.borrow_mut().drain(..).collect();
            if batch.is_empty() {
                continue;
            }
            moved = true;
            for (_dest, bytes) in batch {
                let from = relay.addr.clone();
                for (target, frame) in relay.handle(i, &bytes) {
                    devices[target].deliver(&frame, &from);
                }
            }
        }
        if !moved {
            return;
        }
    }
    panic!("relay traffic did not settle within the iteration cap");
}

// ---------------------------------------------------------------------
// Configs
// ---------------------------------------------------------------------

pub fn base_config(role: Role, players: Vec<PlayerConfig>) -> GameConfig {
    GameConfig {
        game_id: 0x1ace,
        role,
        players,
        board_size: 15,
        tray_size: 7,
        phony_policy: PhonyPolicy::Ignore,
        timer_enabled: false,
        game_seconds: 0,
        penalty_per_minute: 0,
        robot_smartness: RobotSmartness::Smart,
        show_move_reports: false,
        #[cfg(feature = "slow-robot")]
        robot_think_min_secs: 0,
        #[cfg(feature = "slow-robot")]
        robot_think_max_secs: 0,
    }
}

/// Host seating: the given local players first, then `n_remote` open seats.
pub fn host_config(local: Vec<PlayerConfig>, n_remote: usize) -> GameConfig {
    let mut players = local;
    players.extend((0..n_remote).map(|_| PlayerConfig::remote()));
    base_config(Role::Host, players)
}

pub fn guest_config(name: &str) -> GameConfig {
    base_config(Role::Guest, vec![PlayerConfig::human(name)])
}
