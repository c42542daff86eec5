// Saving and restoring the turn machine.
//
// The persisted image carries the synchronization state a restarted device
// needs to rejoin its game: phase, whose turn it is, the device table,
// seat ownership, the tile pool, and any owed bad-word report. Everything
// rebuilt from the application on restore (model, dictionary, comms,
// engines, listeners) is passed back in rather than stored.
//
// A save taken while a between-turns report was due collapses to the state
// that would have followed it; the report itself is display-only.
//
// The layout is pinned and versioned with a leading format byte.

use lexloom_protocol::types::ChannelId;
use lexloom_protocol::wire::{WireError, WireReader, WireWriter};

use lexloom_comms::Comms;

use crate::config::GameConfig;
use crate::model::GameModel;
use crate::pool::TilePool;
use crate::server::{GameState, Server, UNKNOWN_DEVICE};
use crate::Dictionary;

const FORMAT_VERSION: u8 = 1;

/// Seat-to-device marker for a seat whose device has not registered.
const UNKNOWN_DEVICE_TAG: u8 = u8::MAX;

impl GameState {
    fn tag(self) -> u8 {
        match self {
            GameState::New => 0,
            GameState::Begin => 1,
            GameState::WaitingAllReg => 2,
            GameState::ReceivedAllReg => 3,
            GameState::NeedSendBadWordInfo => 4,
            GameState::MoveConfirmWait => 5,
            GameState::MoveConfirmMustSend => 6,
            GameState::NeedSendEndGame => 7,
            GameState::NeedShowScore => 8,
            GameState::InTurn => 9,
            GameState::GameOver => 10,
        }
    }

    fn from_tag(tag: u8) -> Result<GameState, WireError> {
        Ok(match tag {
            0 => GameState::New,
            1 => GameState::Begin,
            2 => GameState::WaitingAllReg,
            3 => GameState::ReceivedAllReg,
            4 => GameState::NeedSendBadWordInfo,
            5 => GameState::MoveConfirmWait,
            6 => GameState::MoveConfirmMustSend,
            7 => GameState::NeedSendEndGame,
            8 => GameState::NeedShowScore,
            9 => GameState::InTurn,
            10 => GameState::GameOver,
            _ => {
                return Err(WireError::UnknownTag {
                    what: "game state",
                    tag,
                });
            }
        })
    }
}

impl Server {
    pub fn save(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.put_u8(FORMAT_VERSION);

        // NeedShowScore is a display interlude; resume past it.
        let state = if self.state == GameState::NeedShowScore {
            self.state_after_show
        } else {
            self.state
        };
        w.put_u8(state.tag());

        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.turn.map_or(0, |turn| turn as u8 + 1));
        w.put_u8(self.pending_registrations);
        debug_assert!(self.last_move_device <= usize::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.last_move_device as u8);

        debug_assert!(self.devices.len() <= usize::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.devices.len() as u8);
        for channel in &self.devices {
            w.put_u16(channel.0);
        }

        debug_assert!(self.seat_device.len() <= usize::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.seat_device.len() as u8);
        for &device in &self.seat_device {
            #[expect(clippy::cast_possible_truncation)]
            w.put_u8(if device == UNKNOWN_DEVICE {
                UNKNOWN_DEVICE_TAG
            } else {
                device as u8
            });
        }

        match self.pool.as_ref() {
            Some(pool) => {
                w.put_u8(1);
                pool.write(&mut w);
            }
            None => w.put_u8(0),
        }

        // An owed rejection survives a restart.
        w.put_u8(self.bad_word_player);
        debug_assert!(self.bad_words.len() <= usize::from(u8::MAX));
        #[expect(clippy::cast_possible_truncation)]
        w.put_u8(self.bad_words.len() as u8);
        for word in &self.bad_words {
            w.put_str(word);
        }

        w.finish()
    }

    /// Rebuild a server around restored state. The caller supplies the
    /// same config, model, dictionary, and comms it would pass to `new`
    /// (each restored through its own persistence, where it has any).
    pub fn restore(
        bytes: &[u8],
        config: GameConfig,
        model: Box<dyn GameModel>,
        dict: Option<Box<dyn Dictionary>>,
        comms: Option<Comms>,
    ) -> Result<Server, WireError> {
        let mut r = WireReader::new(bytes);
        let version = r.u8()?;
        if version != FORMAT_VERSION {
            return Err(WireError::BadVersion {
                what: "server state",
                version,
            });
        }
        let state = GameState::from_tag(r.u8()?)?;
        let turn = match r.u8()? {
            0 => None,
            stored => Some(usize::from(stored - 1)),
        };
        let pending_registrations = r.u8()?;
        let last_move_device = usize::from(r.u8()?);

        let n_devices = r.u8()?;
        let mut devices = Vec::with_capacity(usize::from(n_devices));
        for _ in 0..n_devices {
            devices.push(ChannelId(r.u16()?));
        }
        if devices.is_empty() {
            devices.push(ChannelId::NONE);
        }

        let n_seats = r.u8()?;
        let mut seat_device = Vec::with_capacity(usize::from(n_seats));
        for _ in 0..n_seats {
            seat_device.push(match r.u8()? {
                UNKNOWN_DEVICE_TAG => UNKNOWN_DEVICE,
                device => usize::from(device),
            });
        }

        let pool = if r.u8()? != 0 {
            Some(TilePool::read(&mut r, u64::from(config.game_id))?)
        } else {
            None
        };

        let bad_word_player = r.u8()?;
        let n_words = r.u8()?;
        let mut bad_words = Vec::with_capacity(usize::from(n_words));
        for _ in 0..n_words {
            bad_words.push(r.str()?);
        }

        let mut server = Server::new(config, model, dict, comms);
        server.state = state;
        server.turn = turn;
        server.pending_registrations = pending_registrations;
        server.last_move_device = last_move_device;
        server.devices = devices;
        if !seat_device.is_empty() {
            server.seat_device = seat_device;
        }
        server.pool = pool;
        server.bad_word_player = bad_word_player;
        server.bad_words = bad_words;
        Ok(server)
    }
}
