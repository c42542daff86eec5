// Transport addresses.
//
// `CommsAddr` is a tagged sum over every way a peer can be reached. The
// variant in use decides how incoming datagrams are matched to address
// records (see `channel.rs`) and which envelope outgoing datagrams get.

use lexloom_protocol::wire::{WireError, WireReader, WireWriter};

const TAG_NOTHING: u8 = 0;
const TAG_RELAY: u8 = 1;
const TAG_DIRECT_IP: u8 = 2;
const TAG_RADIO: u8 = 3;
const TAG_SMS: u8 = 4;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CommsAddr {
    /// No transport; a standalone game, or a record created before the
    /// peer's address was known.
    #[default]
    Nothing,
    /// Via a relay service. `room` is the name peers agree on out of band.
    Relay {
        host: String,
        port: u16,
        room: String,
    },
    /// Point-to-point socket.
    DirectIp { host: String, port: u16 },
    /// Short-range link addressed by hardware peer id.
    Radio { peer: String },
    /// Store-and-forward text messaging.
    Sms { phone: String, port: u16 },
}

impl CommsAddr {
    /// Whether two addresses name the same route, ignoring fields that can
    /// differ between legs of one connection (the relay room, for one).
    pub fn same_route(&self, other: &CommsAddr) -> bool {
        match (self, other) {
            (
                CommsAddr::Relay { host, port, .. },
                CommsAddr::Relay {
                    host: oh, port: op, ..
                },
            ) => host == oh && port == op,
            (
                CommsAddr::DirectIp { host, port },
                CommsAddr::DirectIp { host: oh, port: op },
            ) => host == oh && port == op,
            (CommsAddr::Radio { peer }, CommsAddr::Radio { peer: op }) => peer == op,
            (
                CommsAddr::Sms { phone, port },
                CommsAddr::Sms {
                    phone: op,
                    port: opt,
                },
            ) => phone == op && port == opt,
            _ => false,
        }
    }

    pub fn write(&self, w: &mut WireWriter) {
        match self {
            CommsAddr::Nothing => w.put_u8(TAG_NOTHING),
            CommsAddr::Relay { host, port, room } => {
                w.put_u8(TAG_RELAY);
                w.put_str(host);
                w.put_u16(*port);
                w.put_str(room);
            }
            CommsAddr::DirectIp { host, port } => {
                w.put_u8(TAG_DIRECT_IP);
                w.put_str(host);
                w.put_u16(*port);
            }
            CommsAddr::Radio { peer } => {
                w.put_u8(TAG_RADIO);
                w.put_str(peer);
            }
            CommsAddr::Sms { phone, port } => {
                w.put_u8(TAG_SMS);
                w.put_str(phone);
                w.put_u16(*port);
            }
        }
    }

    pub fn read(r: &mut WireReader) -> Result<CommsAddr, WireError> {
        let addr = match r.u8()? {
            TAG_NOTHING => CommsAddr::Nothing,
            TAG_RELAY => CommsAddr::Relay {
                host: r.str()?,
                port: r.u16()?,
                room: r.str()?,
            },
            TAG_DIRECT_IP => CommsAddr::DirectIp {
                host: r.str()?,
                port: r.u16()?,
            },
            TAG_RADIO => CommsAddr::Radio { peer: r.str()? },
            TAG_SMS => CommsAddr::Sms {
                phone: r.str()?,
                port: r.u16()?,
            },
            tag => {
                return Err(WireError::UnknownTag {
                    what: "address",
                    tag,
                });
            }
        };
        Ok(addr)
    }
}
