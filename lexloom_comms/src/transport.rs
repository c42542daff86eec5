// The seam between the comms engine and whatever moves bytes.
//
// One method: hand a fully framed datagram to the link. Implementations
// decide whether that means a socket write, a radio packet, or (in tests)
// pushing onto an in-process hub. Datagram boundaries must be preserved;
// the engine never reassembles.

use std::io;

use thiserror::Error;

use crate::address::CommsAddr;
use lexloom_protocol::wire::WireError;

#[derive(Debug, Error)]
pub enum CommsError {
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),
    #[error("transport send failed: {0}")]
    Transport(#[from] io::Error),
}

pub trait Transport {
    /// Send one datagram toward `dest`. Returns the byte count accepted,
    /// which must equal `buf.len()` for the send to count as delivered.
    fn send(&mut self, buf: &[u8], dest: &CommsAddr) -> io::Result<usize>;
}
