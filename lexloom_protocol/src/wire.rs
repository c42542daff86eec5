// Big-endian wire codec primitives.
//
// `WireWriter` and `WireReader` are the byte-level building blocks for every
// pinned binary format in this workspace: the generic message header, relay
// frames, and the comms/server persistence layouts. All multi-byte integers
// are big-endian. Strings are length-prefixed (u8), binary blobs u16.
//
// Application message bodies do NOT go through this module; they are JSON
// (see `message.rs`) carried as opaque bytes behind the binary header.

use thiserror::Error;

/// Errors from decoding pinned binary formats or JSON message bodies.
#[derive(Debug, Error)]
pub enum WireError {
    /// Input ended before a field could be read. Carries the byte offset
    /// where reading stopped.
    #[error("input truncated at byte {0}")]
    Truncated(usize),
    /// A string field held invalid UTF-8.
    #[error("string field is not valid utf-8")]
    BadString,
    /// An enum tag byte had no defined meaning.
    #[error("unknown {what} tag {tag}")]
    UnknownTag { what: &'static str, tag: u8 },
    /// A version byte named a format this build does not speak.
    #[error("unsupported {what} version {version}")]
    BadVersion { what: &'static str, version: u8 },
    /// A blob too large for its u16 length prefix.
    #[error("blob of {0} bytes exceeds the u16 length prefix")]
    BlobTooLong(usize),
    #[error("message body encode failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("message body decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Append-only big-endian byte sink.
#[derive(Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> WireWriter {
        WireWriter::default()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Raw bytes, no length prefix. The format must fix the length some
    /// other way (trailing field, or a count written earlier).
    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// u8-length-prefixed string. Longer strings are truncated at 255 bytes
    /// on a char boundary.
    pub fn put_str(&mut self, v: &str) {
        let mut end = v.len().min(255);
        while !v.is_char_boundary(end) {
            end -= 1;
        }
        #[expect(clippy::cast_possible_truncation)]
        self.buf.push(end as u8);
        self.buf.extend_from_slice(&v.as_bytes()[..end]);
    }

    /// u16-length-prefixed blob. A blob the prefix cannot describe is
    /// refused whole rather than written with a wrapped length.
    pub fn put_blob(&mut self, v: &[u8]) -> Result<(), WireError> {
        if v.len() > usize::from(u16::MAX) {
            return Err(WireError::BlobTooLong(v.len()));
        }
        #[expect(clippy::cast_possible_truncation)]
        self.put_u16(v.len() as u16);
        self.buf.extend_from_slice(v);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a byte slice, mirroring `WireWriter`.
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> WireReader<'a> {
        WireReader { buf, pos: 0 }
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        let [b] = *self.take(1)? else {
            return Err(WireError::Truncated(self.pos));
        };
        Ok(b)
    }

    pub fn u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Next `n` raw bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() - self.pos < n {
            return Err(WireError::Truncated(self.buf.len()));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// u8-length-prefixed string.
    pub fn str(&mut self) -> Result<String, WireError> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| WireError::BadString)
    }

    /// u16-length-prefixed blob.
    pub fn blob(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
