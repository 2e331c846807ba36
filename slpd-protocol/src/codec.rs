//! Bounds-checked field reader and writer helpers shared by the message codecs.
//!
//! All multi-byte integers on the wire are big-endian. Every read is checked
//! against the end of the datagram before any byte is touched.

use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};

/// Largest value representable in a 24-bit length field.
pub const MAX_U24: usize = 0x00FF_FFFF;

/// Size of a string length prefix.
pub const STRING_LEN_SIZE: usize = 2;

/// Cursor over a received datagram.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader positioned at `pos`.
    pub fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ProtocolError::FieldOverrun {
                field,
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            })?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.take(field, 1)?[0])
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, ProtocolError> {
        let b = self.take(field, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        let b = self.take(field, 3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_bytes(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(field, len)
    }

    /// Reads a `<length><bytes>` field without interpreting the content.
    ///
    /// The length prefix and the content are checked separately so a
    /// truncated datagram is reported against the field it cut through.
    pub fn read_opaque(&mut self, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_u16(field)? as usize;
        self.take(field, len)
    }

    /// Reads a `<length><bytes>` field that must be UTF-8.
    pub fn read_string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let bytes = self.read_opaque(field)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8 { field })
    }
}

/// Writes the low 24 bits of `value` big-endian.
pub fn put_u24(buf: &mut BytesMut, value: u32) {
    buf.put_slice(&value.to_be_bytes()[1..]);
}

/// Writes a `<length><bytes>` field, rejecting content that does not fit a u16 length.
pub fn put_opaque(buf: &mut BytesMut, field: &'static str, value: &[u8]) -> Result<(), ProtocolError> {
    let len = checked_u16_len(field, value.len())?;
    buf.put_u16(len);
    buf.put_slice(value);
    Ok(())
}

pub fn put_string(buf: &mut BytesMut, field: &'static str, value: &str) -> Result<(), ProtocolError> {
    put_opaque(buf, field, value.as_bytes())
}

pub fn checked_u16_len(field: &'static str, len: usize) -> Result<u16, ProtocolError> {
    u16::try_from(len).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len,
        max: u16::MAX as usize,
    })
}
