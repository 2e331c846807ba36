//! SLPv2 message header.
//!
//! Header layout (14 bytes + language tag):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |  Function-ID  |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Length, contd.|O|F|R|       reserved          |Next Ext Offset|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Next Extension Offset, contd.|              XID              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Language Tag Length      |         Language Tag          \
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::codec::{put_u24, MAX_U24};
use crate::error::{ErrorCode, ProtocolError};
use crate::SLP_VERSION;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

/// Size of the fixed header in bytes, excluding the language tag.
pub const HEADER_LEN: usize = 14;

/// Size of the error code that follows the header in every reply.
pub const ERROR_CODE_LEN: usize = 2;

/// Byte ranges of the fixed header fields.
pub mod field {
    use std::ops::Range;

    pub const VERSION: usize = 0;
    pub const FUNCTION: usize = 1;
    pub const LENGTH: Range<usize> = 2..5;
    pub const FLAGS: Range<usize> = 5..7;
    pub const NEXT_EXT: Range<usize> = 7..10;
    pub const XID: Range<usize> = 10..12;
    pub const LANG_LEN: Range<usize> = 12..14;
    pub const LANG: usize = 14;
}

/// SLP function identifiers understood by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum FunctionId {
    SrvRqst = 0x01,
    SrvRply = 0x02,
    AttrRqst = 0x06,
    AttrRply = 0x07,
    SrvTypeRqst = 0x09,
    SrvTypeRply = 0x0A,
    SaAdvert = 0x0B,
}

impl FunctionId {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the reply function for a request function.
    pub fn reply(self) -> Option<FunctionId> {
        match self {
            FunctionId::SrvRqst => Some(FunctionId::SrvRply),
            FunctionId::AttrRqst => Some(FunctionId::AttrRply),
            FunctionId::SrvTypeRqst => Some(FunctionId::SrvTypeRply),
            _ => None,
        }
    }

    /// Stable name used in logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            FunctionId::SrvRqst => "SRVRQST",
            FunctionId::SrvRply => "SRVRPLY",
            FunctionId::AttrRqst => "ATTRRQST",
            FunctionId::AttrRply => "ATTRRPLY",
            FunctionId::SrvTypeRqst => "SRVTYPERQST",
            FunctionId::SrvTypeRply => "SRVTYPERPLY",
            FunctionId::SaAdvert => "SAADVERT",
        }
    }
}

impl TryFrom<u8> for FunctionId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FunctionId::SrvRqst),
            0x02 => Ok(FunctionId::SrvRply),
            0x06 => Ok(FunctionId::AttrRqst),
            0x07 => Ok(FunctionId::AttrRply),
            0x09 => Ok(FunctionId::SrvTypeRqst),
            0x0A => Ok(FunctionId::SrvTypeRply),
            0x0B => Ok(FunctionId::SaAdvert),
            other => Err(ProtocolError::InvalidFunction(other)),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Function id placed in the reply to a message carrying `request`.
///
/// Request functions map to their reply function. Anything else (including
/// bytes outside the defined set) is echoed unchanged.
pub fn reply_function_id(request: u8) -> u8 {
    FunctionId::try_from(request)
        .ok()
        .and_then(FunctionId::reply)
        .map(FunctionId::as_u8)
        .unwrap_or(request)
}

/// Header flags bitfield. Only the top three bits are defined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderFlags(u16);

impl HeaderFlags {
    /// The reply did not fit in the datagram.
    pub const OVERFLOW: u16 = 1 << 15;
    /// Registration is new rather than an update.
    pub const FRESH: u16 = 1 << 14;
    /// Request was sent by multicast.
    pub const REQUEST_MCAST: u16 = 1 << 13;

    pub fn new() -> Self {
        Self(0)
    }

    /// Wraps raw bits. Reserved bits are kept so they can be echoed verbatim.
    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn is_overflow(&self) -> bool {
        self.0 & Self::OVERFLOW != 0
    }

    pub fn is_fresh(&self) -> bool {
        self.0 & Self::FRESH != 0
    }

    pub fn is_multicast(&self) -> bool {
        self.0 & Self::REQUEST_MCAST != 0
    }
}

/// A decoded SLP header.
///
/// `function_id` is kept as the raw byte so a header salvaged from a
/// malformed datagram can still be echoed into an error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub function_id: u8,
    /// Total message length (24 bits) as sent by the peer.
    pub length: u32,
    pub flags: HeaderFlags,
    /// Next extension offset (24 bits); carried but never followed.
    pub next_ext_offset: u32,
    pub xid: u16,
    pub language_tag: Bytes,
}

impl Header {
    /// Creates a header for an outgoing request.
    pub fn new(function: FunctionId, xid: u16, language_tag: &str) -> Self {
        Self {
            version: SLP_VERSION,
            function_id: function.as_u8(),
            length: 0,
            flags: HeaderFlags::new(),
            next_ext_offset: 0,
            xid,
            language_tag: Bytes::copy_from_slice(language_tag.as_bytes()),
        }
    }

    /// Decodes a header from the start of a datagram.
    ///
    /// Fails if the datagram is shorter than the fixed header, if the
    /// language tag runs past the end, or if the function id is not one of
    /// the defined functions.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::BufferTooShort {
                needed: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let tag_len = be_u16(buf, field::LANG_LEN) as usize;
        if field::LANG + tag_len > buf.len() {
            return Err(ProtocolError::LanguageTagOverrun {
                len: tag_len,
                available: buf.len() - field::LANG,
            });
        }

        let function_id = buf[field::FUNCTION];
        FunctionId::try_from(function_id)?;

        Ok(Self {
            version: buf[field::VERSION],
            function_id,
            length: be_u24(buf, field::LENGTH),
            flags: HeaderFlags::from_bits(be_u16(buf, field::FLAGS)),
            next_ext_offset: be_u24(buf, field::NEXT_EXT),
            xid: be_u16(buf, field::XID),
            language_tag: Bytes::copy_from_slice(&buf[field::LANG..field::LANG + tag_len]),
        })
    }

    /// Recovers whatever header fields a malformed datagram carries.
    ///
    /// Never fails: fields that are absent are zeroed, a missing version
    /// defaults to [`SLP_VERSION`] and an out-of-bounds language tag is
    /// dropped.
    pub fn salvage(buf: &[u8]) -> Self {
        let get_u16 = |range: Range<usize>| buf.get(range).map(|b| u16::from_be_bytes([b[0], b[1]]));
        let get_u24 =
            |range: Range<usize>| buf.get(range).map(|b| u32::from_be_bytes([0, b[0], b[1], b[2]]));

        let language_tag = get_u16(field::LANG_LEN)
            .map(|len| field::LANG + len as usize)
            .and_then(|end| buf.get(field::LANG..end))
            .map(Bytes::copy_from_slice)
            .unwrap_or_default();

        Self {
            version: buf.get(field::VERSION).copied().unwrap_or(SLP_VERSION),
            function_id: buf.get(field::FUNCTION).copied().unwrap_or(0),
            length: get_u24(field::LENGTH).unwrap_or(0),
            flags: HeaderFlags::from_bits(get_u16(field::FLAGS).unwrap_or(0)),
            next_ext_offset: get_u24(field::NEXT_EXT).unwrap_or(0),
            xid: get_u16(field::XID).unwrap_or(0),
            language_tag,
        }
    }

    /// Returns the decoded function, if the raw byte is a defined one.
    pub fn function(&self) -> Option<FunctionId> {
        FunctionId::try_from(self.function_id).ok()
    }

    pub fn language_tag_len(&self) -> usize {
        self.language_tag.len()
    }

    /// Language tag as text; invalid UTF-8 is replaced rather than rejected.
    pub fn language_tag_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.language_tag)
    }

    /// Offset of the first byte after the header and language tag.
    pub fn body_offset(&self) -> usize {
        HEADER_LEN + self.language_tag.len()
    }

    /// Writes the header with `function_id` and a zero length field.
    ///
    /// The length is patched by [`set_message_length`] once the message is complete.
    pub fn write(&self, buf: &mut BytesMut, function_id: u8) {
        buf.put_u8(self.version);
        buf.put_u8(function_id);
        put_u24(buf, 0);
        buf.put_u16(self.flags.bits());
        put_u24(buf, self.next_ext_offset);
        buf.put_u16(self.xid);
        // Language tags longer than u16 cannot be decoded, so this never truncates.
        buf.put_u16(self.language_tag.len() as u16);
        buf.put_slice(&self.language_tag);
    }

    /// Encodes the common prefix of every reply: the echoed header with the
    /// reply function id, followed by the error code.
    pub fn encode_reply_prefix(&self, error: Option<ErrorCode>) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.body_offset() + ERROR_CODE_LEN);
        self.write(&mut buf, reply_function_id(self.function_id));
        buf.put_u16(error.map(ErrorCode::as_u16).unwrap_or(0));
        buf
    }
}

/// Writes the total message length into the header's 24-bit length field.
pub fn set_message_length(buf: &mut [u8]) -> Result<(), ProtocolError> {
    let len = buf.len();
    if len > MAX_U24 {
        return Err(ProtocolError::FieldTooLong {
            field: "message",
            len,
            max: MAX_U24,
        });
    }
    buf[field::LENGTH].copy_from_slice(&(len as u32).to_be_bytes()[1..]);
    Ok(())
}

fn be_u16(buf: &[u8], range: Range<usize>) -> u16 {
    u16::from_be_bytes([buf[range.start], buf[range.start + 1]])
}

fn be_u24(buf: &[u8], range: Range<usize>) -> u32 {
    u32::from_be_bytes([0, buf[range.start], buf[range.start + 1], buf[range.start + 2]])
}
