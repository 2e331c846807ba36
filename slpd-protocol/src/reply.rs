//! Reply construction and decoding.
//!
//! Every reply starts with the request header echoed back (see
//! [`Header::encode_reply_prefix`]) followed by a 2-byte error code. The
//! total length is patched into the header once the body is complete.
//!
//! Service Type Reply body:
//!
//! ```text
//! +-------------------+-------------------+------------------------------+
//! | error code (2)    | list length (2)   | service type list            |
//! +-------------------+-------------------+------------------------------+
//! ```
//!
//! Service Reply body:
//!
//! ```text
//! +-------------------+-------------------+------------------------------+
//! | error code (2)    | URL count (2)     | URL entries ...              |
//! +-------------------+-------------------+------------------------------+
//!
//! URL entry:
//! +--------------+--------------+--------------+---------+---------------+
//! | reserved (1) | lifetime (2) | URL len (2)  | URL     | # auths (1)   |
//! +--------------+--------------+--------------+---------+---------------+
//! ```

use crate::codec::{checked_u16_len, put_string, Reader};
use crate::error::{ErrorCode, ProtocolError};
use crate::header::{set_message_length, FunctionId, Header};
use crate::service::ServiceTable;
use crate::URL_LIFETIME_SECS;
use bytes::{BufMut, BytesMut};
use std::net::Ipv4Addr;

/// Builds an error reply: the echoed header followed by `code`.
///
/// Deterministic: the same header and code always give the same bytes.
pub fn error_reply(header: &Header, code: ErrorCode) -> BytesMut {
    let mut buf = header.encode_reply_prefix(Some(code));
    // A language tag is at most u16::MAX bytes, so the prefix always fits
    // the 24-bit length field.
    let patched = set_message_length(&mut buf);
    debug_assert!(patched.is_ok(), "error reply exceeds 24-bit length");
    buf
}

/// Builds a Service Type Reply listing every key in `table`.
pub fn service_type_reply(header: &Header, table: &ServiceTable) -> Result<BytesMut, ProtocolError> {
    if table.is_empty() {
        return Err(ProtocolError::NoServices);
    }

    let list = table.service_type_list();
    let mut buf = header.encode_reply_prefix(None);
    buf.reserve(2 + list.len());
    put_string(&mut buf, "service type list", &list)?;
    set_message_length(&mut buf)?;
    Ok(buf)
}

/// Builds a Service Reply with one URL entry per local address.
///
/// `service_type` is matched byte for byte against the table keys, so a
/// type that is not valid UTF-8 is simply unknown.
pub fn service_reply(
    header: &Header,
    service_type: impl AsRef<[u8]>,
    table: &ServiceTable,
    addresses: &[Ipv4Addr],
) -> Result<BytesMut, ProtocolError> {
    if table.is_empty() {
        return Err(ProtocolError::NoServices);
    }
    let service_type = service_type.as_ref();
    let entry = table.get_bytes(service_type).ok_or_else(|| {
        ProtocolError::UnknownServiceType(String::from_utf8_lossy(service_type).into_owned())
    })?;
    if addresses.is_empty() {
        return Err(ProtocolError::NoLocalAddresses);
    }

    let mut buf = header.encode_reply_prefix(None);
    buf.put_u16(checked_u16_len("URL count", addresses.len())?);
    for addr in addresses {
        UrlEntry::new(entry.url(*addr)).encode(&mut buf)?;
    }
    set_message_length(&mut buf)?;
    Ok(buf)
}

/// A URL entry as carried in a Service Reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    /// Seconds the URL may be cached.
    pub lifetime: u16,
    pub url: String,
}

impl UrlEntry {
    /// Creates an entry with the standard lifetime.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            lifetime: URL_LIFETIME_SECS,
            url: url.into(),
        }
    }

    /// Appends this entry. Authentication blocks are never emitted.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let url_len = checked_u16_len("URL", self.url.len())?;
        buf.reserve(6 + self.url.len());
        buf.put_u8(0);
        buf.put_u16(self.lifetime);
        buf.put_u16(url_len);
        buf.put_slice(self.url.as_bytes());
        buf.put_u8(0);
        Ok(())
    }

    /// Reads one entry, skipping any authentication blocks that follow the URL.
    pub fn decode(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        reader.read_u8("URL entry reserved")?;
        let lifetime = reader.read_u16("URL lifetime")?;
        let url = reader.read_string("URL")?;
        let auth_blocks = reader.read_u8("URL auth count")?;
        for _ in 0..auth_blocks {
            reader.read_u16("auth block descriptor")?;
            // Block length includes the descriptor and the length itself.
            let len = reader.read_u16("auth block length")? as usize;
            reader.read_bytes("auth block", len.saturating_sub(4))?;
        }
        Ok(Self { lifetime, url })
    }
}

/// Decoded Service Type Reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTypeReply {
    pub header: Header,
    pub service_types: Vec<String>,
}

impl ServiceTypeReply {
    /// Decodes a Service Type Reply. A non-zero error code is returned as
    /// [`ProtocolError::ErrorReply`].
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let (header, mut reader) = open_reply(buf, FunctionId::SrvTypeRply)?;
        let list = reader.read_string("service type list")?;
        let service_types = if list.is_empty() {
            Vec::new()
        } else {
            list.split(',').map(str::to_owned).collect()
        };
        Ok(Self {
            header,
            service_types,
        })
    }
}

/// Decoded Service Reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReply {
    pub header: Header,
    pub urls: Vec<UrlEntry>,
}

impl ServiceReply {
    /// Decodes a Service Reply. A non-zero error code is returned as
    /// [`ProtocolError::ErrorReply`].
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let (header, mut reader) = open_reply(buf, FunctionId::SrvRply)?;
        let count = reader.read_u16("URL count")?;
        let mut urls = Vec::with_capacity(count as usize);
        for _ in 0..count {
            urls.push(UrlEntry::decode(&mut reader)?);
        }
        Ok(Self { header, urls })
    }
}

/// Reads the error code of any reply. Returns `None` for success.
pub fn decode_error_code(buf: &[u8]) -> Result<Option<ErrorCode>, ProtocolError> {
    let header = Header::decode(buf)?;
    let code = Reader::new(buf, header.body_offset()).read_u16("error code")?;
    to_error_code(code)
}

fn to_error_code(code: u16) -> Result<Option<ErrorCode>, ProtocolError> {
    if code == 0 {
        return Ok(None);
    }
    ErrorCode::from_u16(code)
        .map(Some)
        .ok_or(ProtocolError::UnknownErrorCode(code))
}

fn open_reply(buf: &[u8], expected: FunctionId) -> Result<(Header, Reader<'_>), ProtocolError> {
    let header = Header::decode(buf)?;
    if header.function_id != expected.as_u8() {
        return Err(ProtocolError::UnexpectedFunction {
            expected,
            actual: header.function_id,
        });
    }

    let mut reader = Reader::new(buf, header.body_offset());
    if let Some(code) = to_error_code(reader.read_u16("error code")?)? {
        return Err(ProtocolError::ErrorReply(code));
    }
    Ok((header, reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ServiceRequest, ServiceTypeRequest};
    use crate::service::ServiceEntry;

    fn request_header(function: FunctionId) -> Header {
        let mut header = Header::new(function, 0x74e2, "en");
        header.flags = crate::HeaderFlags::from_bits(0x2000);
        header
    }

    fn table() -> ServiceTable {
        vec![
            ServiceEntry::new("obmc_console", "tcp", 80),
            ServiceEntry::new("ssh", "tcp", 22),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_error_reply_length_and_code() {
        let header = request_header(FunctionId::SrvRqst);
        let reply = error_reply(&header, ErrorCode::InternalError);

        assert_eq!(reply.len(), 14 + 2 + 2);
        assert_eq!(reply[1], FunctionId::SrvRply.as_u8());
        assert_eq!(&reply[2..5], &[0, 0, 18]);
        assert_eq!(&reply[16..18], &[0x00, 0x0A]);
        assert_eq!(
            decode_error_code(&reply).unwrap(),
            Some(ErrorCode::InternalError)
        );
    }

    #[test]
    fn test_error_reply_idempotent() {
        let header = request_header(FunctionId::SrvTypeRqst);
        let a = error_reply(&header, ErrorCode::ParseError);
        let b = error_reply(&header, ErrorCode::ParseError);
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_reply_with_longest_language_tag() {
        let tag = "x".repeat(u16::MAX as usize);
        let header = Header::new(FunctionId::SrvRqst, 7, &tag);
        let reply = error_reply(&header, ErrorCode::ParseError);

        assert_eq!(reply.len(), 14 + tag.len() + 2);
        let len = u32::from_be_bytes([0, reply[2], reply[3], reply[4]]) as usize;
        assert_eq!(len, reply.len());
        assert_eq!(decode_error_code(&reply).unwrap(), Some(ErrorCode::ParseError));
    }

    #[test]
    fn test_error_reply_for_invalid_function() {
        let mut raw = vec![0x02, 0x99, 0, 0, 20, 0, 0, 0, 0, 0, 0x12, 0x34, 0, 2];
        raw.extend_from_slice(b"en");
        raw.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        assert!(Header::decode(&raw).is_err());

        let header = Header::salvage(&raw);
        let reply = error_reply(&header, ErrorCode::ParseError);
        assert_eq!(reply.len(), 14 + 2 + 2);
        assert_eq!(reply[0], 0x02);
        assert_eq!(reply[1], 0x99);
        assert_eq!(&reply[10..12], &[0x12, 0x34]);
    }

    #[test]
    fn test_service_type_reply_layout() {
        let header = request_header(FunctionId::SrvTypeRqst);
        let reply = service_type_reply(&header, &table()).unwrap();

        let list = b"service:obmc_console,service:ssh";
        assert_eq!(reply.len(), 14 + 2 + 2 + 2 + list.len());
        assert_eq!(reply[1], FunctionId::SrvTypeRply.as_u8());
        assert_eq!(&reply[16..18], &[0, 0]);
        assert_eq!(&reply[18..20], &(list.len() as u16).to_be_bytes());
        assert_eq!(&reply[20..], list);

        let decoded = ServiceTypeReply::decode(&reply).unwrap();
        assert_eq!(decoded.header.xid, 0x74e2);
        assert_eq!(
            decoded.service_types,
            vec!["service:obmc_console", "service:ssh"]
        );
    }

    #[test]
    fn test_service_type_reply_empty_table() {
        let header = request_header(FunctionId::SrvTypeRqst);
        let err = service_type_reply(&header, &ServiceTable::new()).unwrap_err();
        assert_eq!(err, ProtocolError::NoServices);
        assert_eq!(err.error_code(), ErrorCode::InternalError);
    }

    #[test]
    fn test_service_reply_single_address() {
        let header = request_header(FunctionId::SrvRqst);
        let reply = service_reply(
            &header,
            "service:obmc_console",
            &table(),
            &[Ipv4Addr::new(10, 0, 0, 5)],
        )
        .unwrap();

        let url = b"service:obmc_console:tcp//10.0.0.5,80";
        assert_eq!(reply.len(), 16 + 2 + 2 + 1 + 2 + 2 + url.len() + 1);
        assert_eq!(reply[1], FunctionId::SrvRply.as_u8());
        assert_eq!(&reply[18..20], &[0, 1]);
        assert_eq!(reply[20], 0);
        assert_eq!(&reply[21..23], &[0, 5]);
        assert_eq!(&reply[23..25], &(url.len() as u16).to_be_bytes());
        assert_eq!(&reply[25..25 + url.len()], url);
        assert_eq!(reply[reply.len() - 1], 0);

        let decoded = ServiceReply::decode(&reply).unwrap();
        assert_eq!(decoded.urls.len(), 1);
        assert_eq!(decoded.urls[0].lifetime, URL_LIFETIME_SECS);
        assert_eq!(decoded.urls[0].url, "service:obmc_console:tcp//10.0.0.5,80");
    }

    #[test]
    fn test_service_reply_one_entry_per_address() {
        let header = request_header(FunctionId::SrvRqst);
        let addrs = [Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(192, 168, 1, 20)];
        let reply = service_reply(&header, "service:ssh", &table(), &addrs).unwrap();

        let decoded = ServiceReply::decode(&reply).unwrap();
        let urls: Vec<_> = decoded.urls.iter().map(|u| u.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["service:ssh:tcp//10.0.0.5,22", "service:ssh:tcp//192.168.1.20,22"]
        );
    }

    #[test]
    fn test_service_reply_failures() {
        let header = request_header(FunctionId::SrvRqst);
        let addrs = [Ipv4Addr::new(10, 0, 0, 5)];

        assert_eq!(
            service_reply(&header, "service:ssh", &ServiceTable::new(), &addrs),
            Err(ProtocolError::NoServices)
        );
        assert_eq!(
            service_reply(&header, "service:printer", &table(), &addrs),
            Err(ProtocolError::UnknownServiceType("service:printer".into()))
        );
        // Bare names are not keys
        assert!(service_reply(&header, "ssh", &table(), &addrs).is_err());
        assert_eq!(
            service_reply(&header, b"service:\xe9", &table(), &addrs),
            Err(ProtocolError::UnknownServiceType("service:\u{fffd}".into()))
        );
        assert_eq!(
            service_reply(&header, "service:ssh", &table(), &[]),
            Err(ProtocolError::NoLocalAddresses)
        );
    }

    #[test]
    fn test_reply_length_beyond_one_byte() {
        let table: ServiceTable = (0..40)
            .map(|i| ServiceEntry::new(format!("service_number_{i:02}"), "tcp", 1000 + i))
            .collect();
        let header = request_header(FunctionId::SrvTypeRqst);
        let reply = service_type_reply(&header, &table).unwrap();

        assert!(reply.len() > 255);
        let len = u32::from_be_bytes([0, reply[2], reply[3], reply[4]]) as usize;
        assert_eq!(len, reply.len());
        assert_eq!(ServiceTypeReply::decode(&reply).unwrap().service_types.len(), 40);
    }

    #[test]
    fn test_decode_reply_error_code() {
        let header = request_header(FunctionId::SrvTypeRqst);
        let reply = error_reply(&header, ErrorCode::InternalError);
        assert_eq!(
            ServiceTypeReply::decode(&reply),
            Err(ProtocolError::ErrorReply(ErrorCode::InternalError))
        );
    }

    #[test]
    fn test_decode_reply_wrong_function() {
        let header = request_header(FunctionId::SrvTypeRqst);
        let reply = service_type_reply(&header, &table()).unwrap();
        assert!(matches!(
            ServiceReply::decode(&reply),
            Err(ProtocolError::UnexpectedFunction {
                expected: FunctionId::SrvRply,
                actual: 0x0A
            })
        ));
    }

    #[test]
    fn test_decode_truncated_url_entry() {
        let header = request_header(FunctionId::SrvRqst);
        let reply = service_reply(
            &header,
            "service:ssh",
            &table(),
            &[Ipv4Addr::new(10, 0, 0, 5)],
        )
        .unwrap();
        let truncated = &reply[..reply.len() - 4];
        assert!(matches!(
            ServiceReply::decode(truncated),
            Err(ProtocolError::FieldOverrun { field: "URL", .. })
        ));
    }

    #[test]
    fn test_url_entry_skips_auth_blocks() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_u16(30);
        put_string(&mut buf, "URL", "service:x:tcp//1.2.3.4,1").unwrap();
        buf.put_u8(1);
        buf.put_u16(0x0002);
        buf.put_u16(8);
        buf.put_slice(&[0xaa; 4]);
        buf.put_u8(0x77);

        let mut reader = Reader::new(&buf, 0);
        let entry = UrlEntry::decode(&mut reader).unwrap();
        assert_eq!(entry.lifetime, 30);
        assert_eq!(entry.url, "service:x:tcp//1.2.3.4,1");
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_request_to_reply_flow() {
        let header = request_header(FunctionId::SrvRqst);
        let request = ServiceRequest::new("service:obmc_console", "DEFAULT");
        let bytes = request.encode(&header).unwrap();
        let decoded_header = Header::decode(&bytes).unwrap();
        let decoded = ServiceRequest::decode(&bytes, &decoded_header).unwrap();

        let reply = service_reply(
            &decoded_header,
            &decoded.service_type,
            &table(),
            &[Ipv4Addr::new(10, 0, 0, 5)],
        )
        .unwrap();
        assert_eq!(ServiceReply::decode(&reply).unwrap().header.xid, 0x74e2);

        let type_header = request_header(FunctionId::SrvTypeRqst);
        let type_request = ServiceTypeRequest::new("DEFAULT");
        let bytes = type_request.encode(&type_header).unwrap();
        assert_eq!(bytes.len(), 16 + 2 + 2 + 2 + 7);
    }
}
