//! Request message bodies.
//!
//! String fields are kept as the raw bytes received. Only their lengths are
//! validated; the content is never required to be UTF-8.

use crate::codec::{put_opaque, Reader, STRING_LEN_SIZE};
use crate::error::ProtocolError;
use crate::header::{set_message_length, FunctionId, Header};
use bytes::{BufMut, Bytes, BytesMut};

/// Smallest datagram that can hold a Service Type Request.
pub const MIN_SRVTYPE_RQST_LEN: usize = 22;

/// Smallest datagram that can hold a Service Request.
pub const MIN_SRV_RQST_LEN: usize = 26;

/// Naming authority length meaning "all naming authorities".
pub const NAMING_AUTHORITY_ALL: u16 = 0xFFFF;

/// Service Type Request (function 9).
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |        length of PRList       |        <PRList> String        \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   length of Naming Authority  |   <Naming Authority String>   \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     length of <scope-list>    |      <scope-list> String      \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTypeRequest {
    pub pr_list: Bytes,
    /// Empty for both the IANA (0x0000) and the "all" (0xFFFF) naming authority.
    pub naming_authority: Bytes,
    pub scope_list: Bytes,
}

impl ServiceTypeRequest {
    /// Request for every service type in `scope_list`.
    pub fn new(scope_list: impl Into<Bytes>) -> Self {
        Self {
            scope_list: scope_list.into(),
            ..Self::default()
        }
    }

    /// Decodes the body that follows `header` in `buf`.
    pub fn decode(buf: &[u8], header: &Header) -> Result<Self, ProtocolError> {
        if buf.len() < MIN_SRVTYPE_RQST_LEN {
            return Err(ProtocolError::BufferTooShort {
                needed: MIN_SRVTYPE_RQST_LEN,
                actual: buf.len(),
            });
        }

        let mut reader = Reader::new(buf, header.body_offset());
        let pr_list = reader.read_opaque("previous responder list")?;

        let naming_len = reader.read_u16("naming authority")?;
        let naming_authority = match naming_len {
            0 | NAMING_AUTHORITY_ALL => &[][..],
            len => reader.read_bytes("naming authority", len as usize)?,
        };

        let scope_list = reader.read_opaque("scope list")?;

        Ok(Self {
            pr_list: Bytes::copy_from_slice(pr_list),
            naming_authority: Bytes::copy_from_slice(naming_authority),
            scope_list: Bytes::copy_from_slice(scope_list),
        })
    }

    /// Encodes a complete request datagram. An empty naming authority is
    /// sent as 0xFFFF so every service type is returned.
    pub fn encode(&self, header: &Header) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(
            header.body_offset()
                + 3 * STRING_LEN_SIZE
                + self.pr_list.len()
                + self.naming_authority.len()
                + self.scope_list.len(),
        );
        header.write(&mut buf, FunctionId::SrvTypeRqst.as_u8());
        put_opaque(&mut buf, "previous responder list", &self.pr_list)?;
        if self.naming_authority.is_empty() {
            buf.put_u16(NAMING_AUTHORITY_ALL);
        } else {
            put_opaque(&mut buf, "naming authority", &self.naming_authority)?;
        }
        put_opaque(&mut buf, "scope list", &self.scope_list)?;
        set_message_length(&mut buf)?;
        Ok(buf)
    }
}

/// Service Request (function 1).
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      length of <PRList>       |        <PRList> String        \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   length of <service-type>    |    <service-type> String      \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    length of <scope-list>     |     <scope-list> String       \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  length of predicate string   |  Service Request <predicate>  \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  length of <SLP SPI> string   |       <SLP SPI> String        \
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceRequest {
    pub pr_list: Bytes,
    pub service_type: Bytes,
    pub scope_list: Bytes,
    pub predicate: Bytes,
    pub spi: Bytes,
}

impl ServiceRequest {
    /// Request for `service_type` in `scope_list` with no predicate.
    pub fn new(service_type: impl Into<Bytes>, scope_list: impl Into<Bytes>) -> Self {
        Self {
            service_type: service_type.into(),
            scope_list: scope_list.into(),
            ..Self::default()
        }
    }

    /// Decodes the body that follows `header` in `buf`.
    ///
    /// Fields are validated one at a time, so the error names the first
    /// field whose length runs past the datagram.
    pub fn decode(buf: &[u8], header: &Header) -> Result<Self, ProtocolError> {
        if buf.len() < MIN_SRV_RQST_LEN {
            return Err(ProtocolError::BufferTooShort {
                needed: MIN_SRV_RQST_LEN,
                actual: buf.len(),
            });
        }

        let mut reader = Reader::new(buf, header.body_offset());
        let mut field = |name| reader.read_opaque(name).map(Bytes::copy_from_slice);
        Ok(Self {
            pr_list: field("previous responder list")?,
            service_type: field("service type")?,
            scope_list: field("scope list")?,
            predicate: field("predicate")?,
            spi: field("SLP SPI")?,
        })
    }

    /// Encodes a complete request datagram.
    pub fn encode(&self, header: &Header) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(
            header.body_offset()
                + 5 * STRING_LEN_SIZE
                + self.pr_list.len()
                + self.service_type.len()
                + self.scope_list.len()
                + self.predicate.len()
                + self.spi.len(),
        );
        header.write(&mut buf, FunctionId::SrvRqst.as_u8());
        put_opaque(&mut buf, "previous responder list", &self.pr_list)?;
        put_opaque(&mut buf, "service type", &self.service_type)?;
        put_opaque(&mut buf, "scope list", &self.scope_list)?;
        put_opaque(&mut buf, "predicate", &self.predicate)?;
        put_opaque(&mut buf, "SLP SPI", &self.spi)?;
        set_message_length(&mut buf)?;
        Ok(buf)
    }
}

/// Body of a request, selected by the header's function id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    ServiceType(ServiceTypeRequest),
    Service(ServiceRequest),
}

impl RequestBody {
    /// Decodes the body variant matching `header.function_id`.
    ///
    /// Defined functions without a handler yield
    /// [`ProtocolError::UnsupportedFunction`].
    pub fn decode(buf: &[u8], header: &Header) -> Result<Self, ProtocolError> {
        match FunctionId::try_from(header.function_id)? {
            FunctionId::SrvTypeRqst => ServiceTypeRequest::decode(buf, header).map(Self::ServiceType),
            FunctionId::SrvRqst => ServiceRequest::decode(buf, header).map(Self::Service),
            other => Err(ProtocolError::UnsupportedFunction(other)),
        }
    }

    pub fn function(&self) -> FunctionId {
        match self {
            RequestBody::ServiceType(_) => FunctionId::SrvTypeRqst,
            RequestBody::Service(_) => FunctionId::SrvRqst,
        }
    }
}

/// A fully decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub header: Header,
    pub body: RequestBody,
}

impl Request {
    /// Decodes header and body from one datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let header = Header::decode(buf)?;
        let body = RequestBody::decode(buf, &header)?;
        Ok(Self { header, body })
    }
}
