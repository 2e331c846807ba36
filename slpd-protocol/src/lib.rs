//! # slpd-protocol
//!
//! Wire protocol implementation for slpd (SLPv2, RFC 2608).
//!
//! This crate provides:
//! - Header decoding with strict bounds checking, and reply header encoding
//! - Service Type Request and Service Request body decoding
//! - Service Type Reply, Service Reply and error reply construction
//! - Reply decoding and request encoding for clients
//! - Error codes and protocol constants

pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod reply;
pub mod service;

pub use error::{ErrorCode, ProtocolError};
pub use header::{reply_function_id, FunctionId, Header, HeaderFlags, HEADER_LEN};
pub use message::{Request, RequestBody, ServiceRequest, ServiceTypeRequest};
pub use reply::{
    decode_error_code, error_reply, service_reply, service_type_reply, ServiceReply,
    ServiceTypeReply, UrlEntry,
};
pub use service::{ServiceEntry, ServiceTable, SERVICE_PREFIX};

/// Protocol version supported by this implementation.
pub const SLP_VERSION: u8 = 2;

/// IANA-assigned SLP port.
pub const DEFAULT_PORT: u16 = 427;

/// Lifetime advertised for every URL entry, in seconds.
pub const URL_LIFETIME_SECS: u16 = 5;
