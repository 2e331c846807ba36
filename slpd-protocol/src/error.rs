//! Protocol error types and SLP error codes.

use crate::header::FunctionId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur while decoding requests or building replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("datagram too short: need {needed} bytes, got {actual}")]
    BufferTooShort { needed: usize, actual: usize },

    #[error("unsupported SLP version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid function id: {0:#04x}")]
    InvalidFunction(u8),

    #[error("language tag length {len} exceeds datagram ({available} bytes available)")]
    LanguageTagOverrun { len: usize, available: usize },

    #[error("{field} overruns datagram: need {needed} bytes at offset {offset}, {available} available")]
    FieldOverrun {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("unexpected function: expected {expected}, got {actual:#04x}")]
    UnexpectedFunction { expected: FunctionId, actual: u8 },

    #[error("function {0} is not supported")]
    UnsupportedFunction(FunctionId),

    #[error("{field} too long for wire encoding: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("no services registered")]
    NoServices,

    #[error("unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("no local interface addresses")]
    NoLocalAddresses,

    #[error("reply carries error code {0}")]
    ErrorReply(ErrorCode),

    #[error("unknown error code: {0}")]
    UnknownErrorCode(u16),
}

impl ProtocolError {
    /// Returns the SLP error code reported to the peer for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::BufferTooShort { .. }
            | ProtocolError::InvalidFunction(_)
            | ProtocolError::LanguageTagOverrun { .. }
            | ProtocolError::FieldOverrun { .. }
            | ProtocolError::InvalidUtf8 { .. }
            | ProtocolError::UnexpectedFunction { .. }
            | ProtocolError::UnknownErrorCode(_) => ErrorCode::ParseError,
            ProtocolError::UnsupportedVersion(_) => ErrorCode::VerNotSupported,
            ProtocolError::UnsupportedFunction(_) => ErrorCode::MsgNotSupported,
            ProtocolError::FieldTooLong { .. }
            | ProtocolError::NoServices
            | ProtocolError::UnknownServiceType(_)
            | ProtocolError::NoLocalAddresses => ErrorCode::InternalError,
            ProtocolError::ErrorReply(code) => *code,
        }
    }
}

/// SLPv2 error codes (RFC 2608 section 7).
///
/// The numeric values are part of the wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum ErrorCode {
    LanguageNotSupported = 0x01,
    ParseError = 0x02,
    InvalidRegistration = 0x03,
    ScopeNotSupported = 0x04,
    AuthenticationUnknown = 0x05,
    AuthenticationAbsent = 0x06,
    AuthenticationFailed = 0x07,
    VerNotSupported = 0x09,
    InternalError = 0x0A,
    DaBusyNow = 0x0B,
    OptionNotUnderstood = 0x0C,
    InvalidUpdate = 0x0D,
    MsgNotSupported = 0x0E,
}

impl ErrorCode {
    /// Returns the wire value of this code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Maps a wire value to an error code. Zero (success) is not an error code.
    pub fn from_u16(value: u16) -> Option<Self> {
        let code = match value {
            0x01 => ErrorCode::LanguageNotSupported,
            0x02 => ErrorCode::ParseError,
            0x03 => ErrorCode::InvalidRegistration,
            0x04 => ErrorCode::ScopeNotSupported,
            0x05 => ErrorCode::AuthenticationUnknown,
            0x06 => ErrorCode::AuthenticationAbsent,
            0x07 => ErrorCode::AuthenticationFailed,
            0x09 => ErrorCode::VerNotSupported,
            0x0A => ErrorCode::InternalError,
            0x0B => ErrorCode::DaBusyNow,
            0x0C => ErrorCode::OptionNotUnderstood,
            0x0D => ErrorCode::InvalidUpdate,
            0x0E => ErrorCode::MsgNotSupported,
            _ => return None,
        };
        Some(code)
    }

    /// Returns whether a client may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::DaBusyNow | ErrorCode::InternalError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::LanguageNotSupported => write!(f, "LANGUAGE_NOT_SUPPORTED"),
            ErrorCode::ParseError => write!(f, "PARSE_ERROR"),
            ErrorCode::InvalidRegistration => write!(f, "INVALID_REGISTRATION"),
            ErrorCode::ScopeNotSupported => write!(f, "SCOPE_NOT_SUPPORTED"),
            ErrorCode::AuthenticationUnknown => write!(f, "AUTHENTICATION_UNKNOWN"),
            ErrorCode::AuthenticationAbsent => write!(f, "AUTHENTICATION_ABSENT"),
            ErrorCode::AuthenticationFailed => write!(f, "AUTHENTICATION_FAILED"),
            ErrorCode::VerNotSupported => write!(f, "VER_NOT_SUPPORTED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
            ErrorCode::DaBusyNow => write!(f, "DA_BUSY_NOW"),
            ErrorCode::OptionNotUnderstood => write!(f, "OPTION_NOT_UNDERSTOOD"),
            ErrorCode::InvalidUpdate => write!(f, "INVALID_UPDATE"),
            ErrorCode::MsgNotSupported => write!(f, "MSG_NOT_SUPPORTED"),
        }
    }
}
