//! # slpd-client
//!
//! Client library for slpd.
//!
//! This crate provides:
//! - Async UDP client for SLPv2 Service Type and Service requests
//! - Reply correlation by transaction id with a per-request timeout

pub mod client;
pub mod error;

pub use client::{ClientConfig, SlpClient};
pub use error::ClientError;
pub use slpd_protocol::UrlEntry;
