//! # slpd-server
//!
//! UDP responder for slpd.
//!
//! This crate provides:
//! - Layered configuration (YAML file, environment overrides, defaults)
//! - Service definitions file loading
//! - Local interface enumeration behind an injectable provider
//! - The request dispatcher that turns any datagram into a reply
//! - The async UDP server loop
//! - Prometheus metrics and their HTTP endpoint

pub mod config;
pub mod error;
pub mod handler;
pub mod interfaces;
pub mod metrics;
pub mod server;
pub mod services;

pub use config::{
    Config, ConfigError, InterfacesConfig, MetricsConfig, NetworkConfig, ServicesConfig,
};
pub use error::ServerError;
pub use handler::RequestHandler;
pub use interfaces::{InterfaceProvider, StaticInterfaces, SystemInterfaces};
pub use metrics::{run_metrics_server, Metrics};
pub use server::{Server, ServerConfig, ServerStats};
pub use services::{load_services, load_services_or_empty, parse_services};
