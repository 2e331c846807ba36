//! Local address enumeration.
//!
//! Service URLs carry the responder's own IPv4 addresses. The dispatcher asks
//! an [`InterfaceProvider`] on every Service Request so address changes are
//! picked up without a restart.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

/// Source of the local IPv4 addresses to advertise.
pub trait InterfaceProvider: Send + Sync {
    fn ipv4_addresses(&self) -> Vec<Ipv4Addr>;
}

/// Enumerates the host's interfaces, skipping loopback, interfaces that are
/// not operationally up, and excluded names.
#[derive(Debug, Clone, Default)]
pub struct SystemInterfaces {
    exclude: HashSet<String>,
}

/// The parts of one enumerated interface address that decide whether it is
/// advertised.
#[derive(Debug, Clone, Copy)]
struct InterfaceState<'a> {
    name: &'a str,
    ip: IpAddr,
    loopback: bool,
    running: bool,
}

impl SystemInterfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips interfaces with any of these names.
    pub fn with_exclude(exclude: impl IntoIterator<Item = String>) -> Self {
        Self {
            exclude: exclude.into_iter().collect(),
        }
    }

    fn select<'a>(&self, interfaces: impl IntoIterator<Item = InterfaceState<'a>>) -> Vec<Ipv4Addr> {
        let mut addrs = Vec::new();
        for iface in interfaces {
            if iface.loopback || !iface.running || self.exclude.contains(iface.name) {
                continue;
            }
            if let IpAddr::V4(ip) = iface.ip {
                if !addrs.contains(&ip) {
                    addrs.push(ip);
                }
            }
        }
        addrs
    }
}

impl InterfaceProvider for SystemInterfaces {
    fn ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        let interfaces = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::warn!("Failed to enumerate interfaces: {}", e);
                return Vec::new();
            }
        };

        self.select(interfaces.iter().map(|iface| InterfaceState {
            name: &iface.name,
            ip: iface.ip(),
            loopback: iface.is_loopback(),
            running: iface.is_oper_up(),
        }))
    }
}

/// Fixed address list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInterfaces {
    addrs: Vec<Ipv4Addr>,
}

impl StaticInterfaces {
    pub fn new(addrs: Vec<Ipv4Addr>) -> Self {
        Self { addrs }
    }
}

impl InterfaceProvider for StaticInterfaces {
    fn ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        self.addrs.clone()
    }
}
