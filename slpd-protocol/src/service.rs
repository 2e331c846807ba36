//! Locally advertised services.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Prefix that turns a service name into its service type key.
pub const SERVICE_PREFIX: &str = "service:";

/// One advertised service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Bare name, e.g. `obmc_console`.
    pub name: String,
    /// Transport or protocol type, e.g. `tcp`.
    pub service_type: String,
    pub port: u16,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            port,
        }
    }

    /// Key this service is looked up by, `service:<name>`.
    pub fn key(&self) -> String {
        format!("{}{}", SERVICE_PREFIX, self.name)
    }

    /// URL advertised for this service on `addr`:
    /// `service:<name>:<type>//<addr>,<port>`.
    pub fn url(&self, addr: Ipv4Addr) -> String {
        format!(
            "{}:{}//{},{}",
            self.key(),
            self.service_type,
            addr,
            self.port
        )
    }
}

/// Immutable-after-load table of services keyed by `service:<name>`.
///
/// Keys iterate in sorted order, which fixes the order of the service type
/// list in replies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTable {
    entries: BTreeMap<String, ServiceEntry>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service. Returns false, leaving the table unchanged, if the
    /// key is already present.
    pub fn insert(&mut self, entry: ServiceEntry) -> bool {
        let key = entry.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    pub fn get(&self, key: &str) -> Option<&ServiceEntry> {
        self.entries.get(key)
    }

    /// Looks up a key received off the wire. Keys are UTF-8, so bytes that
    /// are not never match.
    pub fn get_bytes(&self, key: &[u8]) -> Option<&ServiceEntry> {
        std::str::from_utf8(key).ok().and_then(|key| self.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.entries.values()
    }

    /// Comma-separated list of all keys, as carried in a Service Type Reply.
    pub fn service_type_list(&self) -> String {
        self.keys().collect::<Vec<_>>().join(",")
    }
}

impl FromIterator<ServiceEntry> for ServiceTable {
    fn from_iter<I: IntoIterator<Item = ServiceEntry>>(iter: I) -> Self {
        let mut table = Self::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}
