//! Service definitions file.
//!
//! One service per line, whitespace separated:
//!
//! ```text
//! # name          type  port
//! obmc_console    tcp   2200
//! ```

use crate::error::ServerError;
use slpd_protocol::{ServiceEntry, ServiceTable};
use std::path::Path;

/// Parses service definitions.
///
/// Malformed lines are skipped with a warning so that one bad entry does not
/// take the remaining services down with it. Later duplicates are ignored.
pub fn parse_services(content: &str) -> ServiceTable {
    let mut table = ServiceTable::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, service_type, port, ..] = fields.as_slice() else {
            tracing::warn!(line = line_no, "Skipping service line with fewer than 3 fields");
            continue;
        };

        let port: u16 = match port.parse() {
            Ok(port) => port,
            Err(_) => {
                tracing::warn!(line = line_no, port = %port, "Skipping service with invalid port");
                continue;
            }
        };

        let entry = ServiceEntry::new(*name, *service_type, port);
        let key = entry.key();
        if !table.insert(entry) {
            tracing::warn!(line = line_no, service = %key, "Ignoring duplicate service definition");
        }
    }

    table
}

/// Reads and parses a service definitions file.
pub fn load_services(path: impl AsRef<Path>) -> Result<ServiceTable, ServerError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ServerError::ServicesFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_services(&content))
}

/// Like [`load_services`], but an unreadable file yields an empty table.
///
/// The responder still runs without services and answers every lookup with
/// INTERNAL_ERROR.
pub fn load_services_or_empty(path: impl AsRef<Path>) -> ServiceTable {
    match load_services(path) {
        Ok(table) => table,
        Err(e) => {
            tracing::warn!("{}; serving no services", e);
            ServiceTable::new()
        }
    }
}
