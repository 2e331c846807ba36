//! Command execution.

use crate::Commands;
use colored::Colorize;
use serde::Serialize;
use slpd_client::{SlpClient, UrlEntry};
use slpd_protocol::SERVICE_PREFIX;

/// JSON form of a URL entry.
#[derive(Debug, Serialize)]
struct UrlOutput<'a> {
    url: &'a str,
    lifetime: u16,
}

/// Executes a command and returns the formatted output.
pub async fn execute(
    client: &SlpClient,
    cmd: Commands,
    json: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Types => {
            let types = client.service_types().await?;
            if json {
                Ok(serde_json::to_string_pretty(&types)?)
            } else {
                Ok(format_types(&types))
            }
        }

        Commands::Find { service_type } => {
            let service_type = normalize_service_type(&service_type);
            let urls = client.find_services(&service_type).await?;
            if json {
                let output: Vec<_> = urls
                    .iter()
                    .map(|u| UrlOutput {
                        url: &u.url,
                        lifetime: u.lifetime,
                    })
                    .collect();
                Ok(serde_json::to_string_pretty(&output)?)
            } else {
                Ok(format_urls(&service_type, &urls))
            }
        }
    }
}

/// Adds the `service:` prefix when it was left off.
fn normalize_service_type(service_type: &str) -> String {
    if service_type.starts_with(SERVICE_PREFIX) {
        service_type.to_string()
    } else {
        format!("{}{}", SERVICE_PREFIX, service_type)
    }
}

fn format_types(types: &[String]) -> String {
    if types.is_empty() {
        return "No service types advertised".yellow().to_string();
    }

    let mut output = format!("{}\n", format!("{} service type(s)", types.len()).bold());
    for t in types {
        output.push_str(&format!("  {}\n", t.cyan()));
    }
    output.trim_end().to_string()
}

fn format_urls(service_type: &str, urls: &[UrlEntry]) -> String {
    if urls.is_empty() {
        return format!("No URLs for {}", service_type).yellow().to_string();
    }

    let mut output = format!("{}\n", service_type.bold());
    for entry in urls {
        output.push_str(&format!(
            "  {} {}\n",
            entry.url.cyan(),
            format!("(lifetime {}s)", entry.lifetime).dimmed()
        ));
    }
    output.trim_end().to_string()
}
