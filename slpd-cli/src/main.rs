//! slpd-cli - Command-line interface for SLPv2 responders
//!
//! Sends one Service Type or Service request and prints the reply.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use slpd_client::{ClientConfig, SlpClient};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slpd-cli")]
#[command(about = "Query SLPv2 service responders")]
#[command(version)]
struct Cli {
    /// Responder address
    #[arg(short, long, default_value = "127.0.0.1:427", env = "SLPD_SERVER")]
    server: SocketAddr,

    /// Reply timeout in milliseconds
    #[arg(long, default_value = "3000")]
    timeout_ms: u64,

    /// Language tag sent with the request
    #[arg(long, default_value = "en")]
    lang: String,

    /// Scope list sent with the request
    #[arg(long, default_value = "DEFAULT")]
    scope: String,

    /// Print JSON instead of human-readable output
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List advertised service types
    Types,

    /// List URLs for a service type
    Find {
        /// Service type, e.g. service:obmc_console (the prefix is optional)
        service_type: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ClientConfig::new(cli.server)
        .with_timeout(Duration::from_millis(cli.timeout_ms))
        .with_language_tag(cli.lang)
        .with_scope_list(cli.scope);
    let client = SlpClient::new(config);

    match commands::execute(&client, cli.command, cli.json).await {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
