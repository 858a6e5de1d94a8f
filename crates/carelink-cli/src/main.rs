//! Carelink CLI - appointments, records and messages from the terminal.
//!
//! Talks to the carelink backend through `carelink-core`, which keeps the
//! session in the configured credential store and refreshes it as needed.

mod commands;
mod format;

use std::io;

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use carelink_core::api::ClientProvider;
use carelink_core::{ApiError, Config};

use commands::{Command, Context};

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n", e);
            eprintln!("{}", commands::USAGE);
            std::process::exit(2);
        }
    };

    if matches!(command, Command::Help) {
        println!("{}", commands::USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    debug!(store = ?config.store, api_url = ?config.api_url, "Configuration loaded");

    let provider = ClientProvider::new(
        config.resolver()?,
        config.session()?,
        config.client_options(),
    );
    let mut ctx = Context { config, provider };

    info!(?command, "Running command");
    if let Err(e) = commands::run(&mut ctx, command).await {
        match e.downcast_ref::<ApiError>() {
            Some(api_err) if api_err.requires_login() => {
                eprintln!("Your session has ended. Run `carelink login` to sign in again.");
            }
            Some(api_err) if api_err.is_transient() => {
                eprintln!("Could not reach the server: {}", api_err);
            }
            _ => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}
