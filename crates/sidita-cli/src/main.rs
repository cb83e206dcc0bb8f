//! sidita - command-line client for the account API.
//!
//! Signs in, keeps the session cookie between runs and drives the account
//! and user endpoints from the shell.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sidita_core::auth::{LogNavigator, SessionState};
use sidita_core::{ApiClient, Config, SessionManager};

const USAGE: &str = "\
Usage: sidita <command> [args]

Session:
  login [email]                  Sign in (password is prompted)
  logout                         Revoke the session and forget the cookie
  refresh                        Exchange the stored token for a new one
  whoami                         Show the signed-in user
  watch [email]                  Sign in and keep the token fresh until Ctrl+C

Account:
  register <json>                Register a new account
  verify-email <token>           Confirm an email address
  forgot-password <email>        Request a password reset email
  validate-reset-token <token>   Check a password reset token
  reset-password <token>         Set a new password (prompted)

Users:
  users list
  users get <id>...
  users create <json>
  users update <id> <json>
  users delete <id>
";

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
    let Some(command) = args.first() else {
        eprint!("{}", USAGE);
        return Ok(());
    };
    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    info!(api_url = config.api_url(), "sidita starting");

    let api = ApiClient::new(config.api_url())?;
    let manager = SessionManager::new(
        api,
        Arc::new(SessionState::new()),
        config.cookie_jar()?,
        Arc::new(LogNavigator),
        config.session_options(),
    );

    let result = commands::run(&manager, &mut config, command, &args[1..]).await;
    // Logout (explicit or automatic) revokes in the background
    manager.wait_for_revoke().await;
    result
}
