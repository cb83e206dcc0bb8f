//! Command handlers. Each one maps to a single session manager operation.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::warn;

use sidita_core::auth::decode_claims;
use sidita_core::models::ResetPasswordRequest;
use sidita_core::{Config, Session, SessionManager, UserId};

pub async fn run(
    manager: &SessionManager,
    config: &mut Config,
    command: &str,
    args: &[String],
) -> Result<()> {
    match (command, args) {
        ("login", rest) => {
            let session = login(manager, config, rest.first()).await?;
            print_session(&session);
            Ok(())
        }
        ("logout", []) => logout(manager).await,
        ("refresh", []) => {
            let session = manager.refresh_token().await?;
            print_session(&session);
            Ok(())
        }
        ("whoami", []) => {
            let session = restore(manager).await?;
            print_session(&session);
            Ok(())
        }
        ("watch", rest) => watch(manager, config, rest.first()).await,

        ("register", [params]) => print_json(&manager.register(&parse_json(params)?).await?),
        ("verify-email", [token]) => print_json(&manager.verify_email(token).await?),
        ("forgot-password", [email]) => print_json(&manager.forgot_password(email).await?),
        ("validate-reset-token", [token]) => {
            print_json(&manager.validate_reset_token(token).await?)
        }
        ("reset-password", [token]) => reset_password(manager, token).await,

        ("users", [sub, rest @ ..]) => users(manager, sub, rest).await,

        _ => bail!("Unknown command or wrong arguments: {} (try --help)", command),
    }
}

async fn users(manager: &SessionManager, sub: &str, args: &[String]) -> Result<()> {
    restore(manager).await?;

    match (sub, args) {
        ("list", []) => print_json(&manager.get_all().await?),
        ("get", ids) if !ids.is_empty() => {
            let ids: Vec<UserId> = ids.iter().map(|id| parse_id(id)).collect();
            let lookups = ids.iter().map(|id| manager.get_by_id(id));
            let results = futures::future::join_all(lookups).await;

            for (id, result) in ids.iter().zip(results) {
                match result {
                    Ok(account) => print_json(&account)?,
                    Err(e) => eprintln!("User {}: {}", id, e),
                }
            }
            Ok(())
        }
        ("create", [params]) => print_json(&manager.create(&parse_json(params)?).await?),
        ("update", [id, params]) => {
            print_json(&manager.update(&parse_id(id), &parse_json(params)?).await?)
        }
        ("delete", [id]) => print_json(&manager.delete(&parse_id(id)).await?),
        _ => bail!("Unknown users command: {} (try --help)", sub),
    }
}

// ===== Session commands =====

async fn login(
    manager: &SessionManager,
    config: &mut Config,
    email: Option<&String>,
) -> Result<Session> {
    let email = match email.cloned().or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    let session = manager.login(&email, &password).await?;

    if config.last_email.as_deref() != Some(email.as_str()) {
        config.last_email = Some(email);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
    Ok(session)
}

async fn logout(manager: &SessionManager) -> Result<()> {
    // Pick up the stored token so the revoke carries it
    if let Err(e) = manager.refresh_token().await {
        warn!(error = %e, "No active session to revoke");
    }
    manager.logout().await;
    println!("Logged out");
    Ok(())
}

/// Sign in and stay running, reporting each token refresh
async fn watch(
    manager: &SessionManager,
    config: &mut Config,
    email: Option<&String>,
) -> Result<()> {
    let session = login(manager, config, email).await?;
    print_session(&session);

    let mut user = manager.user();
    user.borrow_and_update();

    loop {
        tokio::select! {
            changed = user.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                match user.borrow_and_update().clone() {
                    Some(session) => {
                        println!("Session updated");
                        print_session(&session);
                    }
                    None => {
                        println!("Signed out");
                        return Ok(());
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}

async fn reset_password(manager: &SessionManager, token: &str) -> Result<()> {
    let password = rpassword::prompt_password("New password: ")?;
    let confirm_password = rpassword::prompt_password("Confirm password: ")?;

    let request = ResetPasswordRequest {
        token: token.to_string(),
        password,
        confirm_password,
    };
    print_json(&manager.reset_password(&request).await?)
}

/// Re-establish the session from the persisted cookie
async fn restore(manager: &SessionManager) -> Result<Session> {
    manager
        .refresh_token()
        .await
        .context("Not signed in (run `sidita login`)")
}

// ===== Helpers =====

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("No input given");
    }
    Ok(line)
}

fn parse_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON: {}", raw))
}

fn parse_id(raw: &str) -> UserId {
    match raw.parse() {
        Ok(id) => id,
        Err(never) => match never {},
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_session(session: &Session) {
    println!("{} (id {})", session.display_name(), session.id);
    if let Some(role) = session.field("role").and_then(Value::as_str) {
        println!("  Role: {}", role);
    }
    if let Some(expires) = decode_claims(&session.token)
        .ok()
        .and_then(|claims| claims.expires_at())
    {
        println!("  Token expires: {}", expires);
    }
}
