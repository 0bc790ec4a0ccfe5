// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Relay smoke test.
//!
//! Loads the same environment as the server and sends one test message to
//! the configured recipients, so relay credentials can be checked without
//! submitting the form.

use anyhow::{bail, Context};
use chrono::Utc;
use contact_form_relay::{
    compose::test_message,
    config::Config,
    relay::{EmailRelay, SendGridRelay},
};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    info!(
        api_key_configured = config.relay.api_key.is_some(),
        sender = %config.relay.sender,
        recipients = ?config.relay.recipients,
        "Relay configuration"
    );

    if !config.relay.is_configured() {
        bail!("SENDGRID_API_KEY and RECIPIENT_EMAILS must be set");
    }

    let relay = SendGridRelay::new(&config.relay).context("building relay client")?;
    let email = test_message(&config.relay, Utc::now());

    match relay.send(&email).await {
        Ok(message_id) => {
            info!(%message_id, recipients = ?email.recipients, "Test email sent");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, endpoint = %relay.endpoint(), "Test email failed");
            Err(e.into())
        }
    }
}
