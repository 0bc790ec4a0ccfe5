// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Contact Form Relay Service
//!
//! Accepts contact form submissions over HTTP, filters abuse and forwards
//! accepted messages by email.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env`):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `CONTACT_POLICY`: `verified`, `heuristic` or `strict` (default: heuristic)
//! - `RATE_LIMIT_MAX_SUBMISSIONS`: Per-client submissions per window (default: 3)
//! - `RATE_LIMIT_WINDOW_SECS`: Rate window (default: 3600)
//! - `RECAPTCHA_SECRET_KEY` / `SKIP_RECAPTCHA`: Token verification
//! - `SENDGRID_API_KEY`, `SENDER_EMAIL`, `RECIPIENT_EMAILS`: Email relay

use chrono::Utc;
use contact_form_relay::{
    config::Config,
    gatekeeper::{Gatekeeper, Policy},
    handlers::{router, AppState},
    relay::{EmailRelay, SendGridRelay},
    store::{MemoryRateStore, RateStore},
    verifier::RecaptchaVerifier,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    info!(
        bind_addr = %config.bind_addr,
        policy = ?config.policy,
        max_submissions = config.rate_limit.max_submissions,
        window_secs = config.rate_limit.window_secs,
        verification_secret_configured = config.anti_abuse.verification_secret.is_some(),
        skip_verification = config.anti_abuse.skip_verification,
        relay_configured = config.relay.is_configured(),
        recipients = config.relay.recipients.len(),
        "Starting contact form relay"
    );

    let store = Arc::new(MemoryRateStore::new(&config.rate_limit));
    let verifier = Arc::new(RecaptchaVerifier::new(&config.anti_abuse)?);
    let gatekeeper = Gatekeeper::new(
        Policy::from(config.policy),
        config.anti_abuse.clone(),
        store.clone(),
        verifier,
    );

    let relay: Option<Arc<dyn EmailRelay>> = if config.relay.is_configured() {
        Some(Arc::new(SendGridRelay::new(&config.relay)?))
    } else {
        warn!("SENDGRID_API_KEY or RECIPIENT_EMAILS not set, accepted submissions will fail");
        None
    };

    // Spawn sweep task
    let sweep_every = config.rate_limit.sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            store.sweep(Utc::now()).await;
        }
    });

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState {
        gatekeeper,
        relay,
        config,
    });
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
