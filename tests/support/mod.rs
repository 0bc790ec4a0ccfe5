// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Shared helpers for integration tests: an in-process server on an
//! ephemeral port plus fake relay and verifier collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use contact_form_relay::{
    config::Config,
    error::RelayError,
    gatekeeper::{Gatekeeper, Policy},
    handlers::{router, AppState},
    relay::{EmailRelay, OutboundEmail},
    store::MemoryRateStore,
    verifier::TokenVerifier,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Relay that records messages instead of delivering them.
#[derive(Default)]
pub struct RecordingRelay {
    pub sent: Mutex<Vec<OutboundEmail>>,
    pub fail: bool,
}

impl RecordingRelay {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl EmailRelay for RecordingRelay {
    async fn send(&self, email: &OutboundEmail) -> Result<String, RelayError> {
        if self.fail {
            return Err(RelayError::Rejected {
                status: 503,
                body: "upstream quota exhausted for account 42".to_string(),
            });
        }
        let mut sent = self.sent.lock().await;
        sent.push(email.clone());
        Ok(format!("msg-{}", sent.len()))
    }
}

/// Verifier with a fixed answer that counts its calls.
pub struct StubVerifier {
    pub answer: bool,
    pub calls: AtomicUsize,
}

impl StubVerifier {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for StubVerifier {
    async fn verify(&self, _token: &str, _secret: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Configuration with a relay pointed at two recipients.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.relay.api_key = Some("SG.test".to_string());
    config.relay.sender = "DoNotReply@example.com".to_string();
    config.relay.recipients = vec![
        "office@example.com".to_string(),
        "owner@example.com".to_string(),
    ];
    config.relay.site_name = "Example".to_string();
    config
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn contact_url(&self) -> String {
        format!("http://{}/api/contact", self.address)
    }

    /// POST a JSON body from the given client IP.
    pub async fn submit(&self, ip: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.contact_url())
            .header("X-Forwarded-For", ip)
            .json(body)
            .send()
            .await
            .expect("request failed")
    }
}

/// Spawn the router on an ephemeral port.
pub async fn spawn_app(
    config: Config,
    relay: Option<Arc<RecordingRelay>>,
    verifier: Arc<StubVerifier>,
) -> TestApp {
    let store = Arc::new(MemoryRateStore::new(&config.rate_limit));
    let gatekeeper = Gatekeeper::new(
        Policy::from(config.policy),
        config.anti_abuse.clone(),
        store,
        verifier,
    );
    let relay = relay.map(|r| r as Arc<dyn EmailRelay>);
    let state = Arc::new(AppState {
        gatekeeper,
        relay,
        config,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        address: addr.to_string(),
        client: reqwest::Client::new(),
    }
}

/// Generate distinct client IPs in 10.0.0.0/8.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            IpAddr::V4(Ipv4Addr::new(
                10,
                ((i >> 16) & 0xff) as u8,
                ((i >> 8) & 0xff) as u8,
                (i & 0xff) as u8,
            ))
        })
        .collect()
}

/// A submission a human would plausibly send.
pub fn jane_doe() -> serde_json::Value {
    serde_json::json!({
        "name": "Jane Doe",
        "email": "jane@example.com",
        "message": "Hello",
        "subject": "Inquiry",
        "submissionTime": 4000
    })
}
