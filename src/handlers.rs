// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the contact form relay.
//!
//! Every response carries a permissive CORS origin; preflight `OPTIONS`
//! requests are answered by the CORS layer.

use crate::compose::compose;
use crate::config::Config;
use crate::error::AppError;
use crate::gatekeeper::{AntiAbuseFailure, Decision, Gatekeeper};
use crate::relay::EmailRelay;
use crate::submission::Submission;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

/// Message shown on success, including silently dropped submissions.
pub const SUCCESS_MESSAGE: &str = "Your message has been sent successfully!";

/// Shared application state.
pub struct AppState {
    pub gatekeeper: Gatekeeper,
    /// `None` when the relay credential or recipients are missing
    pub relay: Option<Arc<dyn EmailRelay>>,
    pub config: Config,
}

/// Response body for contact submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactBody {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the service router with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/contact", post(submit_contact))
        .route("/contact", post(submit_contact))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "contact-form-relay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Identify the submitting client.
///
/// The first `X-Forwarded-For` hop wins, then the peer address.
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Map a non-delivering decision onto the response contract.
///
/// Silent accepts are `Ok` so the caller cannot tell them apart from a
/// real delivery.
fn reject(decision: Decision) -> Result<(), AppError> {
    match decision {
        Decision::Accept | Decision::SilentAccept { .. } => Ok(()),
        Decision::RejectRateLimited { retry_after } => Err(AppError::RateLimited {
            retry_after_secs: (retry_after.num_milliseconds().max(1) as u64).div_ceil(1000),
        }),
        Decision::RejectMissingFields => Err(AppError::MissingFields),
        Decision::RejectInvalidEmail => Err(AppError::InvalidEmail),
        Decision::RejectAntiAbuseFailed {
            reason: AntiAbuseFailure::TokenRejected,
        } => Err(AppError::VerificationFailed),
        Decision::RejectAntiAbuseFailed {
            reason: AntiAbuseFailure::TokenMissing,
        } => Err(AppError::VerificationRequired),
        Decision::RejectSuspiciousTiming => Err(AppError::SuspiciousTiming),
    }
}

fn sent() -> Json<ContactBody> {
    Json(ContactBody {
        success: true,
        message: SUCCESS_MESSAGE.to_string(),
        error: None,
    })
}

/// Accept a contact form submission.
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ContactBody>, AppError> {
    let client_id = client_id(&headers, peer.map(|ConnectInfo(addr)| addr));
    let now = Utc::now();

    let submission = match Submission::from_json(&body) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(%client_id, error = %e, "Invalid request body");
            // Unparseable bodies still count against the client's quota
            if let Some(rejection) = state.gatekeeper.throttle(&client_id, now).await {
                reject(rejection)?;
            }
            return Err(AppError::from(e));
        }
    };

    let decision = state.gatekeeper.evaluate(&submission, &client_id, now).await;
    debug!(%client_id, ?decision, "Gatekeeper decision");
    if !decision.delivers() {
        reject(decision)?;
        info!(%client_id, ?decision, "Submission dropped silently");
        return Ok(sent());
    }

    let Some(relay) = state.relay.as_ref() else {
        error!("Email relay credential or recipients not configured");
        return Err(AppError::NotConfigured);
    };

    let email = compose(&submission, &client_id, now, &state.config.relay);
    match relay.send(&email).await {
        Ok(message_id) => {
            info!(%client_id, %message_id, "Contact email sent");
            Ok(sent())
        }
        Err(e) => {
            error!(%client_id, error = %e, "Failed to send contact email");
            Err(AppError::Delivery(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_client_id_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_id(&headers, Some(peer)), "203.0.113.9");
    }

    #[test]
    fn test_client_id_falls_back_to_peer_then_unknown() {
        let peer: SocketAddr = "192.0.2.10:443".parse().unwrap();
        assert_eq!(client_id(&HeaderMap::new(), Some(peer)), "192.0.2.10");
        assert_eq!(client_id(&HeaderMap::new(), None), "unknown");

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " ".parse().unwrap());
        assert_eq!(client_id(&headers, None), "unknown");
    }

    #[test]
    fn test_retry_after_rounds_up_to_whole_seconds() {
        let err = reject(Decision::RejectRateLimited {
            retry_after: Duration::milliseconds(1500),
        })
        .unwrap_err();
        assert!(matches!(err, AppError::RateLimited { retry_after_secs: 2 }));
    }

    #[test]
    fn test_silent_accept_is_not_an_error() {
        assert!(reject(Decision::SilentAccept {
            reason: crate::gatekeeper::SuppressionReason::Honeypot
        })
        .is_ok());
    }

    #[test]
    fn test_error_contract() {
        let cases = [
            (AppError::MissingFields, 400, "missing_fields"),
            (AppError::InvalidEmail, 400, "invalid_email"),
            (AppError::VerificationFailed, 400, "verification_failed"),
            (AppError::RateLimited { retry_after_secs: 5 }, 429, "rate_limited"),
            (AppError::NotConfigured, 500, "not_configured"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status().as_u16(), status);
            assert_eq!(err.code(), code);
        }
        assert_eq!(AppError::NotConfigured.user_message(), "Email service not configured");
    }
}
