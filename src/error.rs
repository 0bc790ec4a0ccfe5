// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the contact form relay.

use crate::handlers::ContactBody;
use crate::submission::ParseError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Configuration errors raised while loading from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid URL for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Email relay failures.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Email relay not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Email relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Email relay transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid relay endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Handler-level failures, each mapped to a status and a user-facing message.
///
/// Internal detail stays in the `Display` text for logging and never reaches
/// the response body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Malformed request body: {0}")]
    InvalidRequest(#[from] ParseError),

    #[error("Rate limited for {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Missing required fields")]
    MissingFields,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Anti-abuse token rejected")]
    VerificationFailed,

    #[error("Anti-abuse token or secret missing")]
    VerificationRequired,

    #[error("Submission filled in too fast")]
    SuspiciousTiming,

    #[error("Email relay not configured")]
    NotConfigured,

    #[error(transparent)]
    Delivery(#[from] RelayError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotConfigured | Self::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Short machine-readable code for the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited { .. } => "rate_limited",
            Self::MissingFields => "missing_fields",
            Self::InvalidEmail => "invalid_email",
            Self::VerificationFailed => "verification_failed",
            Self::VerificationRequired => "verification_required",
            Self::SuspiciousTiming => "suspicious_timing",
            Self::NotConfigured => "not_configured",
            Self::Delivery(_) => "delivery_failed",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "Invalid request format",
            Self::RateLimited { .. } => "Too many submissions. Please try again later.",
            Self::MissingFields => "Missing required fields: name, email and message are required.",
            Self::InvalidEmail => "Invalid email address",
            Self::VerificationFailed => "reCAPTCHA verification failed. Please try again.",
            Self::VerificationRequired => "Please complete the reCAPTCHA verification.",
            Self::SuspiciousTiming => "Please take a moment to review your message before submitting.",
            Self::NotConfigured => "Email service not configured",
            Self::Delivery(_) => "Failed to send email. Please try again later.",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ContactBody {
            success: false,
            message: self.user_message().to_string(),
            error: Some(self.code().to_string()),
        });

        match self {
            Self::RateLimited { retry_after_secs } => (
                self.status(),
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response(),
            _ => (self.status(), body).into_response(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ConfigError>;
