// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Anti-abuse token verification.
//!
//! Verification is fail-closed: any transport error, timeout, non-success
//! status or unreadable body counts as a failed verification.

use crate::config::AntiAbuseConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, warn};

/// Checks a client-supplied anti-abuse token against a shared secret.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str, secret: &str) -> bool;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// reCAPTCHA `siteverify` compatible client.
pub struct RecaptchaVerifier {
    verify_url: String,
    client: reqwest::Client,
}

impl RecaptchaVerifier {
    pub fn new(config: &AntiAbuseConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.verify_timeout())
            .build()?;

        Ok(Self {
            verify_url: config.verify_url.clone(),
            client,
        })
    }
}

#[async_trait]
impl TokenVerifier for RecaptchaVerifier {
    async fn verify(&self, token: &str, secret: &str) -> bool {
        let response = match self
            .client
            .post(&self.verify_url)
            .form(&[("secret", secret), ("response", token)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, timeout = e.is_timeout(), "Token verification request failed");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Token verification service returned error status");
            return false;
        }

        match response.json::<SiteVerifyResponse>().await {
            Ok(body) => {
                debug!(success = body.success, error_codes = ?body.error_codes, "Token verification result");
                body.success
            }
            Err(e) => {
                error!(error = %e, "Unreadable token verification response");
                false
            }
        }
    }
}
