// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Outbound email relay.
//!
//! Delivery is attempted exactly once; a failure is returned to the caller
//! immediately.

use crate::config::RelayConfig;
use crate::error::RelayError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

/// A message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub reply_to: String,
}

/// Delivers a composed message. Returns the provider's delivery identifier.
#[async_trait]
pub trait EmailRelay: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<String, RelayError>;
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    reply_to: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

impl<'a> From<&'a OutboundEmail> for MailSend<'a> {
    fn from(email: &'a OutboundEmail) -> Self {
        Self {
            personalizations: vec![Personalization {
                to: email
                    .recipients
                    .iter()
                    .map(|r| Address { email: r })
                    .collect(),
            }],
            from: Address {
                email: &email.sender,
            },
            reply_to: Address {
                email: &email.reply_to,
            },
            subject: &email.subject,
            content: vec![Content {
                kind: "text/html",
                value: &email.html_body,
            }],
        }
    }
}

/// SendGrid v3 `mail/send` client.
pub struct SendGridRelay {
    endpoint: Url,
    api_key: String,
    client: reqwest::Client,
}

impl SendGridRelay {
    /// Create a relay from configuration. Fails without an API key.
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(RelayError::NotConfigured("SENDGRID_API_KEY"))?;
        let endpoint = mail_send_endpoint(&config.api_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// `v3/mail/send` under `base`, keeping any path prefix on the base URL.
fn mail_send_endpoint(base: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("v3/mail/send")
}

#[async_trait]
impl EmailRelay for SendGridRelay {
    async fn send(&self, email: &OutboundEmail) -> Result<String, RelayError> {
        debug!(
            recipients = email.recipients.len(),
            subject = %email.subject,
            "Sending email via relay"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&MailSend::from(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("accepted")
            .to_string();
        info!(message_id = %id, status = status.as_u16(), "Email accepted by relay");
        Ok(id)
    }
}
