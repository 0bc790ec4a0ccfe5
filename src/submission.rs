// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Inbound contact form payload.
//!
//! Every field is untrusted. Clients disagree on field types (a phone number
//! may arrive as a JSON number) so scalar values are coerced to strings
//! instead of failing the whole request.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Subject used when the submitter left it blank.
pub const DEFAULT_SUBJECT: &str = "Contact Form";

/// A raw contact form submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Submission {
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "loose_string")]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "loose_string")]
    pub phone: Option<String>,

    #[serde(default, deserialize_with = "loose_string")]
    pub company: Option<String>,

    #[serde(default, deserialize_with = "loose_string")]
    pub subject: Option<String>,

    #[serde(default, deserialize_with = "loose_string")]
    pub message: Option<String>,

    /// Anti-abuse token, first of three accepted field names
    #[serde(default, rename = "captcha", deserialize_with = "loose_string")]
    pub captcha: Option<String>,

    #[serde(default, rename = "recaptchaToken", deserialize_with = "loose_string")]
    pub recaptcha_token: Option<String>,

    #[serde(default, rename = "g-recaptcha-response", deserialize_with = "loose_string")]
    pub g_recaptcha_response: Option<String>,

    /// Hidden form field that humans never fill in. Kept raw so any
    /// non-empty value of any JSON type counts as filled.
    #[serde(default, rename = "website")]
    pub honeypot: Option<Value>,

    /// Client-reported time spent filling the form, in milliseconds
    #[serde(default, rename = "submissionTime", deserialize_with = "loose_millis")]
    pub elapsed_fill_time_ms: Option<f64>,
}

/// Request body could not be read as a submission.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON object")]
    NotAnObject,
}

impl Submission {
    /// Parse a request body. Only JSON objects are accepted.
    pub fn from_json(body: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(ParseError::NotAnObject);
        }
        Ok(Self::deserialize(value)?)
    }

    pub fn name(&self) -> &str {
        trimmed(&self.name)
    }

    pub fn email(&self) -> &str {
        trimmed(&self.email)
    }

    pub fn phone(&self) -> &str {
        trimmed(&self.phone)
    }

    pub fn company(&self) -> &str {
        trimmed(&self.company)
    }

    pub fn message(&self) -> &str {
        trimmed(&self.message)
    }

    /// The subject, falling back to [`DEFAULT_SUBJECT`].
    pub fn subject(&self) -> &str {
        match trimmed(&self.subject) {
            "" => DEFAULT_SUBJECT,
            s => s,
        }
    }

    /// The anti-abuse token under whichever alias the client used.
    pub fn anti_abuse_token(&self) -> Option<&str> {
        [&self.captcha, &self.recaptcha_token, &self.g_recaptcha_response]
            .into_iter()
            .map(trimmed)
            .find(|t| !t.is_empty())
    }

    /// True when the hidden field holds a truthy JSON value. Whitespace is
    /// not trimmed; `false`, `0`, `""`, `[]`, `{}` and `null` are empty.
    pub fn honeypot_filled(&self) -> bool {
        match &self.honeypot {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// Names of required fields that are empty after trimming.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", self.name()),
            ("email", self.email()),
            ("message", self.message()),
        ]
        .into_iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

fn trimmed(field: &Option<String>) -> &str {
    field.as_deref().map(str::trim).unwrap_or("")
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(true)) => Some("true".to_string()),
        _ => None,
    })
}

fn loose_millis<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
