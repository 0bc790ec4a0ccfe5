// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the contact form relay.
//!
//! Every value has a default so the service starts with an empty
//! environment; the relay simply reports itself as not configured until
//! `SENDGRID_API_KEY` and `RECIPIENT_EMAILS` are set.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the contact form relay service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Which gatekeeper checks run on each submission
    #[serde(default)]
    pub policy: PolicyKind,

    /// Per-client rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Honeypot, fill-time and token verification settings
    #[serde(default)]
    pub anti_abuse: AntiAbuseConfig,

    /// Outbound email relay
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Named gatekeeper policy presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Required fields plus external token verification
    Verified,
    /// Rate limit, honeypot, required fields, email shape, fill time
    #[default]
    Heuristic,
    /// Every check
    Strict,
}

impl FromStr for PolicyKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verified" | "recaptcha" => Ok(Self::Verified),
            "heuristic" => Ok(Self::Heuristic),
            "strict" => Ok(Self::Strict),
            _ => Err(()),
        }
    }
}

/// What to do with a submission that was filled in implausibly fast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FastFillAction {
    /// Report success to the caller and drop the message
    #[default]
    Silent,
    /// Reject with a 400
    Reject,
}

impl FromStr for FastFillAction {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" | "drop" => Ok(Self::Silent),
            "reject" => Ok(Self::Reject),
            _ => Err(()),
        }
    }
}

/// Per-client rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum submissions per client inside one window (default: 3)
    #[serde(default = "default_max_submissions")]
    pub max_submissions: u32,

    /// Window length in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Upper bound on tracked client identifiers (default: 10000)
    #[serde(default = "default_max_tracked_clients")]
    pub max_tracked_clients: usize,

    /// Interval between sweeps of expired entries in seconds (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Anti-abuse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiAbuseConfig {
    /// Fill times strictly below this are treated as bot-like (default: 3000)
    #[serde(default = "default_min_fill_time_ms")]
    pub min_fill_time_ms: u64,

    #[serde(default)]
    pub fast_fill_action: FastFillAction,

    /// Shared secret for the verification service
    #[serde(default)]
    pub verification_secret: Option<String>,

    /// Bypass token verification entirely (local testing)
    #[serde(default)]
    pub skip_verification: bool,

    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Verification request timeout in seconds (default: 5)
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,
}

/// Email relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay API credential; absent means the relay is not configured
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    #[serde(default = "default_relay_api_url")]
    pub api_url: String,

    /// Relay request timeout in seconds (default: 10)
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_sender")]
    pub sender: String,

    #[serde(default)]
    pub recipients: Vec<String>,

    /// Site name shown in the email footer
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// HTML-escape submission fields in the email body (default: true)
    #[serde(default = "default_true")]
    pub escape_html: bool,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_submissions() -> u32 {
    3
}

fn default_window_secs() -> u64 {
    3600
}

fn default_max_tracked_clients() -> usize {
    10_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_min_fill_time_ms() -> u64 {
    3000
}

fn default_verify_url() -> String {
    "https://www.google.com/recaptcha/api/siteverify".to_string()
}

fn default_verify_timeout_secs() -> u64 {
    5
}

fn default_relay_api_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_relay_timeout_secs() -> u64 {
    10
}

fn default_sender() -> String {
    "DoNotReply@localhost".to_string()
}

fn default_site_name() -> String {
    "Website".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            policy: PolicyKind::default(),
            rate_limit: RateLimitConfig::default(),
            anti_abuse: AntiAbuseConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_submissions: default_max_submissions(),
            window_secs: default_window_secs(),
            max_tracked_clients: default_max_tracked_clients(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for AntiAbuseConfig {
    fn default() -> Self {
        Self {
            min_fill_time_ms: default_min_fill_time_ms(),
            fast_fill_action: FastFillAction::default(),
            verification_secret: None,
            skip_verification: false,
            verify_url: default_verify_url(),
            verify_timeout_secs: default_verify_timeout_secs(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_relay_api_url(),
            timeout_secs: default_relay_timeout_secs(),
            sender: default_sender(),
            recipients: Vec::new(),
            site_name: default_site_name(),
            escape_html: default_true(),
        }
    }
}

impl RateLimitConfig {
    /// Get the rate window as a chrono duration
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_secs.min(u64::from(u32::MAX)) as i64)
    }

    /// Get the sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl AntiAbuseConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The relay can only deliver with a credential and at least one recipient.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && !self.recipients.is_empty()
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset or empty variables keep their defaults; values that are set
    /// but unparseable are an error rather than a silent fallback.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("BIND_ADDR") {
            config.bind_addr = v;
        }
        if let Some(v) = get("CONTACT_POLICY") {
            config.policy = v.parse().map_err(|_| invalid("CONTACT_POLICY", &v))?;
        }

        let rate = &mut config.rate_limit;
        parse_into(&get, "RATE_LIMIT_MAX_SUBMISSIONS", &mut rate.max_submissions)?;
        parse_into(&get, "RATE_LIMIT_WINDOW_SECS", &mut rate.window_secs)?;
        parse_into(&get, "RATE_LIMIT_MAX_CLIENTS", &mut rate.max_tracked_clients)?;
        parse_into(&get, "RATE_LIMIT_SWEEP_SECS", &mut rate.sweep_interval_secs)?;

        let abuse = &mut config.anti_abuse;
        parse_into(&get, "MIN_FILL_TIME_MS", &mut abuse.min_fill_time_ms)?;
        if let Some(v) = get("FAST_FILL_ACTION") {
            abuse.fast_fill_action = v.parse().map_err(|_| invalid("FAST_FILL_ACTION", &v))?;
        }
        abuse.verification_secret = get("RECAPTCHA_SECRET_KEY");
        if let Some(v) = get("SKIP_RECAPTCHA") {
            abuse.skip_verification = parse_flag("SKIP_RECAPTCHA", &v)?;
        }
        if let Some(v) = get("RECAPTCHA_VERIFY_URL") {
            check_url("RECAPTCHA_VERIFY_URL", &v)?;
            abuse.verify_url = v;
        }
        parse_into(&get, "RECAPTCHA_TIMEOUT_SECS", &mut abuse.verify_timeout_secs)?;

        let relay = &mut config.relay;
        relay.api_key = get("SENDGRID_API_KEY");
        if let Some(v) = get("SENDGRID_API_URL") {
            check_url("SENDGRID_API_URL", &v)?;
            relay.api_url = v;
        }
        parse_into(&get, "RELAY_TIMEOUT_SECS", &mut relay.timeout_secs)?;
        if let Some(v) = get("SENDER_EMAIL") {
            relay.sender = v.trim().to_string();
        }
        if let Some(v) = get("RECIPIENT_EMAILS") {
            relay.recipients = parse_recipients(&v);
        }
        if let Some(v) = get("SITE_NAME") {
            relay.site_name = v.trim().to_string();
        }
        if let Some(v) = get("HTML_ESCAPE") {
            relay.escape_html = parse_flag("HTML_ESCAPE", &v)?;
        }

        Ok(config)
    }
}

/// Split a comma-separated recipient list, dropping blanks.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_into<T, G>(get: &G, key: &'static str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(v) = get(key) {
        *slot = v.trim().parse().map_err(|_| invalid(key, &v))?;
    }
    Ok(())
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn check_url(key: &'static str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl { key, source })
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}
