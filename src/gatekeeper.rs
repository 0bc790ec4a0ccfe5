// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission gatekeeper.
//!
//! Runs the enabled checks in a fixed order and stops at the first one that
//! fails:
//!
//! 1. Per-client rate limit (mutates the rate store)
//! 2. Honeypot field
//! 3. Required fields
//! 4. Email shape
//! 5. Fill-time heuristic
//! 6. External token verification
//!
//! Which checks run is decided by a [`Policy`].

use crate::config::{AntiAbuseConfig, FastFillAction, PolicyKind};
use crate::store::{RateOutcome, RateStore};
use crate::submission::Submission;
use crate::verifier::TokenVerifier;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Set of checks a gatekeeper runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub rate_limit: bool,
    pub honeypot: bool,
    pub required_fields: bool,
    pub email_shape: bool,
    pub fill_time: bool,
    pub token_verification: bool,
}

impl Policy {
    /// Required fields plus external token verification.
    pub fn verified() -> Self {
        Self {
            rate_limit: false,
            honeypot: false,
            required_fields: true,
            email_shape: false,
            fill_time: false,
            token_verification: true,
        }
    }

    /// Rate limit, honeypot, required fields, email shape and fill time.
    pub fn heuristic() -> Self {
        Self {
            rate_limit: true,
            honeypot: true,
            required_fields: true,
            email_shape: true,
            fill_time: true,
            token_verification: false,
        }
    }

    /// Every check.
    pub fn strict() -> Self {
        Self {
            token_verification: true,
            ..Self::heuristic()
        }
    }
}

impl From<PolicyKind> for Policy {
    fn from(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::Verified => Self::verified(),
            PolicyKind::Heuristic => Self::heuristic(),
            PolicyKind::Strict => Self::strict(),
        }
    }
}

/// Why a submission was accepted but dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionReason {
    Honeypot,
    FastFill,
}

/// Why token verification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntiAbuseFailure {
    /// The verification service said no (or could not be reached)
    TokenRejected,
    /// No token supplied, or no secret configured to check it with
    TokenMissing,
}

/// Outcome of evaluating one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward to the email relay
    Accept,
    /// Report success to the caller but drop the message
    SilentAccept { reason: SuppressionReason },
    RejectRateLimited { retry_after: Duration },
    RejectMissingFields,
    RejectInvalidEmail,
    RejectAntiAbuseFailed { reason: AntiAbuseFailure },
    RejectSuspiciousTiming,
}

impl Decision {
    /// Whether the message should be handed to the relay.
    pub fn delivers(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

/// Coarse email shape check: an `@` and a `.` somewhere.
pub fn has_email_shape(email: &str) -> bool {
    email.contains('@') && email.contains('.')
}

/// A reported fill time strictly between zero and the minimum is bot-like.
pub fn is_fast_fill(elapsed_ms: Option<f64>, min_fill_time_ms: u64) -> bool {
    matches!(elapsed_ms, Some(ms) if ms > 0.0 && ms < min_fill_time_ms as f64)
}

/// Decides what happens to each submission.
pub struct Gatekeeper {
    policy: Policy,
    anti_abuse: AntiAbuseConfig,
    store: Arc<dyn RateStore>,
    verifier: Arc<dyn TokenVerifier>,
}

impl Gatekeeper {
    pub fn new(
        policy: Policy,
        anti_abuse: AntiAbuseConfig,
        store: Arc<dyn RateStore>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            policy,
            anti_abuse,
            store,
            verifier,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn RateStore> {
        &self.store
    }

    /// Count an attempt from `client_id` against its quota.
    ///
    /// Returns the rejection when the client is over the limit. A no-op
    /// when the policy has no rate limit.
    pub async fn throttle(&self, client_id: &str, now: DateTime<Utc>) -> Option<Decision> {
        if !self.policy.rate_limit {
            return None;
        }
        match self.store.hit(client_id, now).await {
            RateOutcome::Limited { retry_after } => {
                warn!(%client_id, "Rate limit exceeded");
                Some(Decision::RejectRateLimited { retry_after })
            }
            RateOutcome::Admitted { .. } => None,
        }
    }

    /// Evaluate a submission from `client_id` received at `now`.
    pub async fn evaluate(
        &self,
        submission: &Submission,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Decision {
        if let Some(rejection) = self.throttle(client_id, now).await {
            return rejection;
        }

        if self.policy.honeypot && submission.honeypot_filled() {
            warn!(%client_id, "Honeypot triggered");
            return Decision::SilentAccept {
                reason: SuppressionReason::Honeypot,
            };
        }

        if self.policy.required_fields {
            let missing = submission.missing_fields();
            if !missing.is_empty() {
                info!(%client_id, ?missing, "Missing required fields");
                return Decision::RejectMissingFields;
            }
        }

        if self.policy.email_shape && !has_email_shape(submission.email()) {
            info!(%client_id, "Invalid email address");
            return Decision::RejectInvalidEmail;
        }

        if self.policy.fill_time
            && is_fast_fill(submission.elapsed_fill_time_ms, self.anti_abuse.min_fill_time_ms)
        {
            warn!(
                %client_id,
                elapsed_ms = ?submission.elapsed_fill_time_ms,
                "Suspiciously fast submission"
            );
            return match self.anti_abuse.fast_fill_action {
                FastFillAction::Silent => Decision::SilentAccept {
                    reason: SuppressionReason::FastFill,
                },
                FastFillAction::Reject => Decision::RejectSuspiciousTiming,
            };
        }

        if self.policy.token_verification {
            if let Some(reason) = self.verify_token(submission, client_id).await {
                return Decision::RejectAntiAbuseFailed { reason };
            }
        }

        debug!(%client_id, "Submission accepted");
        Decision::Accept
    }

    async fn verify_token(&self, submission: &Submission, client_id: &str) -> Option<AntiAbuseFailure> {
        if self.anti_abuse.skip_verification {
            debug!(%client_id, "Token verification bypassed");
            return None;
        }

        let secret = self
            .anti_abuse
            .verification_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        match (secret, submission.anti_abuse_token()) {
            (Some(secret), Some(token)) => {
                if self.verifier.verify(token, secret).await {
                    None
                } else {
                    warn!(%client_id, "Token verification failed");
                    Some(AntiAbuseFailure::TokenRejected)
                }
            }
            (secret, token) => {
                warn!(
                    %client_id,
                    secret_configured = secret.is_some(),
                    token_supplied = token.is_some(),
                    "No token/secret pair for verification"
                );
                Some(AntiAbuseFailure::TokenMissing)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::store::MemoryRateStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedVerifier {
        answer: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenVerifier for FixedVerifier {
        async fn verify(&self, _token: &str, _secret: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn verifier(answer: bool) -> Arc<FixedVerifier> {
        Arc::new(FixedVerifier {
            answer,
            calls: AtomicUsize::new(0),
        })
    }

    fn gatekeeper(policy: Policy, anti_abuse: AntiAbuseConfig, verifier: Arc<FixedVerifier>) -> Gatekeeper {
        let store = Arc::new(MemoryRateStore::new(&RateLimitConfig::default()));
        Gatekeeper::new(policy, anti_abuse, store, verifier)
    }

    fn heuristic() -> Gatekeeper {
        gatekeeper(Policy::heuristic(), AntiAbuseConfig::default(), verifier(true))
    }

    fn valid() -> Submission {
        Submission {
            name: Some("Jane Doe".into()),
            email: Some("jane@example.com".into()),
            message: Some("Hello".into()),
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_missing_fields_regardless_of_other_fields() {
        let gk = heuristic();
        let cases = [
            Submission { name: None, ..valid() },
            Submission { email: Some("   ".into()), ..valid() },
            Submission {
                message: Some("\n\t".into()),
                phone: Some("555".into()),
                subject: Some("Hi".into()),
                ..valid()
            },
        ];

        for (i, sub) in cases.iter().enumerate() {
            let decision = gk.evaluate(sub, &format!("client-{i}"), now()).await;
            assert_eq!(decision, Decision::RejectMissingFields);
        }
    }

    #[tokio::test]
    async fn test_email_shape() {
        let gk = heuristic();
        for (i, email) in ["jane.example.com", "jane@example", "jane"].iter().enumerate() {
            let sub = Submission {
                email: Some(email.to_string()),
                ..valid()
            };
            assert_eq!(
                gk.evaluate(&sub, &format!("c{i}"), now()).await,
                Decision::RejectInvalidEmail
            );
        }
        assert!(has_email_shape("a@b.c"));
    }

    #[tokio::test]
    async fn test_fourth_submission_rate_limited_then_resets() {
        let gk = heuristic();

        for minute in [0, 10, 20] {
            let at = now() + Duration::minutes(minute);
            assert_eq!(gk.evaluate(&valid(), "198.51.100.4", at).await, Decision::Accept);
        }
        assert!(matches!(
            gk.evaluate(&valid(), "198.51.100.4", now() + Duration::minutes(30)).await,
            Decision::RejectRateLimited { .. }
        ));

        let later = now() + Duration::minutes(20) + Duration::hours(1);
        assert_eq!(gk.evaluate(&valid(), "198.51.100.4", later).await, Decision::Accept);
        assert_eq!(gk.store().get("198.51.100.4").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_rejected_submissions_still_consume_quota() {
        let gk = heuristic();
        let empty = Submission::default();

        for _ in 0..3 {
            assert_eq!(gk.evaluate(&empty, "client", now()).await, Decision::RejectMissingFields);
        }
        assert!(matches!(
            gk.evaluate(&valid(), "client", now()).await,
            Decision::RejectRateLimited { .. }
        ));
    }

    #[tokio::test]
    async fn test_honeypot_silently_accepts_before_validation() {
        let gk = heuristic();
        let sub = Submission {
            honeypot: Some("http://spam.example".into()),
            email: Some("not-an-email".into()),
            ..valid()
        };
        assert_eq!(
            gk.evaluate(&sub, "bot", now()).await,
            Decision::SilentAccept {
                reason: SuppressionReason::Honeypot
            }
        );
    }

    #[tokio::test]
    async fn test_throttle_counts_attempts_without_a_submission() {
        let gk = heuristic();
        for _ in 0..3 {
            assert_eq!(gk.throttle("garbage", now()).await, None);
        }
        assert!(matches!(
            gk.evaluate(&valid(), "garbage", now()).await,
            Decision::RejectRateLimited { .. }
        ));

        let gk = gatekeeper(Policy::verified(), AntiAbuseConfig::default(), verifier(true));
        assert_eq!(gk.throttle("garbage", now()).await, None);
        assert!(gk.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_honeypot_catches_any_non_empty_value() {
        let gk = heuristic();
        let filled = [
            serde_json::json!(" "),
            serde_json::json!(["x"]),
            serde_json::json!({ "a": 1 }),
            serde_json::json!(1),
            serde_json::json!(true),
        ];
        for (i, website) in filled.into_iter().enumerate() {
            let sub = Submission {
                honeypot: Some(website.clone()),
                ..valid()
            };
            assert_eq!(
                gk.evaluate(&sub, &format!("bot-{i}"), now()).await,
                Decision::SilentAccept {
                    reason: SuppressionReason::Honeypot
                },
                "website = {website}"
            );
        }

        let sub = Submission {
            honeypot: Some(serde_json::json!(0)),
            ..valid()
        };
        assert_eq!(gk.evaluate(&sub, "human", now()).await, Decision::Accept);
    }

    #[tokio::test]
    async fn test_fill_time_heuristic() {
        let gk = heuristic();

        let fast = Submission {
            elapsed_fill_time_ms: Some(500.0),
            ..valid()
        };
        assert_eq!(
            gk.evaluate(&fast, "a", now()).await,
            Decision::SilentAccept {
                reason: SuppressionReason::FastFill
            }
        );

        let human = Submission {
            elapsed_fill_time_ms: Some(5000.0),
            ..valid()
        };
        assert_eq!(gk.evaluate(&human, "b", now()).await, Decision::Accept);

        // Zero means "not reported"
        let unreported = Submission {
            elapsed_fill_time_ms: Some(0.0),
            ..valid()
        };
        assert_eq!(gk.evaluate(&unreported, "c", now()).await, Decision::Accept);
        assert!(!is_fast_fill(Some(3000.0), 3000));
    }

    #[tokio::test]
    async fn test_fast_fill_can_reject() {
        let gk = gatekeeper(
            Policy::heuristic(),
            AntiAbuseConfig {
                fast_fill_action: FastFillAction::Reject,
                ..Default::default()
            },
            verifier(true),
        );
        let fast = Submission {
            elapsed_fill_time_ms: Some(1200.0),
            ..valid()
        };
        assert_eq!(gk.evaluate(&fast, "a", now()).await, Decision::RejectSuspiciousTiming);
    }

    fn with_secret() -> AntiAbuseConfig {
        AntiAbuseConfig {
            verification_secret: Some("s3cret".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_verified_policy_calls_verifier() {
        let v = verifier(true);
        let gk = gatekeeper(Policy::verified(), with_secret(), v.clone());
        let sub = Submission {
            captcha: Some("token".into()),
            ..valid()
        };

        assert_eq!(gk.evaluate(&sub, "a", now()).await, Decision::Accept);
        assert_eq!(v.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verifier_rejection() {
        let gk = gatekeeper(Policy::verified(), with_secret(), verifier(false));
        let sub = Submission {
            recaptcha_token: Some("forged".into()),
            ..valid()
        };
        assert_eq!(
            gk.evaluate(&sub, "a", now()).await,
            Decision::RejectAntiAbuseFailed {
                reason: AntiAbuseFailure::TokenRejected
            }
        );
    }

    #[tokio::test]
    async fn test_verification_fails_closed_without_token_or_secret() {
        let v = verifier(true);
        let gk = gatekeeper(Policy::verified(), with_secret(), v.clone());
        assert_eq!(
            gk.evaluate(&valid(), "a", now()).await,
            Decision::RejectAntiAbuseFailed {
                reason: AntiAbuseFailure::TokenMissing
            }
        );

        let gk = gatekeeper(Policy::verified(), AntiAbuseConfig::default(), v.clone());
        let sub = Submission {
            captcha: Some("token".into()),
            ..valid()
        };
        assert_eq!(
            gk.evaluate(&sub, "a", now()).await,
            Decision::RejectAntiAbuseFailed {
                reason: AntiAbuseFailure::TokenMissing
            }
        );
        assert_eq!(v.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bypass_skips_verification() {
        let v = verifier(false);
        let gk = gatekeeper(
            Policy::verified(),
            AntiAbuseConfig {
                skip_verification: true,
                ..Default::default()
            },
            v.clone(),
        );
        assert_eq!(gk.evaluate(&valid(), "a", now()).await, Decision::Accept);
        assert_eq!(v.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_verified_policy_has_no_rate_limit_or_shape_check() {
        let gk = gatekeeper(
            Policy::verified(),
            AntiAbuseConfig {
                skip_verification: true,
                ..Default::default()
            },
            verifier(true),
        );
        let sub = Submission {
            email: Some("no-at-sign".into()),
            ..valid()
        };
        for _ in 0..5 {
            assert_eq!(gk.evaluate(&sub, "a", now()).await, Decision::Accept);
        }
        assert!(gk.store().is_empty().await);
    }

    #[test]
    fn test_strict_policy_enables_everything() {
        let p = Policy::from(PolicyKind::Strict);
        assert!(p.rate_limit && p.honeypot && p.required_fields);
        assert!(p.email_shape && p.fill_time && p.token_verification);
    }
}
