// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Contact Form Relay
//!
//! This crate receives website contact form submissions, runs them through
//! an ordered anti-abuse pipeline and relays accepted messages to the site
//! owners through an email API:
//!
//! - Per-client rate limiting (3 submissions per hour default)
//! - Honeypot field detection
//! - Required field and email shape validation
//! - Fill-time heuristic for bot-speed submissions
//! - External anti-abuse token verification (reCAPTCHA compatible)
//! - HTML notification email delivered via SendGrid

pub mod compose;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod handlers;
pub mod relay;
pub mod store;
pub mod submission;
pub mod verifier;

pub use config::Config;
pub use gatekeeper::{Decision, Gatekeeper, Policy};
pub use store::{MemoryRateStore, RateStore};
pub use submission::Submission;
