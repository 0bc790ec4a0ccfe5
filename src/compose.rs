// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Notification email composition.
//!
//! Field values are HTML-escaped unless `escape_html` is turned off, in
//! which case they are interpolated raw and a submitter can inject markup
//! into the recipient's mail client.

use crate::config::RelayConfig;
use crate::relay::OutboundEmail;
use crate::submission::Submission;
use chrono::{DateTime, Utc};
use std::borrow::Cow;

const NOT_PROVIDED: &str = "Not provided";

/// Subject line for a forwarded submission.
pub fn subject_line(submission: &Submission) -> String {
    let subject: String = submission
        .subject()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    format!("New Contact: {subject}")
}

/// Build the message handed to the relay.
pub fn compose(
    submission: &Submission,
    client_id: &str,
    submitted_at: DateTime<Utc>,
    config: &RelayConfig,
) -> OutboundEmail {
    OutboundEmail {
        sender: config.sender.clone(),
        recipients: config.recipients.clone(),
        subject: subject_line(submission),
        html_body: render_html(submission, client_id, submitted_at, config),
        reply_to: submission.email().to_string(),
    }
}

/// Relay smoke-test message addressed to the configured recipients.
pub fn test_message(config: &RelayConfig, sent_at: DateTime<Utc>) -> OutboundEmail {
    let recipients = escape_html(&config.recipients.join(", ")).into_owned();
    let html_body = format!(
        r#"<html>
<body>
    <h2>Test Email</h2>
    <p>This is a test email from the {site} contact form relay.</p>
    <p><strong>If you received this, the email configuration is working correctly!</strong></p>
    <hr>
    <p style="color: #666; font-size: 12px;">
        Sent on: {sent_at}<br>
        From: {sender}<br>
        To: {recipients}
    </p>
</body>
</html>"#,
        site = escape_html(&config.site_name),
        sent_at = sent_at.format("%B %d, %Y at %I:%M %p UTC"),
        sender = escape_html(&config.sender),
    );

    OutboundEmail {
        sender: config.sender.clone(),
        recipients: config.recipients.clone(),
        subject: format!("Test Email from {} Contact Form", config.site_name),
        html_body,
        reply_to: config.sender.clone(),
    }
}

/// Render the HTML body.
pub fn render_html(
    submission: &Submission,
    client_id: &str,
    submitted_at: DateTime<Utc>,
    config: &RelayConfig,
) -> String {
    let field = |value: &str| -> String {
        if config.escape_html {
            escape_html(value).into_owned()
        } else {
            value.to_string()
        }
    };
    let or_not_provided = |value: &str| {
        if value.is_empty() {
            NOT_PROVIDED.to_string()
        } else {
            field(value)
        }
    };

    let name = field(submission.name());
    let email = field(submission.email());
    let phone = or_not_provided(submission.phone());
    let company = or_not_provided(submission.company());
    let subject = field(submission.subject());
    let message = field(submission.message());
    let client = field(client_id);
    let site = escape_html(&config.site_name);
    let when = submitted_at.format("%B %d, %Y at %I:%M %p UTC");

    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
        <h2 style="color: #1a365d; border-bottom: 3px solid #d4af37; padding-bottom: 10px;">
            New Contact Form Submission
        </h2>

        <div style="background-color: #f8f9fa; padding: 20px; border-radius: 5px; margin: 20px 0;">
            <p><strong>Name:</strong> {name}</p>
            <p><strong>Email:</strong> <a href="mailto:{email}">{email}</a></p>
            <p><strong>Phone:</strong> {phone}</p>
            <p><strong>Company:</strong> {company}</p>
            <p><strong>Subject:</strong> {subject}</p>
        </div>

        <div style="margin: 20px 0;">
            <h3 style="color: #1a365d;">Message:</h3>
            <p style="background-color: #fff; padding: 15px; border-left: 4px solid #d4af37; border-radius: 3px;">
                {message}
            </p>
        </div>

        <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #ddd; font-size: 12px; color: #666;">
            <p>Submitted via {site} Contact Form</p>
            <p>Submitted on: {when}</p>
            <p>IP Address: {client}</p>
        </div>
    </div>
</body>
</html>
"#
    )
}

/// Escape the five HTML-significant characters.
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
