use std::collections::BTreeSet;
use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

/// Prefix used at string-shaped boundaries to mark a failed call.
pub const ERROR_PREFIX: &str = "Error:";

static REDACTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "api_key",
            Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid api_key regex"),
        ),
        (
            "secret",
            Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
                .expect("invalid secret regex"),
        ),
        (
            "bearer",
            Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        ),
        (
            "sk_token",
            Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
        ),
    ]
});

/// Mask credential-looking fragments, reporting which patterns fired.
pub fn redact_with_report(input: &str) -> (String, BTreeSet<&'static str>) {
    let mut output = input.to_string();
    let mut fired = BTreeSet::new();
    for (name, regex) in REDACTION_PATTERNS.iter() {
        let mut matched = false;
        output = regex
            .replace_all(&output, |caps: &Captures| {
                matched = true;
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .to_string();
        if matched {
            fired.insert(*name);
        }
    }
    (output, fired)
}

pub fn redact(input: &str) -> String {
    redact_with_report(input).0
}

/// Render a failure in the `"Error: <message>"` convention, with secrets masked.
pub fn error_text(err: impl Display) -> String {
    let (message, fired) = redact_with_report(&err.to_string());
    if !fired.is_empty() {
        warn!(patterns = ?fired, "redacted potential secrets from error text");
    }
    format!("{ERROR_PREFIX} {message}")
}

pub fn is_error_text(text: &str) -> bool {
    text.trim_start().starts_with(ERROR_PREFIX)
}
