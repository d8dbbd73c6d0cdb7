//! Log Redaction Layer
//!
//! Scrubs Telegram bot tokens and bearer credentials from strings prior to
//! logging. Transport errors embed request URLs, and Telegram request URLs
//! embed the bot token.

use regex::Regex;
use std::sync::LazyLock;

static BOT_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{6,}:[A-Za-z0-9_-]{30,}").expect("bot token pattern"));
static BEARER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[a-zA-Z0-9\-\._~+/]+=*").expect("bearer pattern"));

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = BOT_TOKEN_RE.replace_all(input, "[REDACTED_TOKEN]");
    BEARER_RE.replace_all(&redacted, "[REDACTED_TOKEN]").into_owned()
}
