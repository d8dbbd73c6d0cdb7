//! Structured logging for CorpseWatch: console plus daily-rolling JSON file,
//! and scrubbing of credentials from strings before they are logged.

pub mod logger;
pub mod redact;

pub use logger::init_logger;
pub use redact::redact_sensitive_data;
