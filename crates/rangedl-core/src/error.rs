//! Unified error taxonomy (spec §7).
//!
//! Lower layers (curl, storage I/O) use their own error types; this enum is
//! what crosses the library boundary and what the reply channel's error text
//! is ultimately derived from.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RangedlError {
    /// Empty save directory, empty file name, invalid URL — fails before any
    /// network I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// mkdir/open/remove/pre-size failure, before spawning workers or during
    /// worker start.
    #[error("filesystem error: {0}")]
    Filesystem(String),

    /// DNS/TCP/TLS/read errors from the HTTP facade.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx final status (excluding handled 301/302).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// User-initiated cancellation.
    #[error("aborted")]
    Aborted,
}

impl RangedlError {
    /// Text suitable for the single `requestFinished(task, ok, errorText)` event.
    pub fn to_error_text(&self) -> String {
        match self {
            RangedlError::Aborted => "aborted".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_error_text_matches_open_question_decision() {
        assert_eq!(RangedlError::Aborted.to_error_text(), "aborted");
    }

    #[test]
    fn configuration_error_includes_detail() {
        let err = RangedlError::Configuration("save_dir is empty".to_string());
        assert!(err.to_error_text().contains("save_dir is empty"));
    }
}
