//! Error types shared by every layer of the crate.
//!
//! All failures are per-message or per-exchange. None of them poison a key
//! schedule or another peer's exchange, so callers are free to log and carry on.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while encrypting, decrypting or negotiating keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed ciphertext, envelope or text encoding. The message is simply
    /// not decrypted.
    #[error("format error: {0}")]
    Format(String),

    /// Malformed or out-of-range DH1080 token, or a token the exchange was not
    /// expecting. The exchange is marked failed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Empty, oversized or missing key. Raised before any cipher work.
    #[error("key error: {0}")]
    Key(String),

    /// The line is ordinary chat text rather than a FiSH envelope.
    #[error("not a FiSH message")]
    NotFish,
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn key(msg: impl Into<String>) -> Self {
        Error::Key(msg.into())
    }

    /// True for the plain-text classification result, which callers usually
    /// treat as "pass the line through untouched".
    pub fn is_not_fish(&self) -> bool {
        matches!(self, Error::NotFish)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::format("bad length").to_string(),
            "format error: bad length"
        );
        assert_eq!(
            Error::protocol("unexpected token").to_string(),
            "protocol error: unexpected token"
        );
        assert_eq!(Error::key("empty").to_string(), "key error: empty");
        assert_eq!(Error::NotFish.to_string(), "not a FiSH message");
    }

    #[test]
    fn test_is_not_fish() {
        assert!(Error::NotFish.is_not_fish());
        assert!(!Error::format("x").is_not_fish());
    }
}
