//! Binary-to-text encodings used on the FiSH wire.
//!
//! This module provides:
//! - `fish64`: the FiSH base64 variant carrying ECB ciphertext
//! - `dh64`: the DH1080 base64 variant carrying public values and derived keys
//! - `envelope`: the `+OK ` / `mcps ` framing that marks a line as encrypted
//!
//! # Examples
//!
//! ```rust
//! use fishcrypt::codec::{fish64_decode, fish64_encode};
//!
//! let text = fish64_encode(&[0xff; 8]);
//! assert_eq!(text, "ZZZZZ1ZZZZZ1");
//! assert_eq!(fish64_decode(&text).unwrap(), vec![0xff; 8]);
//! ```

use crate::error::Result;

/// Trait for the reversible binary-to-text transforms in this module.
pub trait TextEncoding {
    /// Encode arbitrary bytes to text.
    fn encode(&self, data: &[u8]) -> String;

    /// Decode text produced by [`TextEncoding::encode`].
    fn decode(&self, text: &str) -> Result<Vec<u8>>;
}

pub mod fish64;
pub use fish64::{fish64_decode, fish64_encode, Fish64, FISH64_ALPHABET};

pub mod dh64;
pub use dh64::{dh64_decode, dh64_encode, Dh64};

pub mod envelope;
pub use envelope::{unwrap_envelope, wrap_envelope, Envelope, Prefix, CBC_MARKER};
