//! Block cipher and chaining modes.
//!
//! This module provides:
//! - The Blowfish block cipher (key schedule, single-block encrypt/decrypt)
//! - ECB and CBC chaining with FiSH zero padding and per-message IVs
//!
//! # Examples
//!
//! ```rust
//! use fishcrypt::cipher::{decrypt, encrypt, BlowfishKey, CipherMode};
//!
//! let key = BlowfishKey::new(b"hunter2").unwrap();
//! let ciphertext = encrypt(&key, CipherMode::Cbc, b"hello");
//! assert_eq!(decrypt(&key, CipherMode::Cbc, &ciphertext).unwrap(), b"hello");
//! ```

/// A single cipher block.
pub type Block = [u8; blowfish::BLOWFISH_BLOCK_SIZE];

/// Trait for 64-bit block ciphers the chaining modes run on top of.
pub trait BlockCipher {
    /// Encrypt one block in place.
    fn encrypt_block(&self, block: &mut Block);

    /// Decrypt one block in place.
    fn decrypt_block(&self, block: &mut Block);
}

pub mod blowfish;
pub use blowfish::{BlowfishKey, BLOWFISH_BLOCK_SIZE, BLOWFISH_MAX_KEY_BYTES};

pub mod mode;
pub use mode::{decrypt, encrypt, encrypt_cbc_with_iv, CipherMode};
