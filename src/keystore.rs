//! Per-peer key configuration and the storage seam around it.
//!
//! Keys are stored as text, the same way FiSH clients persist them, with a
//! `cbc:` prefix selecting CBC mode:
//!
//! ```rust
//! use fishcrypt::cipher::CipherMode;
//! use fishcrypt::keystore::KeySpec;
//!
//! let spec: KeySpec = "cbc:correct horse".parse().unwrap();
//! assert_eq!(spec.mode(), CipherMode::Cbc);
//! assert_eq!(spec.key(), "correct horse");
//! ```

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

use zeroize::Zeroizing;

use crate::cipher::{BlowfishKey, CipherMode, BLOWFISH_MAX_KEY_BYTES};
use crate::error::{Error, Result};

/// Prefix marking a stored key as CBC.
pub const CBC_KEY_PREFIX: &str = "cbc:";

/// Case-insensitive identity of a conversation: a network plus a nick or
/// channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(network: &str, target: &str) -> Self {
        PeerId(format!("{}/{}", network, target).to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A key string and the chaining mode bound to it.
#[derive(Clone, PartialEq, Eq)]
pub struct KeySpec {
    key: Zeroizing<String>,
    mode: CipherMode,
}

impl KeySpec {
    pub fn new(key: &str, mode: CipherMode) -> Self {
        KeySpec {
            key: Zeroizing::new(key.to_owned()),
            mode,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// Run the Blowfish key schedule. Key text beyond 72 bytes is ignored, as
    /// every FiSH client does.
    ///
    /// # Errors
    /// [`Error::Key`] for an empty key.
    pub fn schedule(&self) -> Result<BlowfishKey> {
        let bytes = self.key.as_bytes();
        if bytes.is_empty() {
            return Err(Error::key("key is empty"));
        }
        BlowfishKey::new(&bytes[..bytes.len().min(BLOWFISH_MAX_KEY_BYTES)])
    }
}

impl FromStr for KeySpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (mode, key) = match s.strip_prefix(CBC_KEY_PREFIX) {
            Some(rest) => (CipherMode::Cbc, rest),
            None => (CipherMode::Ecb, s),
        };
        if key.is_empty() {
            return Err(Error::key("key is empty"));
        }
        Ok(KeySpec::new(key, mode))
    }
}

/// The persisted form, secret included.
impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode.is_cbc() {
            f.write_str(CBC_KEY_PREFIX)?;
        }
        f.write_str(&self.key)
    }
}

impl fmt::Debug for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySpec")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Where per-peer keys live. Implementations may persist them anywhere; a
/// failing backend reports [`Error::Key`].
pub trait KeyStore {
    fn lookup_key(&self, peer: &PeerId) -> Result<Option<KeySpec>>;

    fn store_key(&mut self, peer: &PeerId, key: KeySpec) -> Result<()>;

    /// Returns the removed key, if there was one.
    fn remove_key(&mut self, peer: &PeerId) -> Result<Option<KeySpec>>;
}

/// In-process [`KeyStore`].
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: HashMap<PeerId, KeySpec>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.keys.keys()
    }
}

impl KeyStore for MemoryKeyStore {
    fn lookup_key(&self, peer: &PeerId) -> Result<Option<KeySpec>> {
        Ok(self.keys.get(peer).cloned())
    }

    fn store_key(&mut self, peer: &PeerId, key: KeySpec) -> Result<()> {
        self.keys.insert(peer.clone(), key);
        Ok(())
    }

    fn remove_key(&mut self, peer: &PeerId) -> Result<Option<KeySpec>> {
        Ok(self.keys.remove(peer))
    }
}
