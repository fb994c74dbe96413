//! FiSH encryption for IRC.
//!
//! This crate provides:
//! - `cipher`: Blowfish with FiSH's ECB and CBC chaining
//! - `codec`: the FiSH and DH1080 base64 variants and `+OK ` / `mcps ` envelopes
//! - `message`: whole-line encryption and lenient decryption
//! - `dh1080`: the DH1080 key exchange
//! - `keystore` and `session`: per-peer keys and the glue a chat client calls
//!
//! # Examples
//!
//! ```rust
//! use fishcrypt::{FishSession, KeySpec, MemoryKeyStore, PeerId};
//!
//! let mut session = FishSession::new(MemoryKeyStore::new());
//! let peer = PeerId::new("libera", "#fish");
//! session.set_key(&peer, "cbc:hunter2".parse::<KeySpec>().unwrap()).unwrap();
//!
//! let line = session.encrypt_outbound(&peer, "hello").unwrap().unwrap();
//! assert!(line.starts_with("mcps *"));
//! assert_eq!(session.decrypt_inbound(&peer, &line).unwrap().text(), "hello");
//! ```

pub mod cipher;
pub mod codec;
pub mod dh1080;
pub mod error;
pub mod keystore;
pub mod message;
pub mod session;

pub use cipher::{BlockCipher, BlowfishKey, CipherMode};
pub use codec::{Envelope, Prefix};
pub use dh1080::{Dh1080Exchange, ExchangeConfig, SharedKey};
pub use error::{Error, Result};
pub use keystore::{KeySpec, KeyStore, MemoryKeyStore, PeerId};
pub use message::{decrypt_message, encrypt_message};
pub use session::{ExchangeEvent, FishSession, Inbound, SessionConfig};
