//! DH1080 key exchange.
//!
//! DISCLAIMER: DH1080 is unauthenticated. Anyone able to rewrite traffic
//! between two peers can run one exchange with each and read everything that
//! follows. Compare key fingerprints out of band if that matters to you.
//!
//! This module provides:
//! - `group`: the fixed 1080-bit group and constant-shape modular exponentiation
//! - `token`: parsing and printing of `DH1080_INIT` / `DH1080_FINISH` lines
//! - `exchange`: the per-peer state machine deriving a [`SharedKey`]
//!
//! # Examples
//!
//! ```rust
//! use fishcrypt::dh1080::{Dh1080Exchange, ExchangeConfig};
//!
//! let mut alice = Dh1080Exchange::new(ExchangeConfig::default());
//! let mut bob = Dh1080Exchange::new(ExchangeConfig::default());
//!
//! let init = alice.initiate().unwrap();
//! let finish = bob.respond_to_init(&init).unwrap();
//! let key = alice.complete_init(&finish).unwrap();
//! assert_eq!(Some(key), bob.shared_key());
//! ```

pub mod group;
pub use group::{Dh1080Group, PrivateExponent, DH1080_PRIME_BITS, DH1080_PUBLIC_BYTES};

pub mod token;
pub use token::{is_dh1080, Dh1080Token, TokenKind};

pub mod exchange;
pub use exchange::{
    Dh1080Exchange, ExchangeConfig, ExchangeState, PendingExchange, Phase, Role, SharedKey,
};
