//! The DH1080 key-exchange state machine.
//!
//! ```text
//!  Initiator                               Responder
//!  initiate()      -- DH1080_INIT A [CBC] -->
//!                                          respond_to_init()   => Completed
//!                  <-- DH1080_FINISH B [CBC] --
//!  complete_init() => Completed
//! ```
//!
//! The shared key is `SHA-256(peer_public ^ private mod p)`, carried around in
//! its DH1080 base64 form (43 characters) because that string, not the raw
//! digest, is what FiSH clients feed to Blowfish.

use core::fmt;
use core::mem;

use log::{debug, warn};
use num_bigint_dig::BigUint;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::CipherMode;
use crate::codec::dh64_encode;
use crate::dh1080::group::{Dh1080Group, PrivateExponent};
use crate::dh1080::token::{Dh1080Token, TokenKind};
use crate::error::{Error, Result};
use crate::keystore::KeySpec;

/// Length of the derived key digest.
pub const SHARED_KEY_BYTES: usize = 32;

/// Which side of the exchange this party plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Responder,
}

/// Coarse view of [`ExchangeState`], without the payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    AwaitingPeerPublic,
    Completed,
    Failed,
}

impl Phase {
    /// Completed and Failed never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::AwaitingPeerPublic => "awaiting peer public value",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        })
    }
}

/// Configuration for a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Ask for (initiator) CBC mode on the derived key.
    pub cbc: bool,
    /// Also reject peer values outside the prime-order subgroup. Historical
    /// clients draw exponents of either parity, so this breaks interop with
    /// roughly half of their exchanges.
    pub require_subgroup: bool,
    /// Optional RNG seed. Reproducible exponents are only for tests.
    pub seed: Option<u64>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            cbc: true,
            require_subgroup: false,
            seed: None,
        }
    }
}

/// Initiator-side data held between sending INIT and receiving FINISH.
pub struct PendingExchange {
    private: PrivateExponent,
    public: BigUint,
    cbc: bool,
}

impl PendingExchange {
    /// The public value that was sent.
    pub fn public(&self) -> &BigUint {
        &self.public
    }

    /// Whether CBC was requested in the INIT token.
    pub fn requested_cbc(&self) -> bool {
        self.cbc
    }
}

impl fmt::Debug for PendingExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingExchange")
            .field("private", &self.private)
            .field("cbc", &self.cbc)
            .finish_non_exhaustive()
    }
}

/// Full state of an exchange. The private exponent only ever lives inside
/// `AwaitingPeerPublic` and is wiped when the state moves on.
#[derive(Debug)]
pub enum ExchangeState {
    Idle,
    AwaitingPeerPublic(PendingExchange),
    Completed(SharedKey),
    Failed(Error),
}

impl ExchangeState {
    pub fn phase(&self) -> Phase {
        match self {
            ExchangeState::Idle => Phase::Idle,
            ExchangeState::AwaitingPeerPublic(_) => Phase::AwaitingPeerPublic,
            ExchangeState::Completed(_) => Phase::Completed,
            ExchangeState::Failed(_) => Phase::Failed,
        }
    }
}

/// The negotiated symmetric key, ready to hand to a key store.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey {
    digest: [u8; SHARED_KEY_BYTES],
    #[zeroize(skip)]
    mode: CipherMode,
}

impl SharedKey {
    /// Hash the raw Diffie-Hellman secret (minimal big-endian bytes).
    pub(crate) fn from_secret(secret: &BigUint, mode: CipherMode) -> Self {
        let mut bytes = Zeroizing::new(secret.to_bytes_be());
        let digest: [u8; SHARED_KEY_BYTES] = Sha256::digest(bytes.as_slice()).into();
        bytes.zeroize();
        SharedKey { digest, mode }
    }

    pub fn digest(&self) -> &[u8; SHARED_KEY_BYTES] {
        &self.digest
    }

    pub fn mode(&self) -> CipherMode {
        self.mode
    }

    /// The dh64 text of the digest, which is the Blowfish key string.
    pub fn key_text(&self) -> Zeroizing<String> {
        Zeroizing::new(dh64_encode(&self.digest))
    }

    pub fn to_key_spec(&self) -> KeySpec {
        KeySpec::new(&self.key_text(), self.mode)
    }
}

impl PartialEq for SharedKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.digest[..].ct_eq(&other.digest[..])) && self.mode == other.mode
    }
}

impl Eq for SharedKey {}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKey")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// One DH1080 negotiation with one peer.
///
/// Every protocol error moves a live exchange to [`ExchangeState::Failed`];
/// calls on an exchange that has already completed or failed return an error
/// and leave it untouched.
pub struct Dh1080Exchange {
    config: ExchangeConfig,
    rng: ChaCha20Rng,
    role: Option<Role>,
    state: ExchangeState,
}

impl Dh1080Exchange {
    pub fn new(config: ExchangeConfig) -> Self {
        let rng = match config.seed {
            Some(s) => ChaCha20Rng::seed_from_u64(s),
            None => ChaCha20Rng::from_entropy(),
        };
        Dh1080Exchange {
            config,
            rng,
            role: None,
            state: ExchangeState::Idle,
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// `None` until the first operation picks a side.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn shared_key(&self) -> Option<&SharedKey> {
        match &self.state {
            ExchangeState::Completed(key) => Some(key),
            _ => None,
        }
    }

    pub fn into_shared_key(self) -> Option<SharedKey> {
        match self.state {
            ExchangeState::Completed(key) => Some(key),
            _ => None,
        }
    }

    /// Start an exchange as the initiator and return the `DH1080_INIT` line.
    pub fn initiate(&mut self) -> Result<String> {
        self.expect_phase(Phase::Idle, "initiate")?;
        self.role = Some(Role::Initiator);

        let (private, public) = self.generate_keypair();
        let line = Dh1080Token::new(TokenKind::Init, public.clone(), self.config.cbc).to_line();
        self.state = ExchangeState::AwaitingPeerPublic(PendingExchange {
            private,
            public,
            cbc: self.config.cbc,
        });
        debug!("DH1080 exchange initiated (cbc requested: {})", self.config.cbc);
        Ok(line)
    }

    /// Answer a peer's `DH1080_INIT`, completing this side immediately.
    /// Returns the `DH1080_FINISH` line to send back.
    pub fn respond_to_init(&mut self, init_line: &str) -> Result<String> {
        self.expect_phase(Phase::Idle, "respond to DH1080_INIT")?;
        self.role = Some(Role::Responder);

        let token = match self.accept_token(init_line, TokenKind::Init) {
            Ok(token) => token,
            Err(e) => return Err(self.fail_with(e)),
        };

        let (private, public) = self.generate_keypair();
        let mode = if token.cbc {
            CipherMode::Cbc
        } else {
            CipherMode::Ecb
        };
        let key = derive_shared_key(&token.public, &private, mode);
        drop(private);

        let reply = Dh1080Token::new(TokenKind::Finish, public, token.cbc).to_line();
        self.state = ExchangeState::Completed(key);
        debug!("DH1080 exchange completed as responder ({})", mode);
        Ok(reply)
    }

    /// Consume the peer's `DH1080_FINISH` and derive the key.
    pub fn complete_init(&mut self, finish_line: &str) -> Result<&SharedKey> {
        let pending = match mem::replace(&mut self.state, ExchangeState::Idle) {
            ExchangeState::AwaitingPeerPublic(pending) => pending,
            other => {
                self.state = other;
                return Err(self.reject_phase("complete DH1080_FINISH"));
            }
        };

        let token = match self.accept_token(finish_line, TokenKind::Finish) {
            Ok(token) => token,
            Err(e) => return Err(self.fail_with(e)),
        };

        if token.cbc != pending.cbc {
            debug!("peer answered with cbc {}, adopting it", token.cbc);
        }
        let mode = if token.cbc {
            CipherMode::Cbc
        } else {
            CipherMode::Ecb
        };
        let key = derive_shared_key(&token.public, &pending.private, mode);
        drop(pending);

        self.state = ExchangeState::Completed(key);
        debug!("DH1080 exchange completed as initiator ({})", mode);
        self.shared_key()
            .ok_or_else(|| Error::protocol("exchange did not complete"))
    }

    /// Mark a live exchange as failed, e.g. when the caller times it out or a
    /// newer exchange with the same peer replaces it. No-op once terminal.
    pub fn fail(&mut self, reason: Error) {
        if !self.phase().is_terminal() {
            self.fail_with(reason);
        }
    }

    pub fn abandon(&mut self) {
        self.fail(Error::protocol("exchange abandoned"));
    }

    fn generate_keypair(&mut self) -> (PrivateExponent, BigUint) {
        let group = Dh1080Group::get();
        loop {
            let private = group.random_exponent(&mut self.rng);
            let public = group.modpow(group.generator(), private.value());
            if group.is_valid_public(&public) && group.in_prime_order_subgroup(&public) {
                return (private, public);
            }
        }
    }

    fn accept_token(&self, line: &str, expected: TokenKind) -> Result<Dh1080Token> {
        let token = Dh1080Token::parse(line)?;
        if token.kind != expected {
            return Err(Error::protocol(format!(
                "expected {}, got {}",
                expected.command(),
                token.kind.command()
            )));
        }

        let group = Dh1080Group::get();
        if !group.is_valid_public(&token.public) {
            return Err(Error::protocol("peer public value outside [2, p - 2]"));
        }
        if self.config.require_subgroup && !group.in_prime_order_subgroup(&token.public) {
            return Err(Error::protocol(
                "peer public value outside the prime-order subgroup",
            ));
        }
        Ok(token)
    }

    fn expect_phase(&mut self, expected: Phase, action: &str) -> Result<()> {
        if self.phase() == expected {
            Ok(())
        } else {
            Err(self.reject_phase(action))
        }
    }

    fn reject_phase(&mut self, action: &str) -> Error {
        let phase = self.phase();
        let err = Error::protocol(format!("cannot {} while {}", action, phase));
        if phase.is_terminal() {
            err
        } else {
            self.fail_with(err)
        }
    }

    fn fail_with(&mut self, reason: Error) -> Error {
        warn!("DH1080 exchange failed: {}", reason);
        self.state = ExchangeState::Failed(reason.clone());
        reason
    }
}

impl fmt::Debug for Dh1080Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dh1080Exchange")
            .field("config", &self.config)
            .field("role", &self.role)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn derive_shared_key(
    peer_public: &BigUint,
    private: &PrivateExponent,
    mode: CipherMode,
) -> SharedKey {
    let mut secret = Dh1080Group::get().modpow(peer_public, private.value());
    let key = SharedKey::from_secret(&secret, mode);
    secret.zeroize();
    key
}
