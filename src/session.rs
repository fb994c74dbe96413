//! Per-client façade tying keys, messages and key exchanges together.
//!
//! A chat client hands every outbound line to [`FishSession::encrypt_outbound`],
//! every inbound line to [`FishSession::decrypt_inbound`], and every inbound
//! notice starting with `DH1080_` to [`FishSession::handle_exchange`]. Lines for
//! peers without a key pass through untouched.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cipher::{BlowfishKey, CipherMode};
use crate::codec::{Envelope, Prefix};
use crate::dh1080::token::DH1080_FINISH;
use crate::dh1080::{is_dh1080, Dh1080Exchange, ExchangeConfig};
use crate::error::{Error, Result};
use crate::keystore::{KeySpec, KeyStore, PeerId};
use crate::message::{decrypt_envelope, encrypt_message_with_prefix};

/// Session-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Settings for every exchange this session starts or answers.
    pub exchange: ExchangeConfig,
    /// Prefix for outbound CBC lines, [`Prefix::Mcps`] or [`Prefix::Ok`].
    pub cbc_prefix: Prefix,
    /// Treat prefix-less fish64 lines as ECB ciphertext.
    pub accept_bare_ecb: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            exchange: ExchangeConfig::default(),
            cbc_prefix: Prefix::Mcps,
            accept_bare_ecb: false,
        }
    }
}

/// Result of looking at an inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Not encrypted, or no key for this peer; the line as received.
    Plain(String),
    /// Decrypted text. Invalid UTF-8 is replaced, not rejected.
    Decrypted(String),
}

impl Inbound {
    pub fn text(&self) -> &str {
        match self {
            Inbound::Plain(text) | Inbound::Decrypted(text) => text,
        }
    }

    pub fn is_decrypted(&self) -> bool {
        matches!(self, Inbound::Decrypted(_))
    }
}

/// What [`FishSession::handle_exchange`] did with a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// The line was not a DH1080 token.
    NotExchange,
    /// Answered a peer's INIT; `reply` must be sent back. The key is stored.
    Replied { reply: String, mode: CipherMode },
    /// Our own exchange finished and the key is stored.
    Completed { mode: CipherMode },
}

/// Keys, cached key schedules and in-flight exchanges for one client.
pub struct FishSession<S: KeyStore> {
    config: SessionConfig,
    store: S,
    schedules: HashMap<PeerId, (KeySpec, Arc<BlowfishKey>)>,
    exchanges: HashMap<PeerId, Dh1080Exchange>,
    exchanges_started: u64,
}

impl<S: KeyStore> FishSession<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    pub fn with_config(store: S, config: SessionConfig) -> Self {
        FishSession {
            config,
            store,
            schedules: HashMap::new(),
            exchanges: HashMap::new(),
            exchanges_started: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn key_store(&self) -> &S {
        &self.store
    }

    pub fn into_key_store(self) -> S {
        self.store
    }

    /// Validate and store a key for `peer`.
    pub fn set_key(&mut self, peer: &PeerId, key: KeySpec) -> Result<()> {
        let schedule = key.schedule()?;
        self.store.store_key(peer, key.clone())?;
        debug!("key for {} stored ({})", peer, key.mode());
        self.schedules.insert(peer.clone(), (key, Arc::new(schedule)));
        Ok(())
    }

    pub fn remove_key(&mut self, peer: &PeerId) -> Result<Option<KeySpec>> {
        self.schedules.remove(peer);
        self.store.remove_key(peer)
    }

    /// The key schedule for `peer`, built once per key and shared afterwards.
    /// `None` when no key is configured.
    pub fn schedule(&mut self, peer: &PeerId) -> Result<Option<(Arc<BlowfishKey>, CipherMode)>> {
        let Some(spec) = self.store.lookup_key(peer)? else {
            self.schedules.remove(peer);
            return Ok(None);
        };

        if let Some((cached, schedule)) = self.schedules.get(peer) {
            if *cached == spec {
                return Ok(Some((Arc::clone(schedule), spec.mode())));
            }
        }

        let schedule = Arc::new(spec.schedule()?);
        let mode = spec.mode();
        self.schedules.insert(peer.clone(), (spec, Arc::clone(&schedule)));
        Ok(Some((schedule, mode)))
    }

    /// Encrypt a line for `peer`. `Ok(None)` means no key is set and the line
    /// should go out as it is.
    pub fn encrypt_outbound(&mut self, peer: &PeerId, text: &str) -> Result<Option<String>> {
        let Some((schedule, mode)) = self.schedule(peer)? else {
            return Ok(None);
        };
        let prefix = match (mode, self.config.cbc_prefix) {
            (CipherMode::Ecb, _) => Prefix::Ok,
            (CipherMode::Cbc, Prefix::Ok) => Prefix::Ok,
            (CipherMode::Cbc, _) => Prefix::Mcps,
        };
        Ok(Some(encrypt_message_with_prefix(
            schedule.as_ref(),
            mode,
            prefix,
            text.as_bytes(),
        )))
    }

    /// Decrypt a line from `peer`.
    ///
    /// # Errors
    /// [`Error::Format`] when the line is a FiSH envelope that does not decode
    /// under the stored key.
    pub fn decrypt_inbound(&mut self, peer: &PeerId, line: &str) -> Result<Inbound> {
        let envelope = match Envelope::parse_with(line, self.config.accept_bare_ecb) {
            Ok(envelope) => envelope,
            Err(Error::NotFish) => return Ok(Inbound::Plain(line.to_owned())),
            Err(e) => return Err(e),
        };
        let Some((schedule, _)) = self.schedule(peer)? else {
            debug!("no key for {}, leaving encrypted line as is", peer);
            return Ok(Inbound::Plain(line.to_owned()));
        };

        let plain = decrypt_envelope(schedule.as_ref(), &envelope)?;
        Ok(Inbound::Decrypted(String::from_utf8_lossy(&plain).into_owned()))
    }

    /// Begin a key exchange with `peer` and return the `DH1080_INIT` line to
    /// send. An exchange still awaiting this peer's answer is failed and
    /// replaced.
    pub fn start_exchange(&mut self, peer: &PeerId) -> Result<String> {
        self.supersede_pending(peer, "replaced by a new local exchange");

        let mut exchange = self.new_exchange();
        let line = exchange.initiate()?;
        self.exchanges.insert(peer.clone(), exchange);
        info!("DH1080 exchange with {} started", peer);
        Ok(line)
    }

    /// Route an inbound line that may be a DH1080 token.
    ///
    /// # Errors
    /// [`Error::Protocol`] for malformed tokens, out-of-range public values or
    /// a FINISH nobody asked for. A rejected INIT leaves any exchange pending
    /// with `peer` untouched.
    pub fn handle_exchange(&mut self, peer: &PeerId, line: &str) -> Result<ExchangeEvent> {
        if !is_dh1080(line) {
            return Ok(ExchangeEvent::NotExchange);
        }

        if line.split(' ').next() == Some(DH1080_FINISH) {
            let mut exchange = self.exchanges.remove(peer).ok_or_else(|| {
                Error::protocol(format!(
                    "{} from {} without a pending exchange",
                    DH1080_FINISH, peer
                ))
            })?;
            let spec = exchange.complete_init(line)?.to_key_spec();
            let mode = spec.mode();
            self.set_key(peer, spec)?;
            info!("DH1080 exchange with {} completed ({})", peer, mode);
            return Ok(ExchangeEvent::Completed { mode });
        }

        let mut exchange = self.new_exchange();
        let reply = exchange.respond_to_init(line)?;
        let spec = exchange
            .shared_key()
            .map(|key| key.to_key_spec())
            .ok_or_else(|| Error::protocol("exchange answered without a key"))?;

        self.supersede_pending(peer, "superseded by the peer's DH1080_INIT");
        let mode = spec.mode();
        self.set_key(peer, spec)?;
        info!("DH1080 exchange with {} answered ({})", peer, mode);
        Ok(ExchangeEvent::Replied { reply, mode })
    }

    /// The exchange still waiting on `peer`, if any.
    pub fn pending_exchange(&self, peer: &PeerId) -> Option<&Dh1080Exchange> {
        self.exchanges.get(peer)
    }

    /// Drop a pending exchange, e.g. after the caller's timeout. Returns
    /// whether there was one.
    pub fn abandon_exchange(&mut self, peer: &PeerId) -> bool {
        match self.exchanges.remove(peer) {
            Some(mut exchange) => {
                exchange.abandon();
                true
            }
            None => false,
        }
    }

    /// Seeded configs get a distinct seed per exchange so no two exchanges
    /// share a private exponent.
    fn new_exchange(&mut self) -> Dh1080Exchange {
        let mut config = self.config.exchange;
        if let Some(seed) = config.seed {
            config.seed = Some(seed.wrapping_add(self.exchanges_started));
        }
        self.exchanges_started += 1;
        Dh1080Exchange::new(config)
    }

    fn supersede_pending(&mut self, peer: &PeerId, reason: &str) {
        if let Some(mut stale) = self.exchanges.remove(peer) {
            warn!("DH1080 exchange with {} {}", peer, reason);
            stale.fail(Error::protocol(reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dh1080::{Dh1080Token, Phase, TokenKind};
    use crate::keystore::MemoryKeyStore;
    use num_bigint_dig::BigUint;

    fn session() -> FishSession<MemoryKeyStore> {
        FishSession::new(MemoryKeyStore::new())
    }

    fn peer(name: &str) -> PeerId {
        PeerId::new("testnet", name)
    }

    #[test]
    fn test_no_key_passes_through() {
        let mut s = session();
        let bob = peer("bob");
        assert_eq!(s.encrypt_outbound(&bob, "hello").unwrap(), None);
        assert_eq!(
            s.decrypt_inbound(&bob, "+OK 7xL731LkPD1.sjhV7/c2M0e/").unwrap(),
            Inbound::Plain("+OK 7xL731LkPD1.sjhV7/c2M0e/".to_owned())
        );
        assert_eq!(
            s.decrypt_inbound(&bob, "hi there").unwrap(),
            Inbound::Plain("hi there".to_owned())
        );
    }

    #[test]
    fn test_ecb_known_line() {
        let mut s = session();
        let bob = peer("bob");
        s.set_key(&bob, "test".parse().unwrap()).unwrap();
        assert_eq!(
            s.encrypt_outbound(&bob, "Hello, world!").unwrap().as_deref(),
            Some("+OK 7xL731LkPD1.sjhV7/c2M0e/")
        );
        let inbound = s.decrypt_inbound(&bob, "+OK 7xL731LkPD1.sjhV7/c2M0e/").unwrap();
        assert!(inbound.is_decrypted());
        assert_eq!(inbound.text(), "Hello, world!");
    }

    #[test]
    fn test_cbc_prefix_choice() {
        let bob = peer("bob");
        let mut s = session();
        s.set_key(&bob, "cbc:chained".parse().unwrap()).unwrap();
        let line = s.encrypt_outbound(&bob, "hi").unwrap().unwrap();
        assert!(line.starts_with("mcps *"));
        assert_eq!(s.decrypt_inbound(&bob, &line).unwrap().text(), "hi");

        let mut s = FishSession::with_config(
            MemoryKeyStore::new(),
            SessionConfig {
                cbc_prefix: Prefix::Ok,
                ..SessionConfig::default()
            },
        );
        s.set_key(&bob, "cbc:chained".parse().unwrap()).unwrap();
        let line = s.encrypt_outbound(&bob, "hi").unwrap().unwrap();
        assert!(line.starts_with("+OK *"));
    }

    #[test]
    fn test_bad_payload_and_empty_key_rejected() {
        let bob = peer("bob");
        let mut s = session();
        s.set_key(&bob, KeySpec::new("secret", CipherMode::Cbc)).unwrap();
        assert!(matches!(
            s.decrypt_inbound(&bob, "+OK *@@@"),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            s.set_key(&bob, KeySpec::new("", CipherMode::Ecb)),
            Err(Error::Key(_))
        ));
    }

    #[test]
    fn test_bare_ecb_opt_in() {
        let bob = peer("bob");
        let bare = "7xL731LkPD1.sjhV7/c2M0e/";

        let mut strict = session();
        strict.set_key(&bob, "test".parse().unwrap()).unwrap();
        assert_eq!(
            strict.decrypt_inbound(&bob, bare).unwrap(),
            Inbound::Plain(bare.to_owned())
        );

        let mut legacy = FishSession::with_config(
            MemoryKeyStore::new(),
            SessionConfig {
                accept_bare_ecb: true,
                ..SessionConfig::default()
            },
        );
        legacy.set_key(&bob, "test".parse().unwrap()).unwrap();
        assert_eq!(
            legacy.decrypt_inbound(&bob, bare).unwrap(),
            Inbound::Decrypted("Hello, world!".to_owned())
        );
    }

    #[test]
    fn test_schedule_cache_follows_key_changes() {
        let bob = peer("bob");
        let mut s = session();
        s.set_key(&bob, "one".parse().unwrap()).unwrap();
        let (first, _) = s.schedule(&bob).unwrap().unwrap();
        let (again, _) = s.schedule(&bob).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        s.set_key(&bob, "two".parse().unwrap()).unwrap();
        let (second, _) = s.schedule(&bob).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        assert!(s.remove_key(&bob).unwrap().is_some());
        assert!(s.schedule(&bob).unwrap().is_none());
        assert_eq!(s.encrypt_outbound(&bob, "x").unwrap(), None);
    }

    #[test]
    fn test_exchange_between_sessions() {
        let mut alice = session();
        let mut bob = session();
        let (a_view, b_view) = (peer("bob"), peer("alice"));

        let init = alice.start_exchange(&a_view).unwrap();
        assert_eq!(
            alice.pending_exchange(&a_view).map(|e| e.phase()),
            Some(Phase::AwaitingPeerPublic)
        );

        let reply = match bob.handle_exchange(&b_view, &init).unwrap() {
            ExchangeEvent::Replied { reply, mode } => {
                assert_eq!(mode, CipherMode::Cbc);
                reply
            }
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(
            alice.handle_exchange(&a_view, &reply).unwrap(),
            ExchangeEvent::Completed {
                mode: CipherMode::Cbc
            }
        );
        assert!(alice.pending_exchange(&a_view).is_none());

        let a_key = alice.key_store().lookup_key(&a_view).unwrap().unwrap();
        let b_key = bob.key_store().lookup_key(&b_view).unwrap().unwrap();
        assert_eq!(a_key, b_key);
        assert_eq!(a_key.key().len(), 43);

        let line = alice.encrypt_outbound(&a_view, "over the wire").unwrap().unwrap();
        assert_eq!(
            bob.decrypt_inbound(&b_view, &line).unwrap(),
            Inbound::Decrypted("over the wire".to_owned())
        );
    }

    #[test]
    fn test_unexpected_finish_and_non_tokens() {
        let mut s = session();
        let bob = peer("bob");
        assert_eq!(
            s.handle_exchange(&bob, "+OK abc").unwrap(),
            ExchangeEvent::NotExchange
        );

        let mut other = session();
        let init = other.start_exchange(&bob).unwrap();
        let mut responder = session();
        let finish = match responder.handle_exchange(&bob, &init).unwrap() {
            ExchangeEvent::Replied { reply, .. } => reply,
            other => panic!("unexpected event {:?}", other),
        };
        assert!(matches!(
            s.handle_exchange(&bob, &finish),
            Err(Error::Protocol(_))
        ));
        assert!(s.key_store().lookup_key(&bob).unwrap().is_none());
    }

    #[test]
    fn test_restart_and_peer_init_replace_pending() {
        let mut s = session();
        let bob = peer("bob");
        let first = s.start_exchange(&bob).unwrap();
        let second = s.start_exchange(&bob).unwrap();
        assert_ne!(first, second);

        // the peer's own INIT wins over our pending one
        let mut peer_side = session();
        let their_init = peer_side.start_exchange(&peer("me")).unwrap();
        assert!(matches!(
            s.handle_exchange(&bob, &their_init).unwrap(),
            ExchangeEvent::Replied { .. }
        ));
        assert!(s.pending_exchange(&bob).is_none());
        assert!(s.key_store().lookup_key(&bob).unwrap().is_some());
    }

    #[test]
    fn test_bad_init_stores_nothing() {
        let mut s = session();
        let bob = peer("bob");
        assert!(matches!(
            s.handle_exchange(&bob, "DH1080_INIT !!"),
            Err(Error::Protocol(_))
        ));
        assert!(s.key_store().lookup_key(&bob).unwrap().is_none());

        s.start_exchange(&bob).unwrap();
        assert!(s.abandon_exchange(&bob));
        assert!(!s.abandon_exchange(&bob));
    }

    #[test]
    fn test_rejected_init_keeps_pending_exchange() {
        let mut s = session();
        let bob = peer("bob");
        let init = s.start_exchange(&bob).unwrap();
        let mut responder = session();
        let finish = match responder.handle_exchange(&peer("me"), &init).unwrap() {
            ExchangeEvent::Replied { reply, .. } => reply,
            other => panic!("unexpected event {:?}", other),
        };

        let out_of_range = Dh1080Token::new(TokenKind::Init, BigUint::from(1u32), true).to_line();
        for junk in ["DH1080_INIT !!", "DH1080_REKEY abcd", out_of_range.as_str()] {
            assert!(matches!(
                s.handle_exchange(&bob, junk),
                Err(Error::Protocol(_))
            ));
            assert_eq!(
                s.pending_exchange(&bob).map(|e| e.phase()),
                Some(Phase::AwaitingPeerPublic)
            );
        }

        assert_eq!(
            s.handle_exchange(&bob, &finish).unwrap(),
            ExchangeEvent::Completed {
                mode: CipherMode::Cbc
            }
        );
        assert_eq!(
            s.key_store().lookup_key(&bob).unwrap(),
            responder.key_store().lookup_key(&peer("me")).unwrap()
        );
    }

    #[test]
    fn test_seeded_sessions_vary_per_exchange() {
        let config = SessionConfig {
            exchange: ExchangeConfig {
                seed: Some(42),
                ..ExchangeConfig::default()
            },
            ..SessionConfig::default()
        };
        let mut s = FishSession::with_config(MemoryKeyStore::new(), config);
        let first = s.start_exchange(&peer("bob")).unwrap();
        let second = s.start_exchange(&peer("carol")).unwrap();
        assert_ne!(first, second);

        // same seed, same sequence
        let mut again = FishSession::with_config(MemoryKeyStore::new(), config);
        assert_eq!(again.start_exchange(&peer("bob")).unwrap(), first);
    }
}
