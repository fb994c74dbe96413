//! `DH1080_INIT` / `DH1080_FINISH` wire tokens.
//!
//! ```text
//! DH1080_INIT <dh64 public value> [CBC]
//! DH1080_INIT_CBC <dh64 public value>
//! DH1080_FINISH <dh64 public value> [CBC]
//! ```
//!
//! Public values are written as modulus-sized (135 byte) big-endian integers.
//! Range checks belong to the exchange, not the parser.

use core::fmt;

use num_bigint_dig::BigUint;

use crate::codec::{dh64_decode, dh64_encode};
use crate::dh1080::group::Dh1080Group;
use crate::error::{Error, Result};

pub const DH1080_INIT: &str = "DH1080_INIT";
/// Legacy spelling some clients use to request CBC.
pub const DH1080_INIT_CBC: &str = "DH1080_INIT_CBC";
pub const DH1080_FINISH: &str = "DH1080_FINISH";
/// Trailing flag requesting or confirming CBC mode.
pub const CBC_FLAG: &str = "CBC";

const TOKEN_PREFIX: &str = "DH1080_";

/// Which half of the exchange a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Init,
    Finish,
}

impl TokenKind {
    pub fn command(self) -> &'static str {
        match self {
            TokenKind::Init => DH1080_INIT,
            TokenKind::Finish => DH1080_FINISH,
        }
    }
}

/// A parsed key-exchange token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dh1080Token {
    pub kind: TokenKind,
    pub public: BigUint,
    pub cbc: bool,
}

impl Dh1080Token {
    pub fn new(kind: TokenKind, public: BigUint, cbc: bool) -> Self {
        Dh1080Token { kind, public, cbc }
    }

    /// Parse a token line.
    ///
    /// # Errors
    /// [`Error::Protocol`] for an unknown command, a missing or undecodable
    /// public value, or an empty value.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.trim_end().split(' ');
        let command = fields.next().unwrap_or_default();
        let (kind, legacy_cbc) = match command {
            DH1080_INIT => (TokenKind::Init, false),
            DH1080_INIT_CBC => (TokenKind::Init, true),
            DH1080_FINISH => (TokenKind::Finish, false),
            other if other.starts_with(TOKEN_PREFIX) => {
                return Err(Error::protocol(format!("unknown command {:?}", other)))
            }
            _ => return Err(Error::protocol("not a DH1080 token")),
        };

        let raw = fields
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::protocol(format!("{} carries no public value", command)))?;
        let bytes = dh64_decode(raw)
            .map_err(|e| Error::protocol(format!("undecodable public value: {}", e)))?;
        if bytes.iter().all(|&b| b == 0) {
            return Err(Error::protocol("public value is zero"));
        }

        let cbc = legacy_cbc || fields.any(|f| f == CBC_FLAG);
        Ok(Dh1080Token {
            kind,
            public: BigUint::from_bytes_be(&bytes),
            cbc,
        })
    }

    /// Serialize for the wire. Always uses the modern `DH1080_INIT ... CBC` form.
    pub fn to_line(&self) -> String {
        let bytes = Dh1080Group::get().element_to_bytes(&self.public);
        let mut line = format!("{} {}", self.kind.command(), dh64_encode(&bytes));
        if self.cbc {
            line.push(' ');
            line.push_str(CBC_FLAG);
        }
        line
    }
}

impl fmt::Display for Dh1080Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Cheap check for whether a line should be routed to the key exchange.
pub fn is_dh1080(line: &str) -> bool {
    line.starts_with(TOKEN_PREFIX)
}
