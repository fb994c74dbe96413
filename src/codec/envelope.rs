//! The wire envelope that tells encrypted lines apart from ordinary chat.
//!
//! ```text
//! +OK <fish64>       ECB
//! mcps *<base64>     CBC (also accepted as "+OK *<base64>")
//! ```
//!
//! The prefix family (`+OK ` or the older `mcps `) says "this is FiSH"; the
//! `*` marker after it says the payload is CBC. ECB payloads are fish64, CBC
//! payloads standard base64 of IV followed by ciphertext.

use core::fmt;

use crate::cipher::CipherMode;
use crate::codec::fish64::FISH64_ALPHABET;
use crate::error::{Error, Result};

/// Marks a CBC payload directly after the prefix.
pub const CBC_MARKER: char = '*';

/// Envelope prefix family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Prefix {
    /// `+OK `, used by every current client.
    #[default]
    Ok,
    /// `mcps `, the older prefix.
    Mcps,
    /// No prefix at all. Legacy ECB fallback, only recognised on request.
    Bare,
}

impl Prefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Prefix::Ok => "+OK ",
            Prefix::Mcps => "mcps ",
            Prefix::Bare => "",
        }
    }

    /// The prefix conventionally paired with a mode.
    pub fn conventional(mode: CipherMode) -> Self {
        match mode {
            CipherMode::Ecb => Prefix::Ok,
            CipherMode::Cbc => Prefix::Mcps,
        }
    }
}

/// A classified FiSH line: prefix family, mode and still-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub prefix: Prefix,
    pub mode: CipherMode,
    pub payload: String,
}

impl Envelope {
    /// Envelope with the conventional prefix for `mode`.
    pub fn new(mode: CipherMode, payload: impl Into<String>) -> Self {
        Envelope {
            prefix: Prefix::conventional(mode),
            mode,
            payload: payload.into(),
        }
    }

    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// Render the line handed to the transport.
    pub fn to_line(&self) -> String {
        let marker = if self.mode.is_cbc() { "*" } else { "" };
        format!("{}{}{}", self.prefix.as_str(), marker, self.payload)
    }

    /// Classify a line. Plain chat text yields [`Error::NotFish`].
    pub fn parse(line: &str) -> Result<Self> {
        Self::parse_with(line, false)
    }

    /// Like [`Envelope::parse`], optionally recognising bare fish64 as legacy
    /// ECB. Bare detection needs a non-empty whole number of 12-character
    /// groups drawn only from the fish64 alphabet.
    pub fn parse_with(line: &str, accept_bare: bool) -> Result<Self> {
        let (prefix, rest) = if let Some(rest) = line.strip_prefix(Prefix::Ok.as_str()) {
            (Prefix::Ok, rest)
        } else if let Some(rest) = line.strip_prefix(Prefix::Mcps.as_str()) {
            (Prefix::Mcps, rest)
        } else if accept_bare && looks_like_bare_fish64(line) {
            return Ok(Envelope {
                prefix: Prefix::Bare,
                mode: CipherMode::Ecb,
                payload: line.to_string(),
            });
        } else {
            return Err(Error::NotFish);
        };

        let rest = rest.trim_end();
        let (mode, payload) = match rest.strip_prefix(CBC_MARKER) {
            Some(payload) => (CipherMode::Cbc, payload),
            None => (CipherMode::Ecb, rest),
        };
        if payload.is_empty() {
            return Err(Error::format(format!(
                "{} envelope has an empty payload",
                mode
            )));
        }

        Ok(Envelope {
            prefix,
            mode,
            payload: payload.to_string(),
        })
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Prepend the conventional prefix (and CBC marker) to an encoded payload.
pub fn wrap_envelope(encoded: &str, mode: CipherMode) -> String {
    Envelope::new(mode, encoded).to_line()
}

/// Strip and classify the prefix, returning the payload and its mode.
pub fn unwrap_envelope(line: &str) -> Result<(String, CipherMode)> {
    let envelope = Envelope::parse(line)?;
    Ok((envelope.payload, envelope.mode))
}

fn looks_like_bare_fish64(line: &str) -> bool {
    !line.is_empty() && line.len() % 12 == 0 && line.bytes().all(|c| FISH64_ALPHABET.contains(&c))
}
