//! The base64 variant DH1080 uses for public values and derived keys.
//!
//! It is standard base64 without `=` padding, with one quirk every DH1080
//! client shares: when the input bit length is a multiple of 6 (the byte
//! length is a multiple of 3) an extra `A` is appended. A 135-byte public
//! value therefore travels as 181 characters.
//!
//! Decoding yields `floor(6n / 8)` bytes for `n` characters, which discards
//! the extra character and any leftover bits.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;

use crate::codec::TextEncoding;
use crate::error::{Error, Result};

const FILLER: char = 'A';

/// Decoder tolerant of the non-zero leftover bits a truncated tail may carry.
const DH64_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// [`TextEncoding`] handle for the DH1080 base64 variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dh64;

impl TextEncoding for Dh64 {
    fn encode(&self, data: &[u8]) -> String {
        dh64_encode(data)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        dh64_decode(text)
    }
}

/// Encode bytes the way DH1080 peers expect.
pub fn dh64_encode(data: &[u8]) -> String {
    let mut out = STANDARD_NO_PAD.encode(data);
    if data.len() % 3 == 0 {
        out.push(FILLER);
    }
    out
}

/// Decode DH1080 base64.
///
/// # Errors
/// [`Error::Format`] when the text is shorter than two characters or holds a
/// character outside the standard base64 alphabet.
pub fn dh64_decode(text: &str) -> Result<Vec<u8>> {
    if text.len() < 2 {
        return Err(Error::format("dh64 text must hold at least two characters"));
    }
    if let Some(bad) = text
        .bytes()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == b'+' || *c == b'/'))
    {
        return Err(Error::format(format!(
            "byte {:#04x} is not in the dh64 alphabet",
            bad
        )));
    }

    let byte_len = text.len() * 6 / 8;
    let used_chars = (byte_len * 8).div_ceil(6);
    DH64_DECODER
        .decode(&text[..used_chars])
        .map_err(|e| Error::format(format!("invalid dh64 text: {}", e)))
}
