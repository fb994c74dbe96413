//! FiSH base64: the IRC-safe text form of ECB ciphertext.
//!
//! Input is consumed in 8-byte groups read as two big-endian 32-bit words.
//! Each group becomes 12 characters: six for the right word, then six for the
//! left word, each emitted 6 bits at a time starting from the least
//! significant bits.
//!
//! A trailing partial group of `n` bytes (1..=7) is read as one big-endian
//! integer and emitted the same way in `ceil(8n / 6)` characters, so a 4-byte
//! tail takes 6 characters exactly like a lone word. Every tail length maps
//! to a distinct character count, which keeps decoding exact for any input.

use crate::codec::TextEncoding;
use crate::error::{Error, Result};

/// The FiSH alphabet. Note that lowercase letters come before uppercase.
pub const FISH64_ALPHABET: &[u8; 64] =
    b"./0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const GROUP_BYTES: usize = 8;
const GROUP_CHARS: usize = 12;
const WORD_CHARS: usize = 6;
const INVALID: u8 = 0xFF;

static DECODE_TABLE: [u8; 256] = build_decode_table();

const fn build_decode_table() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < FISH64_ALPHABET.len() {
        table[FISH64_ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// [`TextEncoding`] handle for the FiSH base64 variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fish64;

impl TextEncoding for Fish64 {
    fn encode(&self, data: &[u8]) -> String {
        fish64_encode(data)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        fish64_decode(text)
    }
}

/// Encode bytes with the FiSH base64 variant.
pub fn fish64_encode(data: &[u8]) -> String {
    let tail_len = data.len() % GROUP_BYTES;
    let capacity = data.len() / GROUP_BYTES * GROUP_CHARS + tail_chars(tail_len);
    let mut out = String::with_capacity(capacity);

    let mut groups = data.chunks_exact(GROUP_BYTES);
    for group in &mut groups {
        let left = u32::from_be_bytes([group[0], group[1], group[2], group[3]]);
        let right = u32::from_be_bytes([group[4], group[5], group[6], group[7]]);
        push_chars(&mut out, u64::from(right), WORD_CHARS);
        push_chars(&mut out, u64::from(left), WORD_CHARS);
    }

    let tail = groups.remainder();
    if !tail.is_empty() {
        let value = tail.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        push_chars(&mut out, value, tail_chars(tail.len()));
    }
    out
}

/// Decode FiSH base64 text.
///
/// # Errors
/// [`Error::Format`] on a character outside [`FISH64_ALPHABET`] or a length
/// whose remainder modulo 12 is not a valid tail size (1, 5, 9 and 11 never
/// occur).
pub fn fish64_decode(text: &str) -> Result<Vec<u8>> {
    let chars = text.as_bytes();
    let tail_len = chars.len() % GROUP_CHARS;
    let tail_bytes = if tail_len == 0 {
        0
    } else {
        (1..GROUP_BYTES)
            .find(|&n| tail_chars(n) == tail_len)
            .ok_or_else(|| {
                Error::format(format!(
                    "fish64 text of length {} has an invalid trailing group",
                    chars.len()
                ))
            })?
    };

    let mut out = Vec::with_capacity(chars.len() / GROUP_CHARS * GROUP_BYTES + tail_bytes);
    let mut groups = chars.chunks_exact(GROUP_CHARS);
    for group in &mut groups {
        // Six characters carry 36 bits; the top four are not part of the word.
        let right = read_chars(&group[..WORD_CHARS])? as u32;
        let left = read_chars(&group[WORD_CHARS..])? as u32;
        out.extend_from_slice(&left.to_be_bytes());
        out.extend_from_slice(&right.to_be_bytes());
    }

    let tail = groups.remainder();
    if !tail.is_empty() {
        let value = read_chars(tail)?.to_be_bytes();
        out.extend_from_slice(&value[value.len() - tail_bytes..]);
    }
    Ok(out)
}

fn tail_chars(bytes: usize) -> usize {
    (bytes * 8).div_ceil(6)
}

fn push_chars(out: &mut String, mut value: u64, count: usize) {
    for _ in 0..count {
        out.push(FISH64_ALPHABET[(value & 0x3f) as usize] as char);
        value >>= 6;
    }
}

fn read_chars(chars: &[u8]) -> Result<u64> {
    chars
        .iter()
        .enumerate()
        .try_fold(0u64, |acc, (i, &c)| match DECODE_TABLE[c as usize] {
            INVALID => Err(Error::format(format!(
                "byte {:#04x} is not in the fish64 alphabet",
                c
            ))),
            v => Ok(acc | (u64::from(v) << (6 * i))),
        })
}
