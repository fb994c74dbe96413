//! Whole-message encryption: cipher mode, text encoding and envelope together.
//!
//! Outbound: pad, encrypt, encode (fish64 for ECB, base64 for CBC), wrap.
//! Inbound: classify, decode, decrypt, strip padding.
//!
//! IRC servers cut long lines, so inbound decoding drops a trailing partial
//! group (12 characters for ECB, 8 bytes for CBC) instead of failing the
//! whole message, the same way FiSH clients always have.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use log::debug;

use crate::cipher::{self, BlockCipher, CipherMode, BLOWFISH_BLOCK_SIZE};
use crate::codec::{fish64_decode, fish64_encode, Envelope, Prefix};
use crate::error::{Error, Result};

const ECB_GROUP_CHARS: usize = 12;

/// Standard base64 for CBC payloads; padding is written but not required back.
const CBC_PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encrypt `plaintext` into a complete wire body using the conventional prefix.
pub fn encrypt_message<C: BlockCipher + ?Sized>(
    cipher: &C,
    mode: CipherMode,
    plaintext: &[u8],
) -> String {
    encrypt_message_with_prefix(cipher, mode, Prefix::conventional(mode), plaintext)
}

/// Encrypt `plaintext` into a wire body with an explicit prefix family.
pub fn encrypt_message_with_prefix<C: BlockCipher + ?Sized>(
    cipher: &C,
    mode: CipherMode,
    prefix: Prefix,
    plaintext: &[u8],
) -> String {
    let ciphertext = cipher::encrypt(cipher, mode, plaintext);
    let payload = match mode {
        CipherMode::Ecb => fish64_encode(&ciphertext),
        CipherMode::Cbc => CBC_PAYLOAD.encode(&ciphertext),
    };
    Envelope::new(mode, payload).with_prefix(prefix).to_line()
}

/// Classify and decrypt a wire body.
///
/// # Errors
/// [`Error::NotFish`] for plain chat text, [`Error::Format`] for anything that
/// looks like FiSH but cannot be decoded.
pub fn decrypt_message<C: BlockCipher + ?Sized>(cipher: &C, body: &str) -> Result<Vec<u8>> {
    decrypt_envelope(cipher, &Envelope::parse(body)?)
}

/// Decrypt an already classified envelope.
pub fn decrypt_envelope<C: BlockCipher + ?Sized>(
    cipher: &C,
    envelope: &Envelope,
) -> Result<Vec<u8>> {
    let raw = match envelope.mode {
        CipherMode::Ecb => decode_ecb_payload(&envelope.payload)?,
        CipherMode::Cbc => decode_cbc_payload(&envelope.payload)?,
    };

    let mut plain = cipher::decrypt(cipher, envelope.mode, &raw)?;
    plain.retain(|&b| b != b'\n');
    Ok(plain)
}

fn decode_ecb_payload(payload: &str) -> Result<Vec<u8>> {
    if !payload.is_ascii() {
        return Err(Error::format("ECB payload contains non-ASCII characters"));
    }
    if payload.len() < ECB_GROUP_CHARS {
        return Err(Error::format(format!(
            "ECB payload of {} characters is shorter than one block",
            payload.len()
        )));
    }

    let usable = payload.len() - payload.len() % ECB_GROUP_CHARS;
    if usable != payload.len() {
        debug!(
            "dropping {} trailing characters of a truncated ECB payload",
            payload.len() - usable
        );
    }
    fish64_decode(&payload[..usable])
}

fn decode_cbc_payload(payload: &str) -> Result<Vec<u8>> {
    let mut raw = CBC_PAYLOAD
        .decode(payload)
        .map_err(|e| Error::format(format!("invalid CBC payload: {}", e)))?;

    let extra = raw.len() % BLOWFISH_BLOCK_SIZE;
    if extra != 0 {
        debug!("dropping {} trailing bytes of a truncated CBC payload", extra);
        raw.truncate(raw.len() - extra);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{encrypt_cbc_with_iv, BlowfishKey};

    fn key(data: &[u8]) -> BlowfishKey {
        BlowfishKey::new(data).unwrap()
    }

    #[test]
    fn test_ecb_known_message() {
        let bf = key(b"test");
        assert_eq!(
            encrypt_message(&bf, CipherMode::Ecb, b"Hello, world!"),
            "+OK 7xL731LkPD1.sjhV7/c2M0e/"
        );
        assert_eq!(
            decrypt_message(&bf, "+OK 7xL731LkPD1.sjhV7/c2M0e/").unwrap(),
            b"Hello, world!"
        );
        assert_eq!(
            decrypt_message(&bf, "mcps 7xL731LkPD1.sjhV7/c2M0e/").unwrap(),
            b"Hello, world!"
        );
    }

    #[test]
    fn test_cbc_known_message() {
        let bf = key(b"secret");
        let ct = encrypt_cbc_with_iv(&bf, &[1, 2, 3, 4, 5, 6, 7, 8], b"meet me at noon");
        assert_eq!(CBC_PAYLOAD.encode(ct), "AQIDBAUGBwh1Yby6qnEumjWhRl+Sw2Ku");

        for line in [
            "+OK *AQIDBAUGBwh1Yby6qnEumjWhRl+Sw2Ku",
            "mcps *AQIDBAUGBwh1Yby6qnEumjWhRl+Sw2Ku",
        ] {
            assert_eq!(decrypt_message(&bf, line).unwrap(), b"meet me at noon");
        }
    }

    #[test]
    fn test_round_trip_both_modes() {
        let bf = key(b"round trip key");
        for mode in [CipherMode::Ecb, CipherMode::Cbc] {
            let line = encrypt_message(&bf, mode, "héllo wörld, 123".as_bytes());
            assert_eq!(Envelope::parse(&line).unwrap().mode, mode);
            assert_eq!(
                decrypt_message(&bf, &line).unwrap(),
                "héllo wörld, 123".as_bytes()
            );
        }
    }

    #[test]
    fn test_explicit_prefix() {
        let bf = key(b"prefix");
        let line = encrypt_message_with_prefix(&bf, CipherMode::Cbc, Prefix::Ok, b"hi");
        assert!(line.starts_with("+OK *"));
        assert_eq!(decrypt_message(&bf, &line).unwrap(), b"hi");
    }

    #[test]
    fn test_truncated_ecb_keeps_whole_groups() {
        let bf = key(b"test");
        // 24 characters of payload, server cut the last 5
        let truncated = "+OK 7xL731LkPD1.sjhV7";
        assert_eq!(decrypt_message(&bf, truncated).unwrap(), b"Hello, w");
    }

    #[test]
    fn test_short_ecb_payload_rejected() {
        let bf = key(b"test");
        assert!(matches!(
            decrypt_message(&bf, "+OK 7xL731"),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            decrypt_message(&bf, "+OK 7xL731LkPD1\u{e9}"),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_cbc_garbage_rejected() {
        let bf = key(b"secret");
        assert!(matches!(
            decrypt_message(&bf, "+OK *not base64 at all!"),
            Err(Error::Format(_))
        ));
        // IV only, no data block
        assert!(matches!(
            decrypt_message(&bf, "+OK *AQIDBAUGBwg="),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_newlines_removed() {
        let bf = key(b"nl");
        let line = encrypt_message(&bf, CipherMode::Ecb, b"two\nlines");
        assert_eq!(decrypt_message(&bf, &line).unwrap(), b"twolines");
    }

    #[test]
    fn test_plain_text_passes_classification() {
        let bf = key(b"whatever");
        assert_eq!(decrypt_message(&bf, "just chatting"), Err(Error::NotFish));
    }
}
