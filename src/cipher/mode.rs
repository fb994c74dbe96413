//! ECB and CBC chaining over a 64-bit block cipher, with FiSH padding rules.
//!
//! - Plaintext is padded with zero bytes up to the next multiple of 8. Empty
//!   plaintext becomes a single zero block.
//! - CBC draws a fresh random IV for every message and emits it as the first
//!   ciphertext block.
//! - Decryption strips trailing zero bytes. Plaintext that genuinely ends in
//!   zero bytes loses them; FiSH has always behaved this way. Leading zero
//!   bytes are kept, unlike clients that strip both ends.

use core::fmt;

use rand::{rngs::OsRng, RngCore};

use crate::cipher::{Block, BlockCipher, BLOWFISH_BLOCK_SIZE};
use crate::error::{Error, Result};

const BS: usize = BLOWFISH_BLOCK_SIZE;

/// Chaining mode bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherMode {
    /// Each block encrypted independently.
    #[default]
    Ecb,
    /// Cipher block chaining with a per-message random IV.
    Cbc,
}

impl CipherMode {
    pub fn is_cbc(self) -> bool {
        self == CipherMode::Cbc
    }
}

impl fmt::Display for CipherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherMode::Ecb => f.write_str("ECB"),
            CipherMode::Cbc => f.write_str("CBC"),
        }
    }
}

/// Encrypt `plaintext` under `cipher` in the given mode.
///
/// For CBC the output starts with the 8-byte IV.
pub fn encrypt<C: BlockCipher + ?Sized>(
    cipher: &C,
    mode: CipherMode,
    plaintext: &[u8],
) -> Vec<u8> {
    match mode {
        CipherMode::Ecb => encrypt_ecb(cipher, plaintext),
        CipherMode::Cbc => {
            let mut iv = [0u8; BS];
            OsRng.fill_bytes(&mut iv);
            encrypt_cbc_with_iv(cipher, &iv, plaintext)
        }
    }
}

/// CBC encryption with a caller-chosen IV. Reusing an IV under the same key
/// leaks plaintext equality; [`encrypt`] is the normal entry point.
pub fn encrypt_cbc_with_iv<C: BlockCipher + ?Sized>(
    cipher: &C,
    iv: &Block,
    plaintext: &[u8],
) -> Vec<u8> {
    let padded = pad(plaintext);
    let mut out = Vec::with_capacity(BS + padded.len());
    out.extend_from_slice(iv);

    let mut prev = *iv;
    for chunk in padded.chunks_exact(BS) {
        let mut block = prev;
        xor_into(&mut block, chunk);
        cipher.encrypt_block(&mut block);
        out.extend_from_slice(&block);
        prev = block;
    }
    out
}

/// Decrypt `ciphertext` produced by [`encrypt`] in the same mode.
///
/// # Errors
/// [`Error::Format`] if the length is not a multiple of 8, or for CBC if there
/// is no data block after the IV.
pub fn decrypt<C: BlockCipher + ?Sized>(
    cipher: &C,
    mode: CipherMode,
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() % BS != 0 {
        return Err(Error::format(format!(
            "ciphertext length {} is not a multiple of {}",
            ciphertext.len(),
            BS
        )));
    }

    let mut plain = match mode {
        CipherMode::Ecb => decrypt_ecb(cipher, ciphertext),
        CipherMode::Cbc => {
            if ciphertext.len() < 2 * BS {
                return Err(Error::format(format!(
                    "CBC ciphertext of {} bytes holds no data after the IV",
                    ciphertext.len()
                )));
            }
            decrypt_cbc(cipher, ciphertext)
        }
    };
    strip_trailing_zeros(&mut plain);
    Ok(plain)
}

fn encrypt_ecb<C: BlockCipher + ?Sized>(cipher: &C, plaintext: &[u8]) -> Vec<u8> {
    let mut data = pad(plaintext);
    for chunk in data.chunks_exact_mut(BS) {
        let mut block: Block = [0u8; BS];
        block.copy_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        chunk.copy_from_slice(&block);
    }
    data
}

fn decrypt_ecb<C: BlockCipher + ?Sized>(cipher: &C, ciphertext: &[u8]) -> Vec<u8> {
    let mut data = ciphertext.to_vec();
    for chunk in data.chunks_exact_mut(BS) {
        let mut block: Block = [0u8; BS];
        block.copy_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        chunk.copy_from_slice(&block);
    }
    data
}

fn decrypt_cbc<C: BlockCipher + ?Sized>(cipher: &C, ciphertext: &[u8]) -> Vec<u8> {
    let (iv, body) = ciphertext.split_at(BS);
    let mut prev: Block = [0u8; BS];
    prev.copy_from_slice(iv);

    let mut out = Vec::with_capacity(body.len());
    for chunk in body.chunks_exact(BS) {
        let mut block: Block = [0u8; BS];
        block.copy_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        xor_into(&mut block, &prev);
        out.extend_from_slice(&block);
        prev.copy_from_slice(chunk);
    }
    out
}

/// Zero-pad to a non-zero multiple of the block size.
fn pad(plaintext: &[u8]) -> Vec<u8> {
    let padded_len = plaintext.len().div_ceil(BS).max(1) * BS;
    let mut data = Vec::with_capacity(padded_len);
    data.extend_from_slice(plaintext);
    data.resize(padded_len, 0);
    data
}

fn xor_into(block: &mut Block, other: &[u8]) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}

fn strip_trailing_zeros(data: &mut Vec<u8>) {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    data.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::BlowfishKey;

    fn key(data: &[u8]) -> BlowfishKey {
        BlowfishKey::new(data).unwrap()
    }

    #[test]
    fn test_cbc_known_answer() {
        // Eric Young's CBC vector; the 29-byte message is zero padded, as FiSH does.
        let bf = key(&hex::decode("0123456789ABCDEFF0E1D2C3B4A59687").unwrap());
        let mut iv = [0u8; 8];
        iv.copy_from_slice(&hex::decode("FEDCBA9876543210").unwrap());

        let out = encrypt_cbc_with_iv(&bf, &iv, b"7654321 Now is the time for \0");
        assert_eq!(&out[..8], &iv);
        assert_eq!(
            hex::encode_upper(&out[8..]),
            "6B77B4D63006DEE605B156E27403979358DEB9E7154616D959F1652BD5FF92CC"
        );

        let plain = decrypt(&bf, CipherMode::Cbc, &out).unwrap();
        assert_eq!(plain, b"7654321 Now is the time for ");
    }

    #[test]
    fn test_ecb_round_trip() {
        let bf = key(b"ecb key");
        let msgs: [&[u8]; 4] = [b"", b"a", b"exactly8", b"a somewhat longer message body"];
        for msg in msgs {
            let ct = encrypt(&bf, CipherMode::Ecb, msg);
            assert_eq!(ct.len() % 8, 0);
            assert!(!ct.is_empty());
            assert_eq!(decrypt(&bf, CipherMode::Ecb, &ct).unwrap(), msg);
        }
    }

    #[test]
    fn test_cbc_round_trip() {
        let bf = key(b"cbc key");
        let msgs: [&[u8]; 5] = [
            b"",
            b"x",
            b"exactly8",
            b"sixteen bytes!!!",
            b"and a long one to chain a few blocks",
        ];
        for msg in msgs {
            let ct = encrypt(&bf, CipherMode::Cbc, msg);
            assert!(ct.len() >= 16);
            assert_eq!(decrypt(&bf, CipherMode::Cbc, &ct).unwrap(), msg);
        }
    }

    #[test]
    fn test_ecb_identical_blocks_repeat() {
        let bf = key(b"pattern");
        let ct = encrypt(&bf, CipherMode::Ecb, b"AAAAAAAAAAAAAAAA");
        assert_eq!(ct[..8], ct[8..16]);
    }

    #[test]
    fn test_cbc_iv_is_fresh() {
        let bf = key(b"same key");
        let a = encrypt(&bf, CipherMode::Cbc, b"same plaintext");
        let b = encrypt(&bf, CipherMode::Cbc, b"same plaintext");
        assert_ne!(a, b);
        assert_ne!(a[..8], b[..8]);
    }

    #[test]
    fn test_trailing_zero_truncation() {
        let bf = key(b"lossy");
        let ct = encrypt(&bf, CipherMode::Ecb, b"ends in nul\0\0");
        assert_eq!(decrypt(&bf, CipherMode::Ecb, &ct).unwrap(), b"ends in nul");

        // embedded zeros before non-zero data survive
        let ct = encrypt(&bf, CipherMode::Cbc, b"a\0b");
        assert_eq!(decrypt(&bf, CipherMode::Cbc, &ct).unwrap(), b"a\0b");
    }

    #[test]
    fn test_decrypt_rejects_bad_lengths() {
        let bf = key(b"lengths");
        assert!(matches!(
            decrypt(&bf, CipherMode::Ecb, &[0u8; 7]),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            decrypt(&bf, CipherMode::Cbc, &[0u8; 12]),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            decrypt(&bf, CipherMode::Cbc, &[0u8; 8]),
            Err(Error::Format(_))
        ));
        assert_eq!(decrypt(&bf, CipherMode::Ecb, &[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(CipherMode::Ecb.to_string(), "ECB");
        assert_eq!(CipherMode::Cbc.to_string(), "CBC");
        assert!(CipherMode::Cbc.is_cbc());
        assert_eq!(CipherMode::default(), CipherMode::Ecb);
    }
}
