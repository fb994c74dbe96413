//! The fixed DH1080 group and the big-integer arithmetic over it.
//!
//! The modulus is a 1080-bit safe prime `p = 2q + 1` and the generator is 2.
//! Both are protocol constants: a peer using anything else cannot talk to
//! existing DH1080 clients.

use core::fmt;
use core::mem;

use num_bigint_dig::{BigUint, RandBigInt};
use num_traits::One;
use once_cell::sync::Lazy;
use rand::Rng;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bit length of the DH1080 prime.
pub const DH1080_PRIME_BITS: usize = 1080;
/// Byte length of a public value on the wire (the modulus size).
pub const DH1080_PUBLIC_BYTES: usize = 135;
/// The DH1080 generator.
pub const DH1080_GENERATOR: u32 = 2;

/// Big-endian bytes of the DH1080 prime.
const DH1080_PRIME: [u8; DH1080_PUBLIC_BYTES] = [
    0xFB, 0xE1, 0x02, 0x2E, 0x23, 0xD2, 0x13, 0xE8, 0xAC, 0xFA, 0x9A, 0xE8,
    0xB9, 0xDF, 0xAD, 0xA3, 0xEA, 0x6B, 0x7A, 0xC7, 0xA7, 0xB7, 0xE9, 0x5A,
    0xB5, 0xEB, 0x2D, 0xF8, 0x58, 0x92, 0x1F, 0xEA, 0xDE, 0x95, 0xE6, 0xAC,
    0x7B, 0xE7, 0xDE, 0x6A, 0xDB, 0xAB, 0x8A, 0x78, 0x3E, 0x7A, 0xF7, 0xA7,
    0xFA, 0x6A, 0x2B, 0x7B, 0xEB, 0x1E, 0x72, 0xEA, 0xE2, 0xB7, 0x2F, 0x9F,
    0xA2, 0xBF, 0xB2, 0xA2, 0xEF, 0xBE, 0xFA, 0xC8, 0x68, 0xBA, 0xDB, 0x3E,
    0x82, 0x8F, 0xA8, 0xBA, 0xDF, 0xAD, 0xA3, 0xE4, 0xCC, 0x1B, 0xE7, 0xE8,
    0xAF, 0xE8, 0x5E, 0x96, 0x98, 0xA7, 0x83, 0xEB, 0x68, 0xFA, 0x07, 0xA7,
    0x7A, 0xB6, 0xAD, 0x7B, 0xEB, 0x61, 0x8A, 0xCF, 0x9C, 0xA2, 0x89, 0x7E,
    0xB2, 0x8A, 0x61, 0x89, 0xEF, 0xA0, 0x7A, 0xB9, 0x9A, 0x8A, 0x7F, 0xA9,
    0xAE, 0x29, 0x9E, 0xFA, 0x7B, 0xA6, 0x6D, 0xEA, 0xFE, 0xFB, 0xEF, 0xBF,
    0x0B, 0x7D, 0x8B,
];

static GROUP: Lazy<Dh1080Group> = Lazy::new(Dh1080Group::build);

/// The DH1080 group parameters, shared process-wide and never mutated.
#[derive(Debug)]
pub struct Dh1080Group {
    p: BigUint,
    g: BigUint,
    q: BigUint,
    p_minus_one: BigUint,
}

/// A secret exponent. Wiped on drop and never printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateExponent(BigUint);

impl PrivateExponent {
    pub(crate) fn value(&self) -> &BigUint {
        &self.0
    }
}

impl fmt::Debug for PrivateExponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateExponent(..)")
    }
}

impl Dh1080Group {
    /// The process-wide group instance.
    pub fn get() -> &'static Dh1080Group {
        &GROUP
    }

    fn build() -> Self {
        let p = BigUint::from_bytes_be(&DH1080_PRIME);
        let p_minus_one = &p - BigUint::one();
        let q = &p_minus_one >> 1usize;
        Dh1080Group {
            p,
            g: BigUint::from(DH1080_GENERATOR),
            q,
            p_minus_one,
        }
    }

    pub fn prime(&self) -> &BigUint {
        &self.p
    }

    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// Order of the prime-order subgroup, `(p - 1) / 2`.
    pub fn subgroup_order(&self) -> &BigUint {
        &self.q
    }

    /// `base^exponent mod p` for a secret exponent.
    ///
    /// Runs a Montgomery ladder across the full 1080-bit width: one multiply and
    /// one square per bit whatever the exponent's value or length.
    pub fn modpow(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        ladder_modpow(base, exponent, &self.p, DH1080_PRIME_BITS)
    }

    /// Draw a uniformly random exponent in `[2, p - 2]`, re-drawing anything
    /// outside that range.
    pub fn random_exponent<R: Rng + ?Sized>(&self, rng: &mut R) -> PrivateExponent {
        loop {
            let mut candidate = rng.gen_biguint(DH1080_PRIME_BITS);
            if self.is_valid_public(&candidate) {
                return PrivateExponent(candidate);
            }
            candidate.zeroize();
        }
    }

    /// True when `value` lies in `[2, p - 2]`, which excludes 0, 1 and `p - 1`.
    pub fn is_valid_public(&self, value: &BigUint) -> bool {
        *value >= BigUint::from(2u32) && *value < self.p_minus_one
    }

    /// True when `value^q = 1 mod p`, i.e. `value` generates a subgroup of
    /// prime order `q` rather than the full group.
    pub fn in_prime_order_subgroup(&self, value: &BigUint) -> bool {
        value.modpow(&self.q, &self.p).is_one()
    }

    /// Fixed-width big-endian encoding of a group element.
    pub fn element_to_bytes(&self, value: &BigUint) -> Vec<u8> {
        let raw = value.to_bytes_be();
        let mut out = vec![0u8; DH1080_PUBLIC_BYTES.saturating_sub(raw.len())];
        out.extend_from_slice(&raw);
        out
    }
}

/// Montgomery ladder over `bits` exponent bits (or the exponent's own width,
/// when wider). Intermediate values are wiped as they are replaced.
pub(crate) fn ladder_modpow(
    base: &BigUint,
    exponent: &BigUint,
    modulus: &BigUint,
    bits: usize,
) -> BigUint {
    let mut exp_bytes = exponent.to_bytes_be();
    let width = bits.div_ceil(8).max(exp_bytes.len());
    let mut padded = vec![0u8; width - exp_bytes.len()];
    padded.extend_from_slice(&exp_bytes);
    exp_bytes.zeroize();

    let mut r0 = BigUint::one() % modulus;
    let mut r1 = base % modulus;
    for byte in &padded {
        for shift in (0..8).rev() {
            let product = (&r0 * &r1) % modulus;
            if (byte >> shift) & 1 == 1 {
                let square = (&r1 * &r1) % modulus;
                replace_wiping(&mut r0, product);
                replace_wiping(&mut r1, square);
            } else {
                let square = (&r0 * &r0) % modulus;
                replace_wiping(&mut r1, product);
                replace_wiping(&mut r0, square);
            }
        }
    }

    padded.zeroize();
    r1.zeroize();
    r0
}

fn replace_wiping(slot: &mut BigUint, value: BigUint) {
    let mut old = mem::replace(slot, value);
    old.zeroize();
}
