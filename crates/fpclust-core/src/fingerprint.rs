//! Fixed-length binary fingerprints.
//!
//! Bits are packed MSB-first into `u64` words: bit 0 is the most significant
//! bit of the first byte, which is exactly the on-disk byte layout used by
//! [`FingerprintStore`](crate::store::FingerprintStore). Padding bits past
//! `len()` are always zero so popcounts never need masking.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

const WORD_BITS: usize = 64;

/// A fixed-length bit vector describing one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    nbits: usize,
    words: Vec<u64>,
}

impl Fingerprint {
    /// Creates an all-zero fingerprint of `nbits` bits.
    #[must_use]
    pub fn zeros(nbits: usize) -> Self {
        Self {
            nbits,
            words: vec![0; nbits.div_ceil(WORD_BITS)],
        }
    }

    /// Creates a fingerprint from one `bool` per bit.
    #[must_use]
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut fp = Self::zeros(bits.len());
        for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
            fp.words[i / WORD_BITS] |= mask(i);
        }
        fp
    }

    /// Creates a fingerprint of `nbits` bits with the given positions set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a position is out of range.
    pub fn from_positions(nbits: usize, positions: &[usize]) -> Result<Self> {
        let mut fp = Self::zeros(nbits);
        for &pos in positions {
            fp.set(pos)?;
        }
        Ok(fp)
    }

    /// Decodes `nbits` bits from MSB-first packed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if `bytes` does not hold exactly
    /// `ceil(nbits / 8)` bytes or if padding bits are set.
    pub fn from_bytes(bytes: &[u8], nbits: usize) -> Result<Self> {
        let expected = nbits.div_ceil(8);
        if bytes.len() != expected {
            return Err(Error::Format(format!(
                "expected {expected} bytes for {nbits} bits, got {}",
                bytes.len()
            )));
        }

        let words = bytes
            .chunks(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf[..chunk.len()].copy_from_slice(chunk);
                u64::from_be_bytes(buf)
            })
            .collect();
        let fp = Self { nbits, words };

        if fp.has_padding_bits() {
            return Err(Error::Format("padding bits past fingerprint length are set".into()));
        }
        Ok(fp)
    }

    /// Encodes the fingerprint as MSB-first packed bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self.words.iter().flat_map(|w| w.to_be_bytes()).collect();
        out.truncate(self.nbits.div_ceil(8));
        out
    }

    /// Number of bits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nbits
    }

    /// True if the fingerprint has zero bits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nbits == 0
    }

    /// Returns bit `i`, or `false` past the end.
    #[must_use]
    pub fn get(&self, i: usize) -> bool {
        i < self.nbits && self.words[i / WORD_BITS] & mask(i) != 0
    }

    /// Sets bit `i`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `i >= len()`.
    pub fn set(&mut self, i: usize) -> Result<()> {
        if i >= self.nbits {
            return Err(Error::InvalidArgument(format!(
                "bit {i} out of range for {}-bit fingerprint",
                self.nbits
            )));
        }
        self.words[i / WORD_BITS] |= mask(i);
        Ok(())
    }

    /// Packed words, MSB-first.
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Number of bits set in both fingerprints.
    #[inline]
    #[must_use]
    pub fn intersection_count(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a & b).count_ones())
            .sum()
    }

    /// Number of bits set in either fingerprint.
    #[inline]
    #[must_use]
    pub fn union_count(&self, other: &Self) -> u32 {
        self.words
            .iter()
            .zip(&other.words)
            .map(|(a, b)| (a | b).count_ones())
            .sum()
    }

    /// True if the word count matches the length and padding bits are clear.
    pub(crate) fn is_well_formed(&self) -> bool {
        self.words.len() == self.nbits.div_ceil(WORD_BITS) && !self.has_padding_bits()
    }

    fn has_padding_bits(&self) -> bool {
        let tail = self.nbits % WORD_BITS;
        if tail == 0 {
            return false;
        }
        self.words
            .last()
            .is_some_and(|last| last & (u64::MAX >> tail) != 0)
    }
}

#[inline]
const fn mask(i: usize) -> u64 {
    1u64 << (WORD_BITS - 1 - i % WORD_BITS)
}

/// Turns items into fingerprints.
///
/// Implemented outside this crate (e.g. by a Morgan fingerprint generator).
/// Implementations must be deterministic and always produce `fpsize()` bits.
pub trait FeatureEncoder {
    /// Item type being encoded.
    type Item: ?Sized;

    /// Number of bits in every produced fingerprint.
    fn fpsize(&self) -> usize;

    /// Encodes one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item cannot be encoded.
    fn encode(&self, item: &Self::Item) -> Result<Fingerprint>;
}
