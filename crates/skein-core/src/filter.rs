//! Timeline filter - probabilistic set of usernames
//!
//! A Bloom filter answering "might this neighbor reach timeline X".
//! Membership tests never produce false negatives. Filters of the same
//! geometry can be merged by OR-ing their bits, which is how neighborhood
//! summaries are aggregated during gossip.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::SkeinError;

/// Default filter size in bits
pub const DEFAULT_FILTER_BITS: usize = 1024;

/// Default number of hash probes per item
pub const DEFAULT_FILTER_HASHES: u32 = 3;

/// Bloom filter over usernames
///
/// Decoding checks the geometry, so a filter received from the wire can
/// always be probed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FilterParts")]
pub struct TimelineFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
}

impl TimelineFilter {
    /// Create an empty filter with `num_bits` bits (rounded up to a word)
    /// and `num_hashes` probes per item
    pub fn new(num_bits: usize, num_hashes: u32) -> Self {
        let words = num_bits.max(1).div_ceil(64);
        Self {
            bits: vec![0; words],
            num_bits: words * 64,
            num_hashes: num_hashes.max(1),
        }
    }

    /// Insert a username
    pub fn insert(&mut self, item: &str) {
        for idx in self.probes(item) {
            self.bits[idx / 64] |= 1 << (idx % 64);
        }
    }

    /// Check whether a username might be present
    pub fn might_contain(&self, item: &str) -> bool {
        self.probes(item)
            .all(|idx| self.bits[idx / 64] & (1 << (idx % 64)) != 0)
    }

    /// Union with another filter
    ///
    /// Returns false (and leaves `self` untouched) when geometries differ.
    pub fn merge(&mut self, other: &TimelineFilter) -> bool {
        if self.num_bits != other.num_bits || self.num_hashes != other.num_hashes {
            return false;
        }
        for (word, theirs) in self.bits.iter_mut().zip(&other.bits) {
            *word |= theirs;
        }
        true
    }

    /// Remove every item
    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|w| *w = 0);
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    #[inline]
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    #[inline]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Double hashing over the two halves of a SHA-256 digest
    fn probes(&self, item: &str) -> impl Iterator<Item = usize> {
        let digest = Sha256::digest(item.as_bytes());
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&digest[0..8]);
        h2.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_le_bytes(h1);
        let h2 = u64::from_le_bytes(h2) | 1;
        let num_bits = self.num_bits as u64;

        (0..self.num_hashes as u64)
            .map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % num_bits) as usize)
    }
}

/// Unchecked wire form of a [`TimelineFilter`]
#[derive(Deserialize)]
struct FilterParts {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
}

impl TryFrom<FilterParts> for TimelineFilter {
    type Error = SkeinError;

    fn try_from(parts: FilterParts) -> Result<Self, Self::Error> {
        if parts.num_bits == 0 || parts.num_bits != parts.bits.len() * 64 {
            return Err(SkeinError::InvalidWireFormat(format!(
                "filter of {} bits carried in {} words",
                parts.num_bits,
                parts.bits.len()
            )));
        }
        if parts.num_hashes == 0 {
            return Err(SkeinError::InvalidWireFormat(
                "filter without hash probes".into(),
            ));
        }
        Ok(Self {
            bits: parts.bits,
            num_bits: parts.num_bits,
            num_hashes: parts.num_hashes,
        })
    }
}

impl Default for TimelineFilter {
    fn default() -> Self {
        TimelineFilter::new(DEFAULT_FILTER_BITS, DEFAULT_FILTER_HASHES)
    }
}
