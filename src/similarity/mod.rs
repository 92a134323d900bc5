//! Nearest-neighbour search over perceptual hashes by Hamming distance.
//!
//! Callers only see [`find_similar`]; which [`HammingIndex`] answers the query
//! is picked from configuration.

pub mod bktree;
pub mod linear;

use serde::{Deserialize, Serialize};

use crate::utils::config::IndexKind;
pub use bktree::BkTree;
pub use linear::LinearIndex;

/// Fixed-length bit vector decoded from a hex string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitHash {
    bytes: Vec<u8>,
}

impl BitHash {
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        let bytes = hex::decode(hex_str.trim()).ok()?;
        if bytes.is_empty() {
            return None;
        }
        Some(Self { bytes })
    }

    pub fn bits(&self) -> usize {
        self.bytes.len() * 8
    }

    /// popcount(a XOR b). `None` when the hashes differ in length.
    pub fn distance(&self, other: &BitHash) -> Option<u32> {
        if self.bytes.len() != other.bytes.len() {
            return None;
        }
        Some(
            self.bytes
                .iter()
                .zip(&other.bytes)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct HashEntry {
    pub file_id: i64,
    pub hex: String,
    pub bits: BitHash,
}

impl HashEntry {
    pub fn parse(file_id: i64, hex: String) -> Option<Self> {
        let bits = BitHash::from_hex(&hex)?;
        Some(Self { file_id, hex, bits })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarMatch {
    pub file_id: i64,
    pub distance: u32,
}

pub trait HammingIndex: Send {
    fn insert(&mut self, entry: HashEntry);

    /// Every entry whose distance to `query` is at most `threshold`, unordered.
    fn within(&self, query: &BitHash, threshold: u32) -> Vec<(&HashEntry, u32)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn build_index(kind: IndexKind, entries: impl IntoIterator<Item = HashEntry>) -> Box<dyn HammingIndex> {
    let mut index: Box<dyn HammingIndex> = match kind {
        IndexKind::Linear => Box::new(LinearIndex::default()),
        IndexKind::BkTree => Box::new(BkTree::default()),
    };
    for entry in entries {
        index.insert(entry);
    }
    index
}

/// Matches ordered by ascending distance, then file id.
///
/// A stored hash whose text equals `query_hex` exactly is left out. Other
/// files that merely share the same bits under a different spelling (case)
/// are still returned at distance 0.
pub fn find_similar(index: &dyn HammingIndex, query_hex: &str, threshold: u32, limit: usize) -> Vec<SimilarMatch> {
    let Some(query) = BitHash::from_hex(query_hex) else {
        return Vec::new();
    };

    let mut matches: Vec<SimilarMatch> = index
        .within(&query, threshold)
        .into_iter()
        .filter(|(entry, _)| entry.hex != query_hex)
        .map(|(entry, distance)| SimilarMatch {
            file_id: entry.file_id,
            distance,
        })
        .collect();

    matches.sort_by_key(|m| (m.distance, m.file_id));
    matches.truncate(limit);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<HashEntry> {
        // Deterministic pseudo-random 64-bit hashes.
        let mut state: u64 = 0x9e3779b97f4a7c15;
        (1..=200)
            .map(|id| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                HashEntry::parse(id, format!("{:016x}", state)).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_distance() {
        let a = BitHash::from_hex("ff00").unwrap();
        let b = BitHash::from_hex("0f01").unwrap();
        assert_eq!(a.distance(&b), Some(5));
        assert_eq!(a.distance(&a), Some(0));
        assert_eq!(a.distance(&BitHash::from_hex("ff").unwrap()), None);
        assert!(BitHash::from_hex("xyz").is_none());
        assert!(BitHash::from_hex("").is_none());
    }

    #[test]
    fn test_linear_and_bktree_agree() {
        let linear = build_index(IndexKind::Linear, entries());
        let tree = build_index(IndexKind::BkTree, entries());
        assert_eq!(linear.len(), tree.len());

        for sample in entries().iter().step_by(17) {
            for threshold in [0, 8, 24, 32, 64] {
                let a = find_similar(linear.as_ref(), &sample.hex, threshold, usize::MAX);
                let b = find_similar(tree.as_ref(), &sample.hex, threshold, usize::MAX);
                assert_eq!(a, b, "threshold {}", threshold);
            }
        }
    }

    #[test]
    fn test_threshold_monotonic() {
        let index = build_index(IndexKind::BkTree, entries());
        let sample = "0123456789abcdef";
        let mut previous: Vec<i64> = Vec::new();
        for threshold in 0..=64 {
            let found = find_similar(index.as_ref(), sample, threshold, usize::MAX);
            assert!(found.iter().all(|m| m.distance <= threshold));
            assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
            let ids: Vec<i64> = found.iter().map(|m| m.file_id).collect();
            assert!(previous.iter().all(|id| ids.contains(id)));
            previous = ids;
        }
        assert_eq!(previous.len(), 200);
    }

    #[test]
    fn test_exact_text_is_excluded_but_twins_are_not() {
        let index = build_index(
            IndexKind::Linear,
            vec![
                HashEntry::parse(1, "abcd".into()).unwrap(),
                HashEntry::parse(2, "abcd".into()).unwrap(),
                HashEntry::parse(3, "ABCD".into()).unwrap(),
                HashEntry::parse(4, "abce".into()).unwrap(),
            ],
        );
        let found = find_similar(index.as_ref(), "abcd", 4, 10);
        assert_eq!(
            found,
            vec![
                SimilarMatch { file_id: 3, distance: 0 },
                SimilarMatch { file_id: 4, distance: 2 },
            ]
        );
        assert_eq!(find_similar(index.as_ref(), "ABCD", 0, 10).len(), 2);
    }

    #[test]
    fn test_limit_and_bad_query() {
        let index = build_index(IndexKind::Linear, entries());
        assert_eq!(find_similar(index.as_ref(), "0123456789abcdef", 64, 5).len(), 5);
        assert!(find_similar(index.as_ref(), "not-hex", 64, 5).is_empty());
        assert!(find_similar(index.as_ref(), "abcd", 64, 5).is_empty());
    }
}
