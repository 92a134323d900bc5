use super::{BitHash, HammingIndex, HashEntry};

/// Compares the query against every stored hash.
#[derive(Debug, Default)]
pub struct LinearIndex {
    entries: Vec<HashEntry>,
}

impl HammingIndex for LinearIndex {
    fn insert(&mut self, entry: HashEntry) {
        self.entries.push(entry);
    }

    fn within(&self, query: &BitHash, threshold: u32) -> Vec<(&HashEntry, u32)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let distance = entry.bits.distance(query)?;
                (distance <= threshold).then_some((entry, distance))
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
