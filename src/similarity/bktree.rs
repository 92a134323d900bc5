use std::collections::{BTreeMap, HashMap};

use super::{BitHash, HammingIndex, HashEntry};

/// Burkhard-Keller tree, one per hash bit length since distance is only
/// defined between equal-length hashes.
#[derive(Debug, Default)]
pub struct BkTree {
    trees: HashMap<usize, Tree>,
    len: usize,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug)]
struct Node {
    entry: HashEntry,
    children: BTreeMap<u32, usize>,
}

impl Tree {
    fn insert(&mut self, entry: HashEntry) {
        let new_index = self.nodes.len();
        if self.nodes.is_empty() {
            self.nodes.push(Node { entry, children: BTreeMap::new() });
            return;
        }

        let mut current = 0;
        loop {
            let node = &self.nodes[current];
            // Same bit length within a tree, so distance is always defined.
            let distance = node.entry.bits.distance(&entry.bits).unwrap_or(0);
            match node.children.get(&distance) {
                Some(&child) => current = child,
                None => {
                    self.nodes[current].children.insert(distance, new_index);
                    break;
                }
            }
        }
        self.nodes.push(Node { entry, children: BTreeMap::new() });
    }

    fn within<'a>(&'a self, query: &BitHash, threshold: u32, out: &mut Vec<(&'a HashEntry, u32)>) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let Some(distance) = node.entry.bits.distance(query) else {
                continue;
            };
            if distance <= threshold {
                out.push((&node.entry, distance));
            }
            // Triangle inequality: only children at |d - k| <= threshold can match.
            let low = distance.saturating_sub(threshold);
            let high = distance.saturating_add(threshold);
            stack.extend(node.children.range(low..=high).map(|(_, &child)| child));
        }
    }
}

impl HammingIndex for BkTree {
    fn insert(&mut self, entry: HashEntry) {
        self.trees.entry(entry.bits.bits()).or_default().insert(entry);
        self.len += 1;
    }

    fn within(&self, query: &BitHash, threshold: u32) -> Vec<(&HashEntry, u32)> {
        let mut out = Vec::new();
        if let Some(tree) = self.trees.get(&query.bits()) {
            tree.within(query, threshold, &mut out);
        }
        out
    }

    fn len(&self) -> usize {
        self.len
    }
}
