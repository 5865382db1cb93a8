//! Insertion-ordered quad sets for buffered changes
//!
//! A transaction buffers its writes in two deltas, `added` and `removed`.
//! Iteration follows insertion order so flushes replay changes in the order
//! they were made.

use optimist_core::{Quad, QuadPattern};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Insertion-ordered set of quads
#[derive(Debug, Clone, Default)]
pub struct Delta {
    /// Sequence number to quad, in insertion order
    entries: BTreeMap<u64, Quad>,
    /// Quad to its sequence number
    index: FxHashMap<Quad, u64>,
    next_seq: u64,
}

impl Delta {
    /// Empty delta
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a quad; returns false if it was already present
    pub fn insert(&mut self, quad: Quad) -> bool {
        if self.index.contains_key(&quad) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(quad.clone(), seq);
        self.entries.insert(seq, quad);
        true
    }

    /// Remove a quad; returns false if it was absent
    pub fn remove(&mut self, quad: &Quad) -> bool {
        match self.index.remove(quad) {
            Some(seq) => {
                self.entries.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// True if the quad is present
    pub fn contains(&self, quad: &Quad) -> bool {
        self.index.contains_key(quad)
    }

    /// Number of quads
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every quad
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Quads in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Quad> {
        self.entries.values()
    }

    /// Quads matching the pattern, in insertion order
    pub fn matching<'a>(&'a self, pattern: &'a QuadPattern) -> impl Iterator<Item = &'a Quad> {
        self.iter().filter(move |q| pattern.matches(q))
    }

    /// Number of quads matching the pattern
    pub fn count_matching(&self, pattern: &QuadPattern) -> usize {
        self.matching(pattern).count()
    }
}

impl FromIterator<Quad> for Delta {
    fn from_iter<I: IntoIterator<Item = Quad>>(iter: I) -> Self {
        let mut delta = Delta::new();
        for quad in iter {
            delta.insert(quad);
        }
        delta
    }
}

impl PartialEq for Delta {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|q| other.contains(q))
    }
}

impl Eq for Delta {}
