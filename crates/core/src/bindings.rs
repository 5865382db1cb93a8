//! Solution rows and dataset descriptors

use crate::types::Term;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One solution row: variable name to bound term
///
/// Ordered so equal rows hash and print identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingSet {
    bindings: BTreeMap<String, Term>,
}

impl BindingSet {
    /// Empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-binding row
    pub fn with(name: impl Into<String>, value: Term) -> Self {
        let mut row = Self::new();
        row.insert(name, value);
        row
    }

    /// Bound value for `name`
    pub fn get(&self, name: &str) -> Option<&Term> {
        self.bindings.get(name)
    }

    /// True if `name` is bound
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bind `name`, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: Term) {
        self.bindings.insert(name.into(), value);
    }

    /// Unbind `name`
    pub fn remove(&mut self, name: &str) -> Option<Term> {
        self.bindings.remove(name)
    }

    /// Number of bound names
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// (name, value) pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True if every name bound in both rows has the same value
    pub fn is_compatible(&self, other: &BindingSet) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .iter()
            .all(|(name, value)| large.get(name).map_or(true, |v| v == value))
    }

    /// Union of two compatible rows; `other` wins on clashes
    pub fn merged(&self, other: &BindingSet) -> BindingSet {
        let mut row = self.clone();
        for (name, value) in other.iter() {
            row.insert(name, value.clone());
        }
        row
    }

    /// Row restricted to `names`
    pub fn project<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> BindingSet {
        let mut row = BindingSet::new();
        for name in names {
            if let Some(value) = self.get(name) {
                row.insert(name.clone(), value.clone());
            }
        }
        row
    }
}

impl FromIterator<(String, Term)> for BindingSet {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        write!(f, "]")
    }
}

/// Graphs a query is evaluated against
///
/// Statement patterns in default scope read `default_graphs`, patterns in
/// named scope read `named_graphs`. A query without a dataset reads the
/// whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dataset {
    /// Graphs merged into the default graph
    #[serde(default)]
    pub default_graphs: BTreeSet<Term>,
    /// Graphs available to `GRAPH` patterns
    #[serde(default)]
    pub named_graphs: BTreeSet<Term>,
}

impl Dataset {
    /// Empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a default graph
    pub fn with_default_graph(mut self, graph: Term) -> Self {
        self.default_graphs.insert(graph);
        self
    }

    /// Add a named graph
    pub fn with_named_graph(mut self, graph: Term) -> Self {
        self.named_graphs.insert(graph);
        self
    }
}
