//! Merged, ordered policy view for one scope.

use std::collections::HashMap;

use serde::{Serialize, Serializer};

use crate::policy::PolicyEntry;

/// Ordered mapping of key path to entry.
///
/// Iteration follows first-insertion order. Re-inserting an existing key
/// replaces the entry in place, so an override never moves a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyView {
    entries: Vec<PolicyEntry>,
    index: HashMap<String, usize>,
}

impl PolicyView {
    /// Empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry`, returning the entry it replaced, if any.
    pub fn insert(&mut self, entry: PolicyEntry) -> Option<PolicyEntry> {
        let key = entry.key_path();
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos], entry)),
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    /// Looks up an entry by key and value name (case-insensitive).
    #[must_use]
    pub fn get(&self, key: &str, value_name: &str) -> Option<&PolicyEntry> {
        let probe = PolicyEntry::new(key, value_name, crate::value::PolicyValue::None);
        self.index.get(&probe.key_path()).map(|&pos| &self.entries[pos])
    }

    /// Number of distinct entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the view holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in precedence-stable order.
    pub fn iter(&self) -> impl Iterator<Item = &PolicyEntry> {
        self.entries.iter()
    }

    /// Key paths in enumeration order.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(PolicyEntry::key_path)
    }

    /// Flattened entries in enumeration order.
    #[must_use]
    pub fn values(&self) -> Vec<PolicyEntry> {
        self.entries.clone()
    }

    /// blake3 digest of the canonical JSON encoding, hex encoded.
    #[must_use]
    pub fn digest(&self) -> String {
        // Serializing plain data structures into a Vec cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

impl Serialize for PolicyView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl FromIterator<PolicyEntry> for PolicyView {
    fn from_iter<I: IntoIterator<Item = PolicyEntry>>(iter: I) -> Self {
        let mut view = Self::new();
        for entry in iter {
            view.insert(entry);
        }
        view
    }
}

impl<'a> IntoIterator for &'a PolicyView {
    type Item = &'a PolicyEntry;
    type IntoIter = std::slice::Iter<'a, PolicyEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
