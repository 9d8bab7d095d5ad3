//! Visibility maps.
//!
//! A map entry only ever moves up the precedence ladder
//! `DISABLE < HIDE < SHOW`, so the final state of a key is the strongest
//! effect any matching rule requested for it, whatever the rule order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Effect of a matched rule on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Show,
    Hide,
    Disable,
}

impl Visibility {
    fn rank(self) -> u8 {
        match self {
            Visibility::Disable => 0,
            Visibility::Hide => 1,
            Visibility::Show => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Show => "SHOW",
            Visibility::Hide => "HIDE",
            Visibility::Disable => "DISABLE",
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target key to effect, sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisibilityMap<K: Ord>(BTreeMap<K, Visibility>);

/// Heading idx to effect.
pub type HeadingVisibility = VisibilityMap<i64>;
/// Field id or option composite id to effect.
pub type FieldVisibility = VisibilityMap<String>;

impl<K: Ord> Default for VisibilityMap<K> {
    fn default() -> Self {
        VisibilityMap(BTreeMap::new())
    }
}

impl<K: Ord> VisibilityMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `effect` for `key` unless the key already holds an effect of
    /// equal or higher precedence. Returns whether the entry changed.
    pub fn apply(&mut self, key: K, effect: Visibility) -> bool {
        match self.0.get(&key) {
            Some(existing) if existing.rank() >= effect.rank() => false,
            _ => {
                self.0.insert(key, effect);
                true
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<Visibility> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Visibility)> {
        self.0.iter()
    }

    /// Keys currently marked `HIDE` or `DISABLE`.
    pub fn suppressed(&self) -> impl Iterator<Item = &K> {
        self.0
            .iter()
            .filter(|(_, v)| **v != Visibility::Show)
            .map(|(k, _)| k)
    }
}
