//! Case-insensitive ordered map.
//!
//! Attribute names arrive from notification sources with inconsistent casing
//! ("Pressure", "pressure", "PRESSURE" all name the same attribute). The
//! caches and error counters therefore key everything through this map, which
//! lowercases keys on the way in and iterates in sorted order.

use std::collections::BTreeMap;

/// An ordered map whose string keys compare case-insensitively.
///
/// Keys are stored lowercased; iteration order is the sorted order of the
/// lowercased keys.
#[derive(Debug, Clone, PartialEq)]
pub struct CaselessMap<V> {
    inner: BTreeMap<String, V>,
}

// Manual impl: a derive would demand `V: Default` for an empty map.
impl<V> Default for CaselessMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CaselessMap<V> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Insert a value, replacing and returning any previous value for the key.
    pub fn insert(&mut self, key: impl AsRef<str>, value: V) -> Option<V> {
        self.inner.insert(key.as_ref().to_lowercase(), value)
    }

    /// Look up a value.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&V> {
        self.inner.get(&key.as_ref().to_lowercase())
    }

    /// Look up a value mutably.
    pub fn get_mut(&mut self, key: impl AsRef<str>) -> Option<&mut V> {
        self.inner.get_mut(&key.as_ref().to_lowercase())
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: impl AsRef<str>) -> bool {
        self.inner.contains_key(&key.as_ref().to_lowercase())
    }

    /// Remove a key, returning its value if it was present.
    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<V> {
        self.inner.remove(&key.as_ref().to_lowercase())
    }

    /// Lowercased keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    /// Entries in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.inner.iter()
    }

    /// Mutable entries in sorted key order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut V)> {
        self.inner.iter_mut()
    }

    /// Values in sorted key order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.inner.clear()
    }
}

impl<K: AsRef<str>, V> FromIterator<(K, V)> for CaselessMap<V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
