//! Per-device attribute cache.
//!
//! Holds the last-known sample for every subscribed attribute, keyed
//! case-insensitively. Two special write paths exist: blanking the whole
//! cache when the parent device stops being trustworthy, and writing the
//! error sentinel into a single attribute once its error counter trips.
//!
//! The exact attribute named `state` is the parent's own state and is never
//! blanked; other attributes whose name merely contains `state` are
//! status-like strings and get the textual `UNKNOWN` sentinel instead of
//! the null value.

use vacline_core::{AttrValue, AttributeSample, CaselessMap, Quality};

/// Case-insensitive cache of the latest attribute samples.
#[derive(Debug, Clone, Default)]
pub struct AttributeCache {
    samples: CaselessMap<AttributeSample>,
}

impl AttributeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with placeholder samples for the given attributes.
    pub fn seed<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            if !self.samples.contains_key(name) {
                self.samples.insert(name, AttributeSample::seed(name));
            }
        }
    }

    /// Store a sample under its own name.
    pub fn update(&mut self, sample: AttributeSample) {
        self.samples.insert(sample.name.clone(), sample);
    }

    /// Latest sample for an attribute.
    pub fn get(&self, name: &str) -> Option<&AttributeSample> {
        self.samples.get(name)
    }

    /// Latest value for an attribute.
    pub fn value_of(&self, name: &str) -> Option<&AttrValue> {
        self.samples.get(name).map(|s| &s.value)
    }

    /// Cached attribute names, lowercased and sorted.
    pub fn names(&self) -> Vec<String> {
        self.samples.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Write the error sentinel into one attribute.
    pub fn write_sentinel(&mut self, name: &str) {
        let value = sentinel_value(name);
        self.samples
            .insert(name, AttributeSample::new(name, value, Quality::Invalid));
    }

    /// Blank every attribute except the parent state itself.
    ///
    /// Called when the parent device enters INIT or UNKNOWN: nothing it
    /// published before can be trusted any more.
    pub fn blank_for_untrusted(&mut self) {
        let names: Vec<String> = self
            .samples
            .keys()
            .filter(|n| n.as_str() != "state")
            .cloned()
            .collect();
        for name in names {
            self.write_sentinel(&name);
        }
    }
}

fn sentinel_value(name: &str) -> AttrValue {
    if name.to_lowercase().contains("state") {
        AttrValue::Text("UNKNOWN".to_string())
    } else {
        AttrValue::Null
    }
}
