//! Grouping of per-record observations into labelled metric samples.
//!
//! Every metric family is built the same way: pick a grouping key per record,
//! extract an observation, then fold each group into a histogram, a sum, a
//! count, or a distinct-id count. Records whose key cannot be computed (stale
//! references) are skipped.

use std::collections::{BTreeMap, BTreeSet};

use crate::family::{GaugeFamily, HistogramFamily, MetricDesc};
use crate::histogram::build_histogram;

/// Observations grouped by key.
#[derive(Debug, Clone)]
pub struct Grouped<K> {
    groups: BTreeMap<K, Vec<f64>>,
}

impl<K: Ord> Default for Grouped<K> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<K: Ord> Grouped<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure each key emits a sample, even without observations.
    pub fn seed(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        for key in keys {
            self.groups.entry(key).or_default();
        }
        self
    }

    pub fn observe(&mut self, key: K, value: f64) {
        self.groups.entry(key).or_default().push(value);
    }

    /// Fold `items` in: `key` picks the group (or rejects the item), `extract`
    /// the observation (or none).
    pub fn extend<T>(
        mut self,
        items: impl IntoIterator<Item = T>,
        key: impl Fn(&T) -> Option<K>,
        extract: impl Fn(&T) -> Option<f64>,
    ) -> Self {
        for item in items {
            if let Some(k) = key(&item) {
                let group = self.groups.entry(k).or_default();
                if let Some(value) = extract(&item) {
                    group.push(value);
                }
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&[f64]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// One histogram sample per group.
    pub fn into_histogram(
        self,
        desc: &MetricDesc,
        boundaries: &[f64],
        labels: impl Fn(&K) -> Vec<String>,
    ) -> HistogramFamily {
        let mut family = HistogramFamily::new(desc);
        for (key, observations) in &self.groups {
            family.add(labels(key), build_histogram(observations, boundaries));
        }
        family
    }

    /// One gauge sample per group holding the sum of its observations.
    pub fn into_sum_gauge(self, desc: &MetricDesc, labels: impl Fn(&K) -> Vec<String>) -> GaugeFamily {
        let mut family = GaugeFamily::new(desc);
        for (key, observations) in &self.groups {
            family.add(labels(key), observations.iter().sum());
        }
        family
    }

    /// One gauge sample per group holding its number of observations.
    pub fn into_count_gauge(self, desc: &MetricDesc, labels: impl Fn(&K) -> Vec<String>) -> GaugeFamily {
        let mut family = GaugeFamily::new(desc);
        for (key, observations) in &self.groups {
            family.add(labels(key), observations.len() as f64);
        }
        family
    }
}

/// Distinct ids per group, for counts that must not double count repeats.
#[derive(Debug, Clone)]
pub struct Distinct<K> {
    groups: BTreeMap<K, BTreeSet<i64>>,
}

impl<K: Ord> Default for Distinct<K> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<K: Ord> Distinct<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        for key in keys {
            self.groups.entry(key).or_default();
        }
        self
    }

    pub fn extend<T>(
        mut self,
        items: impl IntoIterator<Item = T>,
        key: impl Fn(&T) -> Option<K>,
        id: impl Fn(&T) -> Option<i64>,
    ) -> Self {
        for item in items {
            if let Some(k) = key(&item) {
                let set = self.groups.entry(k).or_default();
                if let Some(id) = id(&item) {
                    set.insert(id);
                }
            }
        }
        self
    }

    pub fn count(&self, key: &K) -> usize {
        self.groups.get(key).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn into_gauge(self, desc: &MetricDesc, labels: impl Fn(&K) -> Vec<String>) -> GaugeFamily {
        let mut family = GaugeFamily::new(desc);
        for (key, ids) in &self.groups {
            family.add(labels(key), ids.len() as f64);
        }
        family
    }
}

/// `"1"` / `"0"` label for a boolean flag.
pub fn flag_label(flag: bool) -> String {
    if flag { "1".to_string() } else { "0".to_string() }
}
