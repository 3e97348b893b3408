use std::collections::BTreeMap;

/// A map of canonical metric name to a finite numeric value.
///
/// `BTreeMap` gives deterministic iteration order, which matters for wire output
/// and for tests that assert on serialized event shape. Insertion rejects
/// non-finite values (NaN/Inf) rather than silently storing them, per the
/// `TransformedMetrics` invariant that every numeric metric is finite.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MetricMap(BTreeMap<String, f64>);

impl MetricMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a metric, silently dropping it if `value` is not finite.
    ///
    /// Dropped values leave the metric absent rather than stored as zero, matching
    /// the transformer's bounds-checking contract.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        if value.is_finite() {
            self.0.insert(name.into(), value);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend_from(&mut self, other: &MetricMap) {
        for (k, v) in other.iter() {
            self.insert(k.clone(), *v);
        }
    }
}

impl FromIterator<(String, f64)> for MetricMap {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut map = MetricMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_non_finite_values() {
        let mut map = MetricMap::new();
        map.insert("a", f64::NAN);
        map.insert("b", f64::INFINITY);
        map.insert("c", 1.0);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("c"), Some(1.0));
        assert_eq!(map.get("a"), None);
    }
}
