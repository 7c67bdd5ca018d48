use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::extractor::COLLSCAN;

/// Identity of a query pattern group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapeKey {
    pub op: String,
    pub filter: String,
    pub scan: String,
}

/// Latency statistics of one query shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeStats {
    pub command: String,
    pub filter: String,
    pub scan: String,
    /// Last namespace seen for this shape.
    pub namespace: String,
    /// Last index seen for this shape; empty when none was reported.
    pub index: String,
    pub count: u64,
    pub total_millis: u64,
    pub max_millis: u64,
    pub min_millis: u64,
}

impl ShapeStats {
    pub fn average_millis(&self) -> f64 {
        self.total_millis as f64 / self.count as f64
    }

    pub fn is_collection_scan(&self) -> bool {
        self.scan == COLLSCAN
    }

    pub fn key(&self) -> ShapeKey {
        ShapeKey { op: self.command.clone(), filter: self.filter.clone(), scan: self.scan.clone() }
    }
}

/// Streaming fold of samples into per-shape statistics.
///
/// Memory grows with the number of distinct shapes only; entries are never
/// evicted.
#[derive(Debug, Default)]
pub struct ShapeAggregator {
    shapes: AHashMap<ShapeKey, ShapeStats>,
}

impl ShapeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, key: ShapeKey, namespace: &str, millis: u64, index_used: &str) {
        if let Some(stats) = self.shapes.get_mut(&key) {
            stats.count += 1;
            stats.total_millis += millis;
            stats.max_millis = stats.max_millis.max(millis);
            stats.min_millis = stats.min_millis.min(millis);
            // last write wins
            stats.namespace.clear();
            stats.namespace.push_str(namespace);
            stats.index.clear();
            stats.index.push_str(index_used);
            return;
        }
        let stats = ShapeStats {
            command: key.op.clone(),
            filter: key.filter.clone(),
            scan: key.scan.clone(),
            namespace: namespace.to_string(),
            index: index_used.to_string(),
            count: 1,
            total_millis: millis,
            max_millis: millis,
            min_millis: millis,
        };
        self.shapes.insert(key, stats);
    }

    pub fn get(&self, key: &ShapeKey) -> Option<&ShapeStats> {
        self.shapes.get(key)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// All shapes, slowest average first.
    pub fn into_sorted(self) -> Vec<ShapeStats> {
        let mut out: Vec<ShapeStats> = self.shapes.into_values().collect();
        sort_by_average(&mut out);
        out
    }
}

/// Descending average latency; ties fall back to the shape identity so the
/// order is reproducible across runs.
pub fn sort_by_average(shapes: &mut [ShapeStats]) {
    shapes.sort_by(|a, b| {
        b.average_millis()
            .total_cmp(&a.average_millis())
            .then_with(|| a.command.cmp(&b.command))
            .then_with(|| a.filter.cmp(&b.filter))
            .then_with(|| a.scan.cmp(&b.scan))
    });
}
