use serde::{Deserialize, Serialize};

pub const SLOW_OPS_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlowOpEntry {
    pub millis: u64,
    pub raw_line: String,
}

/// Bounded list of the longest-running operations, slowest first.
#[derive(Debug, Clone)]
pub struct SlowOpTracker {
    entries: Vec<SlowOpEntry>,
    capacity: usize,
}

impl Default for SlowOpTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SlowOpTracker {
    pub fn new() -> Self {
        Self::with_capacity(SLOW_OPS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity + 1), capacity }
    }

    /// Keeps `raw_line` if there is room or it beats the fastest entry held.
    /// Equal durations stay in arrival order.
    pub fn consider(&mut self, millis: u64, raw_line: &str) {
        if self.capacity == 0 {
            return;
        }
        let full = self.entries.len() >= self.capacity;
        if full && self.entries.last().map_or(false, |min| millis <= min.millis) {
            return;
        }
        self.entries.push(SlowOpEntry { millis, raw_line: raw_line.to_string() });
        self.entries.sort_by(|a, b| b.millis.cmp(&a.millis));
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> &[SlowOpEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<SlowOpEntry> {
        self.entries
    }
}
