use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

use crate::aggregate::ShapeStats;

/// One report record per query shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedLine {
    pub namespace: String,
    pub command: String,
    pub query_pattern: String,
    pub count: u64,
    pub min_milliseconds: u64,
    pub max_milliseconds: u64,
    #[serde(rename = "averageMilliseconds")]
    pub average_milliseconds: f64,
    pub total_milliseconds: u64,
    pub is_collection_scan: bool,
    pub index_used: String,
}

impl From<&ShapeStats> for RenderedLine {
    fn from(s: &ShapeStats) -> Self {
        RenderedLine {
            namespace: s.namespace.clone(),
            command: s.command.clone(),
            query_pattern: s.filter.clone(),
            count: s.count,
            min_milliseconds: s.min_millis,
            max_milliseconds: s.max_millis,
            average_milliseconds: s.average_millis(),
            total_milliseconds: s.total_millis,
            is_collection_scan: s.is_collection_scan(),
            index_used: s.index.clone(),
        }
    }
}

/// Projects shapes to report records, slowest average first.
pub fn render(stats: &[ShapeStats]) -> Vec<RenderedLine> {
    stats
        .iter()
        .map(RenderedLine::from)
        .sorted_by(|a, b| b.average_milliseconds.total_cmp(&a.average_milliseconds))
        .collect()
}

/// Writes `lines` as a JSON array, one object per line.
pub fn write_json<W: Write>(out: &mut W, lines: &[RenderedLine]) -> io::Result<()> {
    out.write_all(b"[\n")?;
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.write_all(b",\n")?;
        }
        serde_json::to_writer(&mut *out, line)?;
    }
    if !lines.is_empty() {
        out.write_all(b"\n")?;
    }
    out.write_all(b"]\n")
}

pub fn to_json_string(lines: &[RenderedLine]) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_json(&mut buf, lines);
    String::from_utf8_lossy(&buf).into_owned()
}

/// Human-friendly duration, e.g. `1.5m`; sub-second values stay in ms.
pub fn milli_to_time_string(milli: f64) -> String {
    if milli >= 3_600_000.0 {
        format!("{:4.1}h", milli / 3_600_000.0)
    } else if milli >= 60_000.0 {
        format!("{:3.1}m", milli / 60_000.0)
    } else if milli >= 1000.0 {
        format!("{:3.1}s", milli / 1000.0)
    } else {
        format!("{:6.0}", milli)
    }
}
