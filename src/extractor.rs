use crate::canonical;
use crate::payload::{self, doc_after};

pub const COLLSCAN: &str = "COLLSCAN";

const OPLOG_NAMESPACE: &str = "local.oplog.rs";
const COMMAND_SUFFIX: &str = ".$cmd";

// Operations that carry a query worth grouping; everything else is noise.
const FILTERED_OPS: &[&str] = &[
    "count",
    "distinct",
    "delete",
    "find",
    "remove",
    "update",
    "aggregate",
    "getMore",
    "getmore",
    "findAndModify",
];

const PIPELINE_MARKERS: [&str; 2] = ["pipeline: [ { $match: ", "pipeline: [ { $sort: "];

/// The query payload of one operation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Verb after unwrapping `command` records.
    pub op: String,
    /// Raw filter document, not yet canonicalized.
    pub filter: String,
    /// Stage suffix such as `, group: {..}, sort: {..}`; empty when absent.
    pub stages: String,
}

pub fn scan_type(line: &str) -> &'static str {
    if line.contains(COLLSCAN) {
        COLLSCAN
    } else {
        ""
    }
}

/// Index reported by the plan summary: the IXSCAN key pattern, or one of the
/// plan names that imply an index-like access path.
pub fn index_used(line: &str, scan: &str) -> String {
    let mut index = doc_after(line, "planSummary: IXSCAN")
        .map(canonical::stage_text)
        .unwrap_or_default();
    if index.is_empty() && line.contains("planSummary: EOF") {
        index = "EOF".to_string();
    }
    if index.is_empty() && line.contains("planSummary: IDHACK") {
        index = "IDHACK".to_string();
    }
    if scan.is_empty() && line.contains("planSummary: COUNT_SCAN") {
        index = "COUNT_SCAN".to_string();
    }
    index
}

/// Locates the filter of a matched record. `None` means the record is not a
/// query worth grouping and should be skipped.
pub fn extract(op: &str, namespace: &str, body: &str, scan: &str) -> Option<Extracted> {
    if namespace == OPLOG_NAMESPACE || namespace.ends_with(COMMAND_SUFFIX) {
        return None;
    }
    let payload = payload::leading_payload(body);
    let (op, payload) = if op == "command" {
        unwrap_command(payload)?
    } else {
        (op, payload)
    };
    if !FILTERED_OPS.contains(&op) {
        return None;
    }

    let (filter, stages) = match op {
        "find" => find_filter(payload)?,
        "count" | "distinct" => (doc_after(payload, "query: ")?.to_string(), String::new()),
        "delete" if payload.contains("writeConcern:") => return None,
        "delete" | "update" | "remove" | "findAndModify" => (write_filter(payload)?.to_string(), String::new()),
        "aggregate" => pipeline_filter(payload, scan)?,
        "getmore" if has_pipeline(payload) => pipeline_filter(payload, scan)?,
        _ => {
            let origin = doc_after(body, "originatingCommand: ")?;
            if has_pipeline(origin) {
                pipeline_filter(origin, scan)?
            } else if doc_after(origin, "filter: ").is_some() {
                find_filter(origin)?
            } else {
                return None;
            }
        }
    };
    Some(Extracted { op: op.to_string(), filter, stages })
}

/// `<verb> {payload}` nested after `command: `.
fn unwrap_command(payload: &str) -> Option<(&str, &str)> {
    let inner = match payload.find("command: ") {
        Some(idx) => &payload[idx + "command: ".len()..],
        None => payload,
    };
    let (verb, rest) = inner.split_once(' ')?;
    if verb.is_empty() || !verb.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let rest = rest.trim_start();
    if rest.starts_with('{') && rest.ends_with('}') {
        Some((verb, rest))
    } else {
        None
    }
}

fn has_pipeline(text: &str) -> bool {
    text.find("pipeline:").map_or(false, |idx| idx > 0)
}

/// A query's sort is part of its shape with directions placeholdered, unlike
/// pipeline `$sort` stages. `None` when the sort document does not parse.
fn find_filter(payload: &str) -> Option<(String, String)> {
    let filter = doc_after(payload, "filter: ").unwrap_or("{ }").to_string();
    let stages = match doc_after(payload, "sort: ") {
        Some(sort) => format!(", sort: {}", canonical::sort_signature(sort).ok()?),
        None => String::new(),
    };
    Some((filter, stages))
}

fn write_filter(payload: &str) -> Option<&str> {
    let named = if payload.contains("query: ") {
        doc_after(payload, "query: ")
    } else {
        doc_after(payload, "q: ")
    };
    // Write records whose tag already consumed `query:` hold the filter directly.
    named.or_else(|| payload.find('{').map(|start| &payload[start..]))
}

fn pipeline_filter(text: &str, scan: &str) -> Option<(String, String)> {
    for marker in PIPELINE_MARKERS {
        let Some(first) = doc_after(text, marker) else {
            continue;
        };
        let mut stages = String::new();
        let group_at = text.find("$group: ");
        let sort_at = text.find("$sort: ");
        if let Some(g) = group_at {
            if sort_at.map_or(true, |s| g < s) {
                if let Some(group) = doc_after(text, "$group: ") {
                    stages.push_str(", group: ");
                    stages.push_str(&canonical::stage_text(group));
                }
            }
        }
        if sort_at.is_some() {
            if let Some(sort) = doc_after(text, "$sort: ") {
                stages.push_str(", sort: ");
                stages.push_str(&canonical::stage_text(sort));
            }
        }
        return Some((first.to_string(), stages));
    }
    // A collection scan without $match or $sort still deserves a shape.
    if scan == COLLSCAN {
        Some(("{}".to_string(), String::new()))
    } else {
        None
    }
}
