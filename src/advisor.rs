//! Seams to the live-database collaborators, and the index assessment built
//! on top of them.
//!
//! Cardinality, explain plans and index usage all need a running server, so
//! they are traits here. The logic that consumes them (which fields a shape
//! touches, which indexes are redundant or unused) is plain code over the
//! parse result.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::aggregate::ShapeStats;
use crate::payload::{self, Value};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("namespace {0:?} has no collection part")]
    Namespace(String),
    #[error("provider failure: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCardinality {
    pub field: String,
    pub distinct: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalitySummary {
    pub sample_size: u64,
    pub list: Vec<FieldCardinality>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainSummary {
    pub winning_plan: String,
    pub keys_examined: u64,
    pub docs_examined: u64,
    pub execution_millis: u64,
}

pub trait CardinalityProvider {
    fn cardinality(
        &self,
        database: &str,
        collection: &str,
        fields: &[String],
    ) -> Result<CardinalitySummary, ProviderError>;
}

pub trait ExplainProvider {
    fn explain(&self, shape: &ShapeStats) -> Result<ExplainSummary, ProviderError>;
}

pub trait IndexUsageProvider {
    /// Collection name -> index usage records.
    fn list_index_usage(&self, database: &str) -> Result<BTreeMap<String, Vec<IndexUsageRecord>>, ProviderError>;
}

/// Collaborator findings for one shape; absent parts failed and were logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeReview {
    pub namespace: String,
    pub command: String,
    pub query_pattern: String,
    pub fields: Vec<String>,
    pub cardinality: Option<CardinalitySummary>,
    pub explain: Option<ExplainSummary>,
}

pub fn split_namespace(ns: &str) -> Result<(&str, &str), ProviderError> {
    match ns.split_once('.') {
        Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok((db, coll)),
        _ => Err(ProviderError::Namespace(ns.to_string())),
    }
}

/// Field names a shape filters or sorts on, in order of first appearance.
pub fn shape_fields(shape: &ShapeStats) -> Vec<String> {
    let text = shape.filter.as_str();
    let mut fields = Vec::new();
    if let Some(end) = payload::closing(text, 0) {
        if let Ok(doc) = payload::parse(&text[..end]) {
            collect_fields(&doc, &mut fields);
        }
        if let Some(sort) = payload::doc_after(&text[end..], "sort: ") {
            if let Ok(doc) = payload::parse(sort) {
                collect_fields(&doc, &mut fields);
            }
        }
    }
    fields.into_iter().unique().collect()
}

fn collect_fields(v: &Value, out: &mut Vec<String>) {
    let Value::Object(members) = v else {
        return;
    };
    for (k, _) in members {
        if !k.starts_with('$') {
            out.push(k.trim_matches(|c| c == '"' || c == '\'').to_string());
        }
    }
}

/// Asks the collaborators about every shape. Failures are logged and leave the
/// corresponding part empty; the remaining shapes are still reviewed.
pub fn review_shapes(
    shapes: &[ShapeStats],
    cardinality: &dyn CardinalityProvider,
    explain: &dyn ExplainProvider,
) -> Vec<ShapeReview> {
    let mut out = Vec::with_capacity(shapes.len());
    for shape in shapes {
        let fields = shape_fields(shape);
        let card = split_namespace(&shape.namespace)
            .and_then(|(db, coll)| cardinality.cardinality(db, coll, &fields));
        let card = match card {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(ns = %shape.namespace, error = %e, "cardinality lookup failed");
                None
            }
        };
        let plan = match explain.explain(shape) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(ns = %shape.namespace, pattern = %shape.filter, error = %e, "explain failed");
                None
            }
        };
        out.push(ShapeReview {
            namespace: shape.namespace.clone(),
            command: shape.command.clone(),
            query_pattern: shape.filter.clone(),
            fields,
            cardinality: card,
            explain: plan,
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAccess {
    pub host: String,
    pub ops: u64,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexUsageRecord {
    pub name: String,
    /// Key pattern in index order, e.g. `[("a", "1"), ("b", "-1")]`.
    pub key: Vec<(String, String)>,
    pub is_shard_key: bool,
    pub accesses: Vec<IndexAccess>,
}

impl IndexUsageRecord {
    pub fn key_string(&self) -> String {
        let body = self.key.iter().map(|(k, v)| format!("{k}: {v}")).join(", ");
        format!("{{ {body} }}")
    }

    /// Key pattern with direction ignored and the closing brace dropped, so
    /// that a prefix index is a string prefix of the wider one.
    pub fn effective_key(&self) -> String {
        let key = self.key_string();
        key[..key.len() - 2].replace(": -1", ": 1")
    }

    pub fn total_ops(&self) -> u64 {
        self.accesses.iter().map(|a| a.ops).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexStatus {
    Normal,
    ShardKey,
    /// Covered by a wider index sharing its prefix.
    Redundant,
    /// No recorded accesses.
    Unused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFinding {
    pub namespace: String,
    pub name: String,
    pub key: String,
    pub status: IndexStatus,
    pub total_ops: u64,
}

impl fmt::Display for IndexFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.status {
            IndexStatus::Normal => ' ',
            IndexStatus::ShardKey => '*',
            IndexStatus::Redundant => 'x',
            IndexStatus::Unused => '?',
        };
        write!(f, "{marker} {} {}", self.namespace, self.key)
    }
}

const ID_INDEX_KEY: &str = "{ _id: 1 }";

/// Flags the indexes of one collection. Records are compared in effective-key
/// order; `_id` and shard-key indexes are never reported as removable.
pub fn assess_indexes(namespace: &str, records: &[IndexUsageRecord]) -> Vec<IndexFinding> {
    let sorted: Vec<(&IndexUsageRecord, String)> = records
        .iter()
        .map(|r| (r, r.effective_key()))
        .sorted_by(|a, b| a.1.cmp(&b.1))
        .collect();
    let mut out = Vec::with_capacity(sorted.len());
    for (i, (rec, eff)) in sorted.iter().enumerate() {
        let key = rec.key_string();
        let status = if rec.is_shard_key {
            IndexStatus::ShardKey
        } else if key == ID_INDEX_KEY {
            IndexStatus::Normal
        } else if sorted.get(i + 1).map_or(false, |(_, next)| next.starts_with(eff.as_str())) {
            IndexStatus::Redundant
        } else if rec.total_ops() == 0 {
            IndexStatus::Unused
        } else {
            IndexStatus::Normal
        };
        out.push(IndexFinding {
            namespace: namespace.to_string(),
            name: rec.name.clone(),
            key,
            status,
            total_ops: rec.total_ops(),
        });
    }
    out
}

/// Index findings for every collection of `database`, collections in name order.
pub fn review_indexes(database: &str, provider: &dyn IndexUsageProvider) -> Result<Vec<IndexFinding>, ProviderError> {
    let usage = provider.list_index_usage(database)?;
    Ok(usage
        .iter()
        .flat_map(|(coll, records)| assess_indexes(&format!("{database}.{coll}"), records))
        .collect())
}
