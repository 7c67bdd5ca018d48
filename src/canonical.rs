//! Query-shape canonicalization.
//!
//! Each pass is a standalone function over the payload tree so it can be
//! exercised on its own; [`canonicalize`] runs them in order. Rendering the
//! tree compactly takes the place of whitespace normalization.

use crate::payload::{self, PayloadError, Scalar, Value};

/// Collapses `$in` / `$nin` enumerations to `[...]` whatever their length.
pub fn truncate_enumerations(v: &mut Value) {
    match v {
        Value::Object(fields) => {
            for (k, val) in fields.iter_mut() {
                if (k == "$in" || k == "$nin") && matches!(val, Value::Array(_) | Value::Elided) {
                    *val = Value::Elided;
                } else {
                    truncate_enumerations(val);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(truncate_enumerations),
        Value::Elided | Value::Scalar(_) => {}
    }
}

/// `$regex` operands become `/.../.../`; inline regex literals keep only their flags.
pub fn redact_regexes(v: &mut Value) {
    match v {
        Value::Object(fields) => {
            for (k, val) in fields.iter_mut() {
                if k == "$regex" {
                    *val = Value::Scalar(Scalar::RedactedRegex);
                } else {
                    redact_regexes(val);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_regexes),
        Value::Scalar(Scalar::Regex { pattern, .. }) => *pattern = "regex".to_string(),
        Value::Elided | Value::Scalar(_) => {}
    }
}

/// Strings, numbers, booleans and dates become the placeholder.
pub fn replace_literals(v: &mut Value) {
    match v {
        Value::Object(fields) => fields.iter_mut().for_each(|(_, val)| replace_literals(val)),
        Value::Array(items) => items.iter_mut().for_each(replace_literals),
        Value::Scalar(s @ (Scalar::Str(_) | Scalar::Number(_) | Scalar::Bool(_) | Scalar::Date(_))) => {
            *s = Scalar::Placeholder
        }
        Value::Elided | Value::Scalar(_) => {}
    }
}

/// Drops shard-version annotations at any depth.
pub fn strip_routing_metadata(v: &mut Value) {
    match v {
        Value::Object(fields) => {
            fields.retain(|(k, _)| k != "shardVersion");
            fields.iter_mut().for_each(|(_, val)| strip_routing_metadata(val));
        }
        Value::Array(items) => items.iter_mut().for_each(strip_routing_metadata),
        Value::Elided | Value::Scalar(_) => {}
    }
}

/// ObjectId, UUID, Timestamp and BinData literals become the placeholder.
pub fn replace_opaque_ids(v: &mut Value) {
    match v {
        Value::Object(fields) => fields.iter_mut().for_each(|(_, val)| replace_opaque_ids(val)),
        Value::Array(items) => items.iter_mut().for_each(replace_opaque_ids),
        Value::Scalar(s @ Scalar::Opaque(_)) => *s = Scalar::Placeholder,
        Value::Elided | Value::Scalar(_) => {}
    }
}

/// Rebuilds the top level from its named fields, sorted lexicographically.
///
/// Top-level operators (`$or`, `$and`, ...) and field names with embedded
/// whitespace are dropped. Repeated names keep their first value.
pub fn reorder_fields(v: Value) -> Value {
    let Value::Object(fields) = v else {
        return v;
    };
    let mut named: Vec<(String, Value)> = Vec::with_capacity(fields.len());
    for (k, val) in fields {
        if k.starts_with('$') || k.chars().any(char::is_whitespace) {
            continue;
        }
        if !named.iter().any(|(n, _)| *n == k) {
            named.push((k, val));
        }
    }
    named.sort_by(|a, b| a.0.cmp(&b.0));
    Value::Object(named)
}

fn normalize_values(v: &mut Value) {
    truncate_enumerations(v);
    redact_regexes(v);
    replace_literals(v);
    strip_routing_metadata(v);
    replace_opaque_ids(v);
}

/// Canonical signature of a filter payload.
///
/// Pure and idempotent: feeding the output back in yields the same string.
pub fn canonicalize(filter: &str) -> Result<String, PayloadError> {
    let mut v = payload::parse(filter)?;
    normalize_values(&mut v);
    Ok(reorder_fields(v).render())
}

/// Signature of a query's sort document: values become placeholders like in
/// [`canonicalize`], but key order is kept since it is the sort precedence.
pub fn sort_signature(sort: &str) -> Result<String, PayloadError> {
    let mut v = payload::parse(sort)?;
    normalize_values(&mut v);
    Ok(v.render())
}

/// Compact rendering of a stage document (`$sort`, `$group`, index keys).
///
/// Literals are kept since they carry meaning here (sort direction, accumulator
/// expressions); only `1.0`/`-1.0` are folded to `1`/`-1`. Unparseable text is
/// returned with the same folding applied textually.
pub fn stage_text(raw: &str) -> String {
    fn fold(v: &mut Value) {
        match v {
            Value::Object(fields) => fields.iter_mut().for_each(|(_, val)| fold(val)),
            Value::Array(items) => items.iter_mut().for_each(fold),
            Value::Scalar(Scalar::Number(n)) => {
                if n == "1.0" {
                    *n = "1".to_string();
                } else if n == "-1.0" {
                    *n = "-1".to_string();
                }
            }
            Value::Elided | Value::Scalar(_) => {}
        }
    }
    match payload::parse(raw) {
        Ok(mut v) => {
            fold(&mut v);
            v.render()
        }
        Err(_) => raw.replace("1.0", "1"),
    }
}
