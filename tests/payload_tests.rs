use queryscope::payload::{self, PayloadError, Scalar, Value};

#[test]
fn parses_shell_style_document() {
    let text = r#"{ a: 1, b: { $in: [ "x", "y" ] }, c: new Date(1546300800000), d: /ab,c/i, e: ObjectId('5cd4a5e0f1d2a3b4c5d6e7f8') }"#;
    let v = payload::parse(text).expect("parse");
    assert_eq!(v.field("a"), Some(&Value::Scalar(Scalar::Number("1".into()))));
    assert_eq!(
        v.field("d"),
        Some(&Value::Scalar(Scalar::Regex { pattern: "ab,c".into(), flags: "i".into() }))
    );
    assert_eq!(
        v.field("e"),
        Some(&Value::Scalar(Scalar::Opaque("ObjectId('5cd4a5e0f1d2a3b4c5d6e7f8')".into())))
    );
    assert_eq!(
        v.render(),
        r#"{a: 1, b: {$in: ["x", "y"]}, c: new Date(1546300800000), d: /ab,c/i, e: ObjectId('5cd4a5e0f1d2a3b4c5d6e7f8')}"#
    );
}

#[test]
fn constructor_arguments_may_contain_commas() {
    let v = payload::parse("{ ts: Timestamp(1556000000, 3), n: null }").expect("parse");
    assert_eq!(v.field("ts"), Some(&Value::Scalar(Scalar::Opaque("Timestamp(1556000000, 3)".into()))));
    assert_eq!(v.field("n"), Some(&Value::Scalar(Scalar::Bare("null".into()))));
}

#[test]
fn quoted_keys_and_empty_containers() {
    let v = payload::parse(r#"{ "a b": {}, list: [ ] }"#).expect("parse");
    assert_eq!(v.field("\"a b\""), Some(&Value::Object(vec![])));
    assert_eq!(v.field("list"), Some(&Value::Array(vec![])));
}

#[test]
fn malformed_payloads_are_errors() {
    assert!(matches!(payload::parse("{ a: 1"), Err(PayloadError::UnexpectedEnd(_))));
    assert!(matches!(payload::parse("{ a: 1 } trailing"), Err(PayloadError::Trailing(_))));
    assert!(matches!(payload::parse("{ a: 1 ]"), Err(PayloadError::Unexpected { ch: ']', .. })));
    assert!(payload::parse("").is_err());
}

#[test]
fn leading_payload_cuts_at_first_balanced_document() {
    assert_eq!(
        payload::leading_payload("find { a: { b: 1 } } planSummary: IXSCAN { a: 1 }"),
        "find { a: { b: 1 } }"
    );
    assert_eq!(payload::leading_payload("no braces here"), "no braces here");
    assert_eq!(payload::leading_payload("open { never closed"), "open { never closed");
}

#[test]
fn doc_after_returns_documents_and_arrays() {
    let text = r#"{ find: "t", filter: { a: { $gt: 5 } }, sort: { a: -1 }, projection: [ 1, 2 ] }"#;
    assert_eq!(payload::doc_after(text, "filter: "), Some("{ a: { $gt: 5 } }"));
    assert_eq!(payload::doc_after(text, "sort: "), Some("{ a: -1 }"));
    assert_eq!(payload::doc_after(text, "projection: "), Some("[ 1, 2 ]"));
    assert_eq!(payload::doc_after(text, "find: "), None);
    assert_eq!(payload::doc_after(text, "hint: "), None);
}

#[test]
fn to_json_is_lossy_but_structured() {
    let v = payload::parse(r#"{ net: { port: 27017, bindIp: "0.0.0.0" }, fork: true, pid: null }"#).expect("parse");
    let json = v.to_json();
    assert_eq!(json["net"]["port"], serde_json::json!(27017));
    assert_eq!(json["net"]["bindIp"], serde_json::json!("0.0.0.0"));
    assert_eq!(json["fork"], serde_json::json!(true));
    assert!(json["pid"].is_null());
}
