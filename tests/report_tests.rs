use queryscope::aggregate::ShapeStats;
use queryscope::report::{milli_to_time_string, render, to_json_string, write_json, RenderedLine};

fn stats(filter: &str, count: u64, total: u64, scan: &str) -> ShapeStats {
    ShapeStats {
        command: "find".into(),
        filter: filter.into(),
        scan: scan.into(),
        namespace: "db.users".into(),
        index: String::new(),
        count,
        total_millis: total,
        max_millis: total,
        min_millis: total / count,
    }
}

#[test]
fn render_orders_by_average() {
    let lines = render(&[stats("{a: 1}", 4, 100, ""), stats("{b: 1}", 1, 300, "COLLSCAN")]);
    assert_eq!(lines[0].query_pattern, "{b: 1}");
    assert!(lines[0].is_collection_scan);
    assert_eq!(lines[1].average_milliseconds, 25.0);
    assert!(!lines[1].is_collection_scan);
}

#[test]
fn json_field_names() {
    let lines = render(&[stats("{age: 1, name: 1}", 2, 200, "")]);
    let v = serde_json::to_value(&lines[0]).unwrap();
    let obj = v.as_object().unwrap();
    for field in [
        "namespace",
        "command",
        "queryPattern",
        "count",
        "minMilliseconds",
        "maxMilliseconds",
        "averageMilliseconds",
        "totalMilliseconds",
        "isCollectionScan",
        "indexUsed",
    ] {
        assert!(obj.contains_key(field), "missing {field}");
    }
    assert_eq!(v["queryPattern"], "{age: 1, name: 1}");
    assert_eq!(v["averageMilliseconds"], 100.0);
}

#[test]
fn written_report_is_a_json_array() {
    let lines = render(&[stats("{a: 1}", 1, 10, ""), stats("{b: 1}", 1, 20, "")]);
    let mut buf = Vec::new();
    write_json(&mut buf, &lines).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 4);
    let back: Vec<RenderedLine> = serde_json::from_str(&text).unwrap();
    assert_eq!(back, lines);
}

#[test]
fn empty_report() {
    let text = to_json_string(&[]);
    let back: Vec<RenderedLine> = serde_json::from_str(&text).unwrap();
    assert!(back.is_empty());
}

#[test]
fn duration_strings() {
    assert_eq!(milli_to_time_string(500.0).trim(), "500");
    assert_eq!(milli_to_time_string(1500.0), "1.5s");
    assert_eq!(milli_to_time_string(90_000.0), "1.5m");
    assert_eq!(milli_to_time_string(5_400_000.0).trim(), "1.5h");
}
