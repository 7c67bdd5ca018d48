use flate2::write::GzEncoder;
use flate2::Compression;
use queryscope::extractor::COLLSCAN;
use queryscope::loginfo::{LogInfo, LogInfoError, ParseOpts, ParseRun};
use queryscope::session::LogSessionInfo;
use std::fs;
use std::io::Write;
use std::path::Path;

fn find_line(ts: &str, filter: &str, plan: &str, millis: u64) -> String {
    format!(
        r#"{ts} I COMMAND  [conn12] command db.users command: find {{ find: "users", filter: {filter}, $db: "db" }} planSummary: {plan} keysExamined:1 docsExamined:1 nreturned:1 reslen:233 protocol:op_msg {millis}ms"#
    )
}

fn sample_log() -> String {
    [
        "2019-05-09T15:00:00.000-0400 I CONTROL  [initandlisten] db version v4.0.9".to_string(),
        r#"2019-05-09T15:00:00.001-0400 I CONTROL  [initandlisten] options: { net: { port: 27017 }, storage: { dbPath: "/data/db" } }"#.to_string(),
        "2019-05-09T15:00:01.000-0400 I NETWORK  [listener] connection accepted from 127.0.0.1:50000 #1 (1 connection now open)".to_string(),
        find_line("2019-05-09T15:19:43.456-0400", r#"{ age: 30, name: "abc" }"#, "IXSCAN { age: 1 }", 120),
        find_line("2019-05-09T15:20:43.456-0400", r#"{ name: "xyz", age: 41 }"#, "IXSCAN { age: 1 }", 80),
        find_line("2019-05-09T15:21:43.456-0400", "{ status: { $in: [ \"A\", \"B\", \"C\" ] } }", "COLLSCAN", 300),
        find_line("2019-05-09T15:22:43.456-0400", "{ status: { $in: [ \"A\" ] } }", "COLLSCAN", 100),
        r#"2019-05-09T15:23:00.000-0400 I COMMAND  [conn3] command db.users command: find { find: "users", filter: { a: 1 } } planSummary: COLLSCAN 5ms"#.to_string(),
    ]
    .join("\n")
}

#[test]
fn parse_run_groups_equivalent_queries() {
    let mut run = ParseRun::new(ParseOpts::default());
    for line in sample_log().lines() {
        run.ingest(line);
    }
    let result = run.finish(8, LogSessionInfo::default());

    assert_eq!(result.ops_patterns.len(), 3);
    let slowest = &result.ops_patterns[0];
    assert_eq!(slowest.filter, "{status: {$in: [...]}}");
    assert_eq!(slowest.scan, COLLSCAN);
    assert_eq!(slowest.count, 2);
    assert_eq!(slowest.total_millis, 400);

    let age = &result.ops_patterns[1];
    assert_eq!(age.command, "find");
    assert_eq!(age.filter, "{age: 1, name: 1}");
    assert_eq!(age.scan, "");
    assert_eq!(age.index, "{age: 1}");
    assert_eq!((age.count, age.max_millis, age.total_millis), (2, 120, 200));
    assert_eq!(age.average_millis(), 100.0);

    assert_eq!(result.summary.matched_lines, 5);
    assert_eq!(result.summary.aggregated_lines, 5);
    assert_eq!(result.summary.skipped_lines, 0);
    assert_eq!(result.summary.start_date.as_deref(), Some("2019-05-09T19:19:43.456Z"));
    assert_eq!(result.summary.end_date.as_deref(), Some("2019-05-09T19:23:00.000Z"));

    let slow: Vec<u64> = result.slow_ops.iter().map(|e| e.millis).collect();
    assert_eq!(slow, vec![300, 120, 100, 80, 5]);
}

#[test]
fn queries_differing_only_in_sort_direction_share_a_shape() {
    let line = |ts: &str, dir: &str, millis: u64| {
        format!(
            r#"{ts} I COMMAND  [conn4] command db.users command: find {{ find: "users", filter: {{ age: 30 }}, sort: {{ ts: {dir} }}, $db: "db" }} planSummary: IXSCAN {{ age: 1 }} keysExamined:1 docsExamined:1 {millis}ms"#
        )
    };
    let mut run = ParseRun::new(ParseOpts::default());
    run.ingest(&line("2019-05-09T15:19:43.456-0400", "1", 40));
    run.ingest(&line("2019-05-09T15:19:44.456-0400", "-1", 60));
    let result = run.finish(2, LogSessionInfo::default());
    assert_eq!(result.ops_patterns.len(), 1);
    assert_eq!(result.ops_patterns[0].filter, "{age: 1}, sort: {ts: 1}");
    assert_eq!(result.ops_patterns[0].count, 2);
    assert_eq!(result.ops_patterns[0].total_millis, 100);
}

#[test]
fn collscan_only_drops_indexed_shapes() {
    let mut run = ParseRun::new(ParseOpts { collscan_only: true, ..Default::default() });
    for line in sample_log().lines() {
        run.ingest(line);
    }
    let result = run.finish(8, LogSessionInfo::default());
    assert!(result.ops_patterns.iter().all(|s| s.is_collection_scan()));
    assert_eq!(result.ops_patterns.len(), 2);
    assert!(result.slow_ops.iter().all(|e| e.raw_line.contains(COLLSCAN)));
}

#[test]
fn unparseable_filters_are_counted_as_skipped() {
    let mut run = ParseRun::new(ParseOpts::default());
    run.ingest(&find_line("2019-05-09T15:19:43.456-0400", "{ a: [ 1, }", "COLLSCAN", 50));
    run.ingest("2019-05-09T15:19:44.000-0400 I COMMAND  [conn1] command db.users command: insert { insert: \"users\" } ninserted:1 9ms");
    let result = run.finish(2, LogSessionInfo::default());
    assert!(result.ops_patterns.is_empty());
    assert!(result.slow_ops.is_empty());
    assert_eq!(result.summary.matched_lines, 2);
    assert_eq!(result.summary.skipped_lines, 2);
    assert_eq!(result.summary.start_date, None);
}

#[test]
fn analyze_writes_and_reloads_the_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("mongod.log");
    fs::write(&log, sample_log()).unwrap();

    let opts = ParseOpts { silent: true, ..Default::default() };
    let mut li = LogInfo::new(&log, opts).output_dir(dir.path());
    let parsed = li.analyze().unwrap();
    let artifact = dir.path().join("mongod.log.enc");
    assert_eq!(li.output_filename(), Some(artifact.as_path()));
    assert!(artifact.exists());

    assert_eq!(parsed.summary.total_lines, 8);
    assert_eq!(parsed.session.db_lines, vec!["db version v4.0.9".to_string()]);
    assert_eq!(parsed.session.db_path.as_deref(), Some("/data/db"));

    let mut reload = LogInfo::new(&artifact, opts);
    assert_eq!(reload.output_filename(), None);
    assert_eq!(reload.analyze().unwrap(), parsed);
}

#[test]
fn gzip_input_is_decompressed() {
    let dir = tempfile::tempdir().unwrap();
    let gz = dir.path().join("mongod.log.gz");
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(sample_log().as_bytes()).unwrap();
    fs::write(&gz, enc.finish().unwrap()).unwrap();

    let opts = ParseOpts { silent: true, ..Default::default() };
    let mut li = LogInfo::new(&gz, opts).output_dir(dir.path());
    let result = li.analyze().unwrap();
    assert_eq!(result.ops_patterns.len(), 3);
    assert!(dir.path().join("mongod.log.enc").exists());
}

#[test]
fn corrupt_artifact_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("broken.enc");
    fs::write(&artifact, b"not an artifact").unwrap();
    let mut li = LogInfo::new(&artifact, ParseOpts::default());
    assert!(matches!(li.analyze(), Err(LogInfoError::Cache(_))));
}

#[test]
fn missing_input_is_an_io_error() {
    let li = LogInfo::new(Path::new("/nonexistent/mongod.log"), ParseOpts::default());
    assert!(matches!(li.parse(), Err(LogInfoError::Io(_))));
}

#[test]
fn verbose_summary_includes_session_and_slow_ops() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("mongod.log");
    fs::write(&log, sample_log()).unwrap();

    let li = LogInfo::new(&log, ParseOpts { silent: true, verbose: true, ..Default::default() });
    let result = li.parse().unwrap();
    let text = li.summary(&result);
    assert!(text.starts_with("db version v4.0.9\n"));
    assert!(text.contains("config options:"));
    assert!(text.contains("Ops slower than 10 seconds (list top 5):"));
    assert!(text.contains("\"queryPattern\":\"{age: 1, name: 1}\""));

    let quiet = LogInfo::new(&log, ParseOpts { silent: true, ..Default::default() });
    let text = quiet.summary(&result);
    assert!(text.starts_with('['));
    assert!(!text.contains("config options:"));
}
