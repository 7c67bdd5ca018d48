//! Parse-run orchestration over one log file.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::aggregate::{ShapeAggregator, ShapeKey, ShapeStats};
use crate::cache::{self, CacheError};
use crate::extractor::{self, COLLSCAN};
use crate::slowops::{SlowOpEntry, SlowOpTracker};
use crate::session::{self, LogSessionInfo};
use crate::{canonical, matcher, reader, report};

const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Error)]
pub enum LogInfoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cache artifact error: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Clone, Copy, Default, Debug)]
pub struct ParseOpts {
    /// Aggregate only records flagged as collection scans.
    pub collscan_only: bool,
    /// No progress output on stderr.
    pub silent: bool,
    /// Include session info and slow ops in the text summary.
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseSummary {
    pub total_lines: u64,
    pub matched_lines: u64,
    pub aggregated_lines: u64,
    pub skipped_lines: u64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Everything one run produces; persisted verbatim in the `.enc` artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Shapes, slowest average first.
    pub ops_patterns: Vec<ShapeStats>,
    pub slow_ops: Vec<SlowOpEntry>,
    pub session: LogSessionInfo,
    pub summary: ParseSummary,
}

/// State of a single pass: the shape map and slow-op list are owned here and
/// nowhere else.
#[derive(Debug, Default)]
pub struct ParseRun {
    opts: ParseOpts,
    shapes: ShapeAggregator,
    slow_ops: SlowOpTracker,
    summary: ParseSummary,
    first_ts: Option<DateTime<Utc>>,
    last_ts: Option<DateTime<Utc>>,
}

impl ParseRun {
    pub fn new(opts: ParseOpts) -> Self {
        Self { opts, ..Default::default() }
    }

    /// Folds one logical line into the run. Lines that are not qualifying
    /// operation records leave no trace in the statistics.
    pub fn ingest(&mut self, line: &str) {
        let Some(m) = matcher::match_line(line) else {
            return;
        };
        self.summary.matched_lines += 1;
        let scan = extractor::scan_type(line);
        if self.opts.collscan_only && scan != COLLSCAN {
            return;
        }
        let Some(ex) = extractor::extract(m.op, m.namespace, m.body, scan) else {
            self.summary.skipped_lines += 1;
            trace!(op = m.op, ns = m.namespace, "no filter extracted");
            return;
        };
        let filter = match canonical::canonicalize(&ex.filter) {
            Ok(f) => f + &ex.stages,
            Err(e) => {
                self.summary.skipped_lines += 1;
                trace!(op = m.op, ns = m.namespace, error = %e, "unparseable filter");
                return;
            }
        };
        let index = extractor::index_used(line, scan);
        self.slow_ops.consider(m.millis, line);
        let key = ShapeKey { op: ex.op, filter, scan: scan.to_string() };
        self.shapes.update(key, m.namespace, m.millis, &index);
        self.summary.aggregated_lines += 1;
        self.observe_timestamp(m.timestamp);
    }

    fn observe_timestamp(&mut self, raw: &str) {
        let Some(ts) = parse_log_timestamp(raw) else {
            return;
        };
        self.first_ts = Some(self.first_ts.map_or(ts, |t| t.min(ts)));
        self.last_ts = Some(self.last_ts.map_or(ts, |t| t.max(ts)));
    }

    pub fn finish(self, total_lines: u64, session: LogSessionInfo) -> ParseResult {
        let mut summary = self.summary;
        summary.total_lines = total_lines;
        summary.start_date = self.first_ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));
        summary.end_date = self.last_ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));
        ParseResult {
            ops_patterns: self.shapes.into_sorted(),
            slow_ops: self.slow_ops.into_entries(),
            session,
            summary,
        }
    }
}

fn parse_log_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Analysis of one input: a log file (plain or gzip) or a `.enc` artifact.
#[derive(Debug, Clone)]
pub struct LogInfo {
    filename: PathBuf,
    output_filename: Option<PathBuf>,
    opts: ParseOpts,
}

impl LogInfo {
    pub fn new(filename: impl Into<PathBuf>, opts: ParseOpts) -> Self {
        let filename = filename.into();
        let output_filename = if cache::is_artifact(&filename) {
            None
        } else {
            Some(PathBuf::from(cache::artifact_name(&filename)))
        };
        Self { filename, output_filename, opts }
    }

    /// Directory receiving the `.enc` artifact instead of the working directory.
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        if self.output_filename.is_some() {
            self.output_filename = Some(dir.as_ref().join(cache::artifact_name(&self.filename)));
        }
        self
    }

    pub fn output_filename(&self) -> Option<&Path> {
        self.output_filename.as_deref()
    }

    pub fn opts(&self) -> ParseOpts {
        self.opts
    }

    /// Loads an artifact directly, or parses the log and writes one.
    ///
    /// A corrupt artifact is an error; there is no fallback to re-parsing.
    pub fn analyze(&mut self) -> Result<ParseResult, LogInfoError> {
        if cache::is_artifact(&self.filename) {
            let result = cache::read(&self.filename)?;
            debug!(path = %self.filename.display(), shapes = result.ops_patterns.len(), "loaded artifact");
            self.output_filename = None;
            return Ok(result);
        }
        let result = self.parse()?;
        if let Some(out) = &self.output_filename {
            match cache::write(out, &result) {
                Ok(()) => debug!(path = %out.display(), "wrote artifact"),
                Err(e) => warn!(path = %out.display(), error = %e, "failed to write artifact"),
            }
        }
        Ok(result)
    }

    /// Counts lines, harvests session info, then folds every record.
    pub fn parse(&self) -> Result<ParseResult, LogInfoError> {
        let path = self.filename.as_path();
        let total = reader::count_lines(path)?;
        debug!(path = %path.display(), lines = total, "counted lines");

        let session = session::harvest(reader::lines(path)?)?;

        let show_progress = !self.opts.silent && atty::is(atty::Stream::Stderr);
        let mut run = ParseRun::new(self.opts);
        for (index, line) in reader::lines(path)?.enumerate() {
            let line = line?;
            if show_progress && index % PROGRESS_EVERY == 1 {
                eprint!("\r{:3}% ", (100 * index) / total.max(1));
                let _ = io::stderr().flush();
            }
            run.ingest(&line);
        }
        if show_progress {
            eprint!("\r     \r");
        }
        let result = run.finish(total as u64, session);
        debug!(
            shapes = result.ops_patterns.len(),
            aggregated = result.summary.aggregated_lines,
            skipped = result.summary.skipped_lines,
            "parse finished"
        );
        Ok(result)
    }

    /// Text form of a result; session info and slow ops only when verbose.
    pub fn summary(&self, result: &ParseResult) -> String {
        let mut sections: Vec<String> = Vec::new();
        if self.opts.verbose {
            sections.push(result.session.to_text());
        }
        if self.opts.verbose && !result.slow_ops.is_empty() {
            sections.push(format!("Ops slower than 10 seconds (list top {}):", result.slow_ops.len()));
            for op in &result.slow_ops {
                sections.push(format!(
                    "{} ({}) {}ms",
                    op.raw_line,
                    report::milli_to_time_string(op.millis as f64).trim(),
                    op.millis
                ));
            }
            sections.push("\n".to_string());
        }
        sections.push(report::to_json_string(&report::render(&result.ops_patterns)));
        sections.join("\n")
    }
}
