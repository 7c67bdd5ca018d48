use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io;

use crate::payload;

static RE_CONTROL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\S+ .? CONTROL\s+\[\w+\] (\w+:?) (.*)$").unwrap()
});

/// Server startup details harvested from CONTROL records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSessionInfo {
    /// `db version ...`, `db path ...` style records, verbatim after the tag.
    pub db_lines: Vec<String>,
    /// Startup options, pretty-printed as JSON when they parse.
    pub config_options: Option<String>,
    pub db_path: Option<String>,
}

impl LogSessionInfo {
    pub fn is_empty(&self) -> bool {
        self.db_lines.is_empty() && self.config_options.is_none()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for l in &self.db_lines {
            out.push_str(l);
            out.push('\n');
        }
        if let Some(opts) = &self.config_options {
            out.push_str("config options:\n");
            out.push_str(opts);
            out.push('\n');
        }
        out
    }
}

/// Reads until the startup `options:` record (or end of input).
pub fn harvest<I>(lines: I) -> io::Result<LogSessionInfo>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    let mut info = LogSessionInfo::default();
    for line in lines {
        let line = line?;
        let Some(caps) = RE_CONTROL.captures(&line) else {
            continue;
        };
        let rest = &caps[2];
        match &caps[1] {
            "db" => info.db_lines.push(format!("db {rest}")),
            "options:" => {
                apply_options(&mut info, rest);
                break;
            }
            _ => {}
        }
    }
    Ok(info)
}

fn apply_options(info: &mut LogSessionInfo, raw: &str) {
    match payload::parse(raw) {
        Ok(doc) => {
            let json = doc.to_json();
            info.db_path = json
                .pointer("/storage/dbPath")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            info.config_options = Some(serde_json::to_string_pretty(&json).unwrap_or_else(|_| raw.to_string()));
        }
        Err(_) => info.config_options = Some(raw.to_string()),
    }
}
