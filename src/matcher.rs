use once_cell::sync::Lazy;
use regex::Regex;

// <timestamp> <severity> <COMPONENT> [<context>] <op> <namespace> <tag>: <body> <N>ms
static RE_OP_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+) \S+\s+(\w+)\s+\[[^\]\s]+\] (\w+) (\S+) \S+: (.*) (\d+)ms$").unwrap()
});

/// Structural groups of a duration-bearing operation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedLine<'a> {
    pub timestamp: &'a str,
    pub component: &'a str,
    pub op: &'a str,
    pub namespace: &'a str,
    pub body: &'a str,
    pub millis: u64,
}

/// Returns `None` for anything that is not an operation record: connection
/// events, startup chatter, records without a trailing duration.
pub fn match_line(line: &str) -> Option<MatchedLine<'_>> {
    if !line.ends_with("ms") {
        return None;
    }
    let caps = RE_OP_LINE.captures(line)?;
    let millis = caps.get(6)?.as_str().parse::<u64>().ok()?;
    Some(MatchedLine {
        timestamp: caps.get(1)?.as_str(),
        component: caps.get(2)?.as_str(),
        op: caps.get(3)?.as_str(),
        namespace: caps.get(4)?.as_str(),
        body: caps.get(5)?.as_str(),
        millis,
    })
}
