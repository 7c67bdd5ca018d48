//! Scanner for the shell-style documents embedded in operation records.
//!
//! Operation payloads are not JSON: keys are unquoted, values include
//! constructor literals (`ObjectId('..')`, `new Date(..)`), bare regexes and
//! identifiers. Two levels are offered here: cheap delimiter scanning over raw
//! text (used to cut payloads out of a line) and a recursive-descent parser
//! producing a [`Value`] tree (used by canonicalization).

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static RE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("unexpected end of payload at byte {0}")]
    UnexpectedEnd(usize),
    #[error("unexpected character {ch:?} at byte {pos}")]
    Unexpected { ch: char, pos: usize },
    #[error("trailing text after payload at byte {0}")]
    Trailing(usize),
}

/// Byte offset one past the delimiter closing the `{` or `[` at `start`.
///
/// Only the opener's own delimiter pair moves the depth counter. Text inside
/// double-quoted strings is skipped so that literal braces do not count.
pub fn closing(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (open, close) = match bytes.get(start)? {
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };
    let mut depth: i32 = 0;
    let mut in_str = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_str {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_str = false;
            }
            continue;
        }
        if b == b'"' {
            in_str = true;
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i + 1);
            }
        }
    }
    None
}

/// Prefix of `body` ending with the first balanced `{...}` payload.
///
/// Bodies without a brace, or whose first brace is never closed, are returned
/// whole.
pub fn leading_payload(body: &str) -> &str {
    match body.find('{').and_then(|start| closing(body, start)) {
        Some(end) => &body[..end],
        None => body,
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b == b'.'
}

/// The balanced document (or array) that follows `key` in `text`.
///
/// `key` must not be glued to a preceding identifier, so `q: ` does not match
/// inside `uniq: `. Occurrences whose value is not a document are passed over.
pub fn doc_after<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    for (idx, _) in text.match_indices(key) {
        if idx > 0 && is_ident_byte(text.as_bytes()[idx - 1]) {
            continue;
        }
        let rest = idx + key.len();
        let start = rest + (text[rest..].len() - text[rest..].trim_start().len());
        if let Some(end) = closing(text, start) {
            return Some(&text[start..end]);
        }
    }
    None
}

/// Tagged payload tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Object(Vec<(String, Value)>),
    Array(Vec<Value>),
    /// An enumeration whose elements were dropped; renders as `[...]`.
    Elided,
    Scalar(Scalar),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Quoted string, quotes included.
    Str(String),
    Number(String),
    Bool(bool),
    Date(String),
    /// ObjectId, UUID, Timestamp and BinData literals.
    Opaque(String),
    Regex { pattern: String, flags: String },
    RedactedRegex,
    /// Anything else: `null`, `MinKey`, plan names, `...`.
    Bare(String),
    Placeholder,
}

impl Value {
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Compact rendering: no padding inside delimiters, `, ` between members.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Value::Object(fields) => {
                out.push('{');
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(k);
                    out.push_str(": ");
                    v.render_into(out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    v.render_into(out);
                }
                out.push(']');
            }
            Value::Elided => out.push_str("[...]"),
            Value::Scalar(s) => out.push_str(&s.render()),
        }
    }

    /// Lossy conversion for display purposes; non-JSON literals become strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Object(fields) => {
                let mut map = serde_json::Map::new();
                for (k, v) in fields {
                    map.insert(unquote(k), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Elided => serde_json::Value::String("...".into()),
            Value::Scalar(Scalar::Str(s)) => serde_json::Value::String(unquote(s)),
            Value::Scalar(Scalar::Bool(b)) => serde_json::Value::Bool(*b),
            Value::Scalar(Scalar::Number(n)) => serde_json::from_str::<serde_json::Number>(n)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|_| serde_json::Value::String(n.clone())),
            Value::Scalar(Scalar::Bare(b)) if b == "null" => serde_json::Value::Null,
            Value::Scalar(s) => serde_json::Value::String(s.render()),
        }
    }
}

impl Scalar {
    pub fn render(&self) -> String {
        match self {
            Scalar::Str(s) | Scalar::Number(s) | Scalar::Date(s) | Scalar::Opaque(s) | Scalar::Bare(s) => s.clone(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Regex { pattern, flags } => format!("/{pattern}/{flags}"),
            Scalar::RedactedRegex => "/.../.../".to_string(),
            Scalar::Placeholder => "1".to_string(),
        }
    }
}

/// `"a.b"` keys name the same field as `a.b`. Quotes stay where the bare
/// form would not re-parse as one key.
fn plain_key(quoted: String) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let bare = !inner.is_empty()
        && !inner
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ':' | ',' | '{' | '}' | '[' | ']' | '"' | '\'' | '\\'));
    if bare {
        inner.to_string()
    } else {
        quoted
    }
}

fn unquote(s: &str) -> String {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted {
        s[1..s.len() - 1].replace("\\\"", "\"").replace("\\'", "'")
    } else {
        s.to_string()
    }
}

/// Parses a complete payload; trailing whitespace is allowed, anything else is not.
pub fn parse(text: &str) -> Result<Value, PayloadError> {
    let mut p = Parser { src: text, pos: 0 };
    let v = p.value()?;
    p.skip_ws();
    if p.pos < text.len() {
        return Err(PayloadError::Trailing(p.pos));
    }
    Ok(v)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), PayloadError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(ch) => Err(PayloadError::Unexpected { ch, pos: self.pos - ch.len_utf8() }),
            None => Err(PayloadError::UnexpectedEnd(self.pos)),
        }
    }

    fn value(&mut self) -> Result<Value, PayloadError> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.object(),
            Some('[') => self.array(),
            Some(_) => self.scalar().map(Value::Scalar),
            None => Err(PayloadError::UnexpectedEnd(self.pos)),
        }
    }

    fn object(&mut self) -> Result<Value, PayloadError> {
        self.expect('{')?;
        let mut fields = Vec::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Value::Object(fields));
        }
        loop {
            let key = self.key()?;
            self.skip_ws();
            self.expect(':')?;
            let val = self.value()?;
            fields.push((key, val));
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(fields)),
                Some(ch) => return Err(PayloadError::Unexpected { ch, pos: self.pos - ch.len_utf8() }),
                None => return Err(PayloadError::UnexpectedEnd(self.pos)),
            }
        }
    }

    fn array(&mut self) -> Result<Value, PayloadError> {
        self.expect('[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::Array(items)),
                Some(ch) => return Err(PayloadError::Unexpected { ch, pos: self.pos - ch.len_utf8() }),
                None => return Err(PayloadError::UnexpectedEnd(self.pos)),
            }
        }
    }

    fn key(&mut self) -> Result<String, PayloadError> {
        self.skip_ws();
        match self.peek() {
            Some(q @ ('"' | '\'')) => self.quoted(q).map(plain_key),
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    match c {
                        ':' => break,
                        ',' | '{' | '}' | '[' | ']' => {
                            return Err(PayloadError::Unexpected { ch: c, pos: self.pos })
                        }
                        _ => {
                            self.bump();
                        }
                    }
                }
                if self.peek().is_none() {
                    return Err(PayloadError::UnexpectedEnd(self.pos));
                }
                Ok(self.src[start..self.pos].trim().to_string())
            }
            None => Err(PayloadError::UnexpectedEnd(self.pos)),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, PayloadError> {
        let start = self.pos;
        self.bump();
        let mut escaped = false;
        loop {
            match self.bump() {
                None => return Err(PayloadError::UnexpectedEnd(self.pos)),
                Some(_) if escaped => escaped = false,
                Some('\\') => escaped = true,
                Some(c) if c == quote => break,
                Some(_) => {}
            }
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn regex(&mut self) -> Result<Scalar, PayloadError> {
        self.bump();
        let start = self.pos;
        let mut escaped = false;
        loop {
            match self.peek() {
                None => return Err(PayloadError::UnexpectedEnd(self.pos)),
                Some(_) if escaped => escaped = false,
                Some('\\') => escaped = true,
                Some('/') => break,
                Some(_) => {}
            }
            self.bump();
        }
        let pattern = self.src[start..self.pos].to_string();
        self.bump();
        let flags_start = self.pos;
        while matches!(self.peek(), Some(c) if !c.is_whitespace() && !matches!(c, ',' | '}' | ']')) {
            self.bump();
        }
        let flags = self.src[flags_start..self.pos].to_string();
        Ok(Scalar::Regex { pattern, flags })
    }

    fn scalar(&mut self) -> Result<Scalar, PayloadError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => return self.quoted(q).map(Scalar::Str),
            Some('/') => return self.regex(),
            _ => {}
        }
        // Bare token, possibly a constructor call whose arguments contain commas.
        let start = self.pos;
        let mut parens = 0usize;
        while let Some(c) = self.peek() {
            match c {
                '(' => parens += 1,
                ')' => parens = parens.saturating_sub(1),
                '"' | '\'' if parens > 0 => {
                    self.quoted(c)?;
                    continue;
                }
                ',' | '}' | ']' if parens == 0 => break,
                _ => {}
            }
            self.bump();
        }
        let token = self.src[start..self.pos].trim();
        if token.is_empty() {
            return match self.peek() {
                Some(ch) => Err(PayloadError::Unexpected { ch, pos: self.pos }),
                None => Err(PayloadError::UnexpectedEnd(self.pos)),
            };
        }
        Ok(classify(token))
    }
}

fn classify(token: &str) -> Scalar {
    let ctor = token.split('(').next().unwrap_or("").trim();
    match token {
        "true" => return Scalar::Bool(true),
        "false" => return Scalar::Bool(false),
        _ => {}
    }
    if RE_NUMBER.is_match(token) {
        return Scalar::Number(token.to_string());
    }
    if token.contains('(') {
        match ctor {
            "NumberLong" | "NumberInt" | "NumberDecimal" => return Scalar::Number(token.to_string()),
            "new Date" | "Date" | "ISODate" => return Scalar::Date(token.to_string()),
            "ObjectId" | "UUID" | "Timestamp" | "BinData" => return Scalar::Opaque(token.to_string()),
            _ => {}
        }
    }
    Scalar::Bare(token.to_string())
}
