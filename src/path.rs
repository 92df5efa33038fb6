use serde_json::Value;

use crate::errors::{Error, Result};
use crate::filter::{self, FilterExpr};
use crate::parser::Cursor;

/// Parsed JSONPath-like expression. This is the in-crate "path evaluator"
/// the template evaluator and the built-in functions read the context with.
#[derive(Debug, Clone)]
pub struct Path {
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
pub enum Segment {
    Root,                    // $
    Key(String),             // .foo or ['foo']
    Wildcard,                // .* or [*]
    Index(i64),              // [0], negative counts from the end
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    },                       // [start:end:step]
    Recursive,               // ..
    Filter(Box<FilterExpr>), // [?(expr)]
    Length,                  // .length()
}

impl Path {
    /// A definite path addresses at most one element, so a read either
    /// yields that element or fails. Wildcards, slices, filters and
    /// recursive descent make a path indefinite.
    pub fn is_definite(&self) -> bool {
        self.segments.iter().all(|s| {
            matches!(
                s,
                Segment::Root | Segment::Key(_) | Segment::Index(_) | Segment::Length
            )
        })
    }
}

pub fn parse(input: &str) -> Result<Path> {
    let mut p = Cursor::new(input);
    p.skip_ws();
    if !p.consume_char('$') {
        return Err(Error::Expression(format!(
            "path must start with `$`: `{input}`"
        )));
    }
    let mut segments = vec![Segment::Root];
    loop {
        if p.peek_str("..") {
            p.consume_str("..");
            segments.push(Segment::Recursive);
            // `$..name` and `$..*` attach directly, `$..[0]` drops through.
            if p.consume_char('*') {
                segments.push(Segment::Wildcard);
            } else if matches!(p.peek_char(), Some(c) if c == '_' || c.is_ascii_alphanumeric()) {
                segments.push(Segment::Key(p.parse_identifier()?));
            }
            continue;
        }
        if p.consume_char('.') {
            if p.consume_char('*') {
                segments.push(Segment::Wildcard);
                continue;
            }
            if p.consume_str("length()") {
                segments.push(Segment::Length);
                continue;
            }
            let key = p.parse_identifier()?;
            segments.push(Segment::Key(key));
            continue;
        }
        if p.consume_char('[') {
            p.skip_ws();
            if p.consume_char('*') {
                p.expect(']')?;
                segments.push(Segment::Wildcard);
                continue;
            }
            if p.consume_char('?') {
                p.expect('(')?;
                let expr = filter::parse(&mut p)?;
                p.expect(')')?;
                p.expect(']')?;
                segments.push(Segment::Filter(Box::new(expr)));
                continue;
            }
            if p.peek_char() == Some('\'') || p.peek_char() == Some('"') {
                let key = p.parse_quoted_string()?;
                p.expect(']')?;
                segments.push(Segment::Key(key));
                continue;
            }
            let content = p.capture_until(']')?;
            p.expect(']')?;
            if content.contains(':') {
                segments.push(parse_slice(content)?);
            } else {
                let mut tmp = Cursor::new(content.trim());
                segments.push(Segment::Index(tmp.parse_int()?));
            }
            continue;
        }
        break;
    }
    p.skip_ws();
    if !p.eof() {
        return Err(Error::Expression(format!(
            "trailing input in path: `{}`",
            p.rest()
        )));
    }
    Ok(Path { segments })
}

fn parse_slice(content: &str) -> Result<Segment> {
    let parts: Vec<&str> = content.split(':').collect();
    if parts.len() > 3 {
        return Err(Error::Expression("slice has too many components".into()));
    }
    let parse_opt = |s: &str| -> Result<Option<i64>> {
        let t = s.trim();
        if t.is_empty() {
            Ok(None)
        } else {
            t.parse::<i64>()
                .map(Some)
                .map_err(|_| Error::Expression(format!("bad slice number `{t}`")))
        }
    };
    Ok(Segment::Slice {
        start: parse_opt(parts.first().copied().unwrap_or(""))?,
        end: parse_opt(parts.get(1).copied().unwrap_or(""))?,
        step: parse_opt(parts.get(2).copied().unwrap_or(""))?,
    })
}

/// Evaluate a parsed path against `root`, returning every match in document
/// order. `Length` produces synthesized numbers, so matches are owned.
pub fn eval(root: &Value, path: &Path) -> Vec<Value> {
    let mut current: Vec<Value> = vec![root.clone()];
    for seg in &path.segments {
        current = match seg {
            Segment::Root => vec![root.clone()],
            Segment::Key(k) => current
                .iter()
                .filter_map(|v| v.get(k.as_str()))
                .cloned()
                .collect(),
            Segment::Index(i) => current
                .iter()
                .filter_map(|v| match v {
                    Value::Array(arr) => index_array(arr, *i),
                    _ => None,
                })
                .cloned()
                .collect(),
            Segment::Slice { start, end, step } => current
                .iter()
                .flat_map(|v| match v {
                    Value::Array(arr) => slice_array(arr, *start, *end, *step),
                    _ => Vec::new(),
                })
                .collect(),
            Segment::Wildcard => current
                .iter()
                .flat_map(|v| match v {
                    Value::Array(arr) => arr.clone(),
                    Value::Object(map) => map.values().cloned().collect(),
                    _ => Vec::new(),
                })
                .collect(),
            Segment::Recursive => current
                .iter()
                .flat_map(|v| {
                    let mut out = Vec::new();
                    recurse_collect(v, &mut out);
                    out
                })
                .collect(),
            Segment::Filter(expr) => current
                .iter()
                .flat_map(|v| match v {
                    Value::Array(arr) => arr.clone(),
                    other => vec![other.clone()],
                })
                .filter(|v| filter::eval(expr, v))
                .collect(),
            Segment::Length => current.iter().filter_map(length_of).collect(),
        };
    }
    current
}

fn index_array(arr: &[Value], i: i64) -> Option<&Value> {
    let n = arr.len() as i64;
    let idx = if i < 0 { n + i } else { i };
    if idx < 0 {
        None
    } else {
        arr.get(idx as usize)
    }
}

fn slice_array(arr: &[Value], start: Option<i64>, end: Option<i64>, step: Option<i64>) -> Vec<Value> {
    let n = arr.len() as i64;
    let step = step.unwrap_or(1);
    if step == 0 {
        return Vec::new();
    }
    let norm = |i: i64| -> i64 {
        if i < 0 {
            (n + i).clamp(0, n)
        } else {
            i.clamp(0, n)
        }
    };
    let lo = norm(start.unwrap_or(0));
    let hi = norm(end.unwrap_or(n));
    let mut out = Vec::new();
    if step > 0 {
        let mut i = lo;
        while i < hi {
            if let Some(v) = arr.get(i as usize) {
                out.push(v.clone());
            }
            i += step;
        }
    } else if hi > 0 {
        let mut i = (hi - 1).clamp(0, n - 1);
        while i >= lo {
            if let Some(v) = arr.get(i as usize) {
                out.push(v.clone());
            }
            i += step;
            if i < 0 {
                break;
            }
        }
    }
    out
}

fn recurse_collect(v: &Value, out: &mut Vec<Value>) {
    out.push(v.clone());
    match v {
        Value::Array(arr) => {
            for elt in arr {
                recurse_collect(elt, out);
            }
        }
        Value::Object(map) => {
            for elt in map.values() {
                recurse_collect(elt, out);
            }
        }
        _ => {}
    }
}

fn length_of(v: &Value) -> Option<Value> {
    match v {
        Value::Array(arr) => Some(Value::from(arr.len())),
        Value::Object(map) => Some(Value::from(map.len())),
        Value::String(s) => Some(Value::from(s.chars().count())),
        _ => None,
    }
}
