use std::cmp::Ordering;

use serde_json::Value;

use crate::errors::{Error, Result};

/// Comparison operator shared by filter expressions and the `__compare`
/// function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Le,
    Ge,
    Eq,
    Ne,
    Lt,
    Gt,
}

impl CmpOp {
    /// Two-character operators listed first so the scanner never splits
    /// `<=` into `<` and a dangling `=`.
    pub const TOKENS: &'static [(&'static str, CmpOp)] = &[
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ];

    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Gt => ord == Ordering::Greater,
        }
    }
}

/// Order two values: numerically when both sides look numeric (numbers or
/// numeric-looking strings), as booleans when both are booleans, otherwise
/// by text form.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(da), Some(db)) = (as_numeric(a), as_numeric(b)) {
        return da.partial_cmp(&db).unwrap_or(Ordering::Equal);
    }
    if let (Value::Bool(ba), Value::Bool(bb)) = (a, b) {
        return ba.cmp(bb);
    }
    to_text(a).cmp(&to_text(b))
}

fn as_numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Text form used by `str` coercion and interpolation. Strings stay bare;
/// structures render as JSON.
pub fn to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn to_integer(v: &Value) -> Result<i64> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f.round() as i64)
            } else {
                Err(coercion_error(v, "integer"))
            }
        }
        Value::String(s) => {
            let t = s.trim();
            if let Ok(i) = t.parse::<i64>() {
                Ok(i)
            } else if let Ok(f) = t.parse::<f64>() {
                Ok(f.round() as i64)
            } else {
                Err(coercion_error(v, "integer"))
            }
        }
        _ => Err(coercion_error(v, "integer")),
    }
}

pub fn to_number(v: &Value) -> Result<f64> {
    as_numeric(v).ok_or_else(|| coercion_error(v, "number"))
}

/// Boolean reading used by predicates: booleans as-is, `"true"`/`"false"`
/// case-insensitively, numbers by non-zero test.
pub fn to_boolean(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => {
            if s.eq_ignore_ascii_case("true") {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

pub fn coercion_error(v: &Value, target: &'static str) -> Error {
    Error::TypeCoercion {
        value: to_text(v),
        target,
    }
}
