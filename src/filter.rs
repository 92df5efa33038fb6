use serde_json::Value;

use crate::coerce::{self, CmpOp};
use crate::errors::{Error, Result};
use crate::parser::Cursor;

/// `[?(...)]` filter expression applied to each candidate element.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    Cmp(CmpOp, Operand, Operand),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Truthy(Operand),
}

#[derive(Debug, Clone)]
pub enum Operand {
    CurrentPath(Vec<PathToken>), // @.a['b'][0]
    Literal(Value),              // "abc", 123, true/false/null
    Length(Box<Operand>),        // length(@.items)
}

#[derive(Debug, Clone)]
pub enum PathToken {
    Key(String),
    Index(i64),
}

pub fn parse(p: &mut Cursor) -> Result<FilterExpr> {
    parse_or(p)
}

fn parse_or(p: &mut Cursor) -> Result<FilterExpr> {
    let mut left = parse_and(p)?;
    loop {
        p.skip_ws();
        if p.consume_str("||") {
            let right = parse_and(p)?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_and(p: &mut Cursor) -> Result<FilterExpr> {
    let mut left = parse_not(p)?;
    loop {
        p.skip_ws();
        if p.consume_str("&&") {
            let right = parse_not(p)?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

fn parse_not(p: &mut Cursor) -> Result<FilterExpr> {
    p.skip_ws();
    if p.consume_char('!') {
        let inner = parse_not(p)?;
        Ok(FilterExpr::Not(Box::new(inner)))
    } else {
        parse_compare(p)
    }
}

fn parse_compare(p: &mut Cursor) -> Result<FilterExpr> {
    p.skip_ws();
    if p.consume_char('(') {
        let inner = parse_or(p)?;
        p.expect(')')?;
        return Ok(inner);
    }
    let left = parse_operand(p)?;
    p.skip_ws();
    if let Some(op) = consume_cmp_op(p) {
        p.skip_ws();
        let right = parse_operand(p)?;
        return Ok(FilterExpr::Cmp(op, left, right));
    }
    Ok(FilterExpr::Truthy(left))
}

fn consume_cmp_op(p: &mut Cursor) -> Option<CmpOp> {
    for (lit, op) in CmpOp::TOKENS {
        if p.consume_str(lit) {
            return Some(*op);
        }
    }
    None
}

fn parse_operand(p: &mut Cursor) -> Result<Operand> {
    p.skip_ws();
    if p.peek_char() == Some('"') || p.peek_char() == Some('\'') {
        return Ok(Operand::Literal(Value::String(p.parse_quoted_string()?)));
    }
    if p.consume_str("true") {
        return Ok(Operand::Literal(Value::Bool(true)));
    }
    if p.consume_str("false") {
        return Ok(Operand::Literal(Value::Bool(false)));
    }
    if p.consume_str("null") {
        return Ok(Operand::Literal(Value::Null));
    }
    if p.consume_str("length(") {
        let inner = parse_operand(p)?;
        p.expect(')')?;
        return Ok(Operand::Length(Box::new(inner)));
    }
    if p.consume_char('@') {
        let mut tokens = Vec::new();
        loop {
            if p.consume_char('.') {
                let k = p.parse_identifier()?;
                tokens.push(PathToken::Key(k));
                continue;
            }
            if p.consume_char('[') {
                if p.peek_char() == Some('"') || p.peek_char() == Some('\'') {
                    let k = p.parse_quoted_string()?;
                    p.expect(']')?;
                    tokens.push(PathToken::Key(k));
                    continue;
                }
                let content = p.capture_until(']')?;
                p.expect(']')?;
                let mut tmp = Cursor::new(content.trim());
                tokens.push(PathToken::Index(tmp.parse_int()?));
                continue;
            }
            break;
        }
        return Ok(Operand::CurrentPath(tokens));
    }
    if p
        .peek_char()
        .map(|c| c == '-' || c.is_ascii_digit())
        .unwrap_or(false)
    {
        return Ok(Operand::Literal(p.parse_number_literal()?));
    }
    Err(Error::Expression("invalid filter operand".into()))
}

pub fn eval(expr: &FilterExpr, current: &Value) -> bool {
    match expr {
        FilterExpr::Cmp(op, a, b) => {
            let (a, b) = (eval_operand(a, current), eval_operand(b, current));
            op.holds(coerce::cmp_values(&a, &b))
        }
        FilterExpr::And(a, b) => eval(a, current) && eval(b, current),
        FilterExpr::Or(a, b) => eval(a, current) || eval(b, current),
        FilterExpr::Not(inner) => !eval(inner, current),
        FilterExpr::Truthy(operand) => {
            coerce::to_boolean(&eval_operand(operand, current)).unwrap_or(false)
        }
    }
}

fn eval_operand(operand: &Operand, current: &Value) -> Value {
    match operand {
        Operand::Literal(v) => v.clone(),
        Operand::CurrentPath(tokens) => {
            let mut cur = current;
            for token in tokens {
                let next = match token {
                    PathToken::Key(k) => cur.get(k.as_str()),
                    PathToken::Index(i) => match cur {
                        Value::Array(arr) => {
                            let n = arr.len() as i64;
                            let idx = if *i < 0 { n + i } else { *i };
                            if idx < 0 {
                                None
                            } else {
                                arr.get(idx as usize)
                            }
                        }
                        _ => None,
                    },
                };
                match next {
                    Some(v) => cur = v,
                    None => return Value::Null,
                }
            }
            cur.clone()
        }
        Operand::Length(inner) => match eval_operand(inner, current) {
            Value::Array(arr) => Value::from(arr.len()),
            Value::Object(map) => Value::from(map.len()),
            Value::String(s) => Value::from(s.chars().count()),
            _ => Value::Null,
        },
    }
}
