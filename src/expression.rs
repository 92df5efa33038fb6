use crate::errors::{Error, Result};
use crate::parser::Cursor;

/// Target coercion selected by a leading type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    Integer,
    Number,
    Boolean,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTag {
    pub coercion: Coercion,
    pub array: bool,
}

/// Recognized tag prefixes, short and long spellings. Array forms first is
/// not required (`str ` never prefixes `str[] ...`), listed grouped for
/// readability.
const TAGS: &[(&str, Coercion, bool)] = &[
    ("str[] ", Coercion::Text, true),
    ("string[] ", Coercion::Text, true),
    ("str ", Coercion::Text, false),
    ("string ", Coercion::Text, false),
    ("int[] ", Coercion::Integer, true),
    ("integer[] ", Coercion::Integer, true),
    ("int ", Coercion::Integer, false),
    ("integer ", Coercion::Integer, false),
    ("num[] ", Coercion::Number, true),
    ("number[] ", Coercion::Number, true),
    ("num ", Coercion::Number, false),
    ("number ", Coercion::Number, false),
    ("bool[] ", Coercion::Boolean, true),
    ("boolean[] ", Coercion::Boolean, true),
    ("bool ", Coercion::Boolean, false),
    ("boolean ", Coercion::Boolean, false),
    ("obj[] ", Coercion::Object, true),
    ("object[] ", Coercion::Object, true),
    ("obj ", Coercion::Object, false),
    ("object ", Coercion::Object, false),
];

const PREFIX_FUNC: &str = "__";

/// One classified template leaf. Classification runs after interpolation,
/// so payloads never contain `@{ }@` markers.
#[derive(Debug, Clone)]
pub enum Expr {
    Lookup {
        tag: Option<TypeTag>,
        path: String,
    },
    Call {
        tag: Option<TypeTag>,
        name: String,
        args: Vec<String>,
    },
    Literal {
        tag: Option<TypeTag>,
        raw: String,
    },
}

pub fn classify(leaf: &str) -> Result<Expr> {
    let trimmed = leaf.trim_start();
    let (tag, rest) = match TAGS
        .iter()
        .find(|(prefix, _, _)| trimmed.starts_with(prefix))
    {
        Some((prefix, coercion, array)) => (
            Some(TypeTag {
                coercion: *coercion,
                array: *array,
            }),
            trimmed[prefix.len()..].trim(),
        ),
        None => (None, leaf.trim()),
    };
    if rest.starts_with('$') {
        return Ok(Expr::Lookup {
            tag,
            path: rest.to_string(),
        });
    }
    if rest.starts_with(PREFIX_FUNC) {
        let (name, args) = parse_call(rest)?;
        return Ok(Expr::Call { tag, name, args });
    }
    Ok(Expr::Literal {
        tag,
        raw: rest.to_string(),
    })
}

/// `__name(arg, ...)` where each argument is either a quoted string or a
/// raw token running up to the next `,` or `)`.
fn parse_call(s: &str) -> Result<(String, Vec<String>)> {
    let mut p = Cursor::new(s);
    if !p.consume_str(PREFIX_FUNC) {
        return Err(Error::Expression(format!("not a function call: `{s}`")));
    }
    let name = p.parse_identifier()?;
    p.skip_ws();
    p.expect('(')?;
    let mut args = Vec::new();
    loop {
        p.skip_ws();
        if p.consume_char(')') {
            break;
        }
        if p.peek_char() == Some('"') || p.peek_char() == Some('\'') {
            args.push(p.parse_quoted_string()?);
        } else {
            args.push(capture_raw_argument(&mut p)?);
        }
        p.skip_ws();
        if p.consume_char(',') {
            continue;
        }
        p.expect(')')?;
        break;
    }
    p.skip_ws();
    if !p.eof() {
        return Err(Error::Expression(format!(
            "trailing input after function call: `{}`",
            p.rest()
        )));
    }
    Ok((name, args))
}

fn capture_raw_argument(p: &mut Cursor) -> Result<String> {
    let mut out = String::new();
    while let Some(c) = p.peek_char() {
        if c == ',' || c == ')' {
            return Ok(out.trim().to_string());
        }
        out.push(c);
        p.consume_char(c);
    }
    Err(Error::Expression("expected ',' or ')' in function call".into()))
}
