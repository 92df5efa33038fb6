use serde_json::{Map, Value};
use tracing::trace;

use crate::coerce;
use crate::errors::{Error, Result};
use crate::expression::{self, Coercion, Expr, TypeTag};
use crate::functions::Registry;
use crate::path;

/// In a template array, an object carrying this key is mapped over every
/// element the path matches, each element serving as the evaluation root.
const KEY_ARRAY_PATH: &str = "__array_path";

/// Template evaluator: turns one templated JSON value into a concrete value
/// against a context document. Objects and arrays evaluate member-wise;
/// string leaves go through interpolation, then the expression grammar.
pub struct JsonBuilder {
    registry: Registry,
}

impl JsonBuilder {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn build(&self, template: &Value, context: &Value) -> Result<Value> {
        match template {
            Value::String(leaf) => self.build_leaf(leaf, context),
            Value::Object(map) => self.build_object(map, context),
            Value::Array(items) => self.build_array(items, context),
            // Numbers, booleans and null pass through unchanged.
            other => Ok(other.clone()),
        }
    }

    fn build_object(&self, map: &Map<String, Value>, context: &Value) -> Result<Value> {
        let mut out = Map::new();
        for (key, child) in map {
            if key == KEY_ARRAY_PATH {
                continue;
            }
            trace!(key, "build object member");
            out.insert(key.clone(), self.build(child, context)?);
        }
        Ok(Value::Object(out))
    }

    fn build_array(&self, items: &[Value], context: &Value) -> Result<Value> {
        let mut out = Vec::new();
        for child in items {
            match child {
                // String elements that evaluate to an array are spliced.
                Value::String(leaf) => match self.build_leaf(leaf, context)? {
                    Value::Array(produced) => out.extend(produced),
                    single => out.push(single),
                },
                Value::Object(map) => {
                    if let Some(Value::String(array_path)) = map.get(KEY_ARRAY_PATH) {
                        let parsed = path::parse(array_path)?;
                        for element in path::eval(context, &parsed) {
                            out.push(self.build_object(map, &element)?);
                        }
                    } else {
                        out.push(self.build_object(map, context)?);
                    }
                }
                other => out.push(self.build(other, context)?),
            }
        }
        Ok(Value::Array(out))
    }

    /// One string leaf: interpolation pass first, then classification.
    pub fn build_leaf(&self, leaf: &str, context: &Value) -> Result<Value> {
        trace!(leaf, "build leaf");
        let interpolated = self.interpolate(leaf, context)?;
        match expression::classify(&interpolated)? {
            Expr::Lookup { tag, path: p } => self.build_lookup(tag, &p, &interpolated, context),
            Expr::Call { tag, name, args } => {
                let function = self
                    .registry
                    .get(&name)
                    .ok_or(Error::UnknownFunction(name))?;
                let value = function.evaluate(&args, context)?;
                match tag {
                    Some(tag) => apply_tag(tag, vec![value], &interpolated),
                    None => Ok(value),
                }
            }
            Expr::Literal { tag, raw } => build_literal(tag, &raw),
        }
    }

    fn build_lookup(
        &self,
        tag: Option<TypeTag>,
        path_text: &str,
        leaf: &str,
        context: &Value,
    ) -> Result<Value> {
        let parsed = match path::parse(path_text) {
            Ok(p) => p,
            // A `$`-leading string that is not a valid path is only an
            // error under a type tag; bare it falls back to a literal.
            Err(e) => {
                return match tag {
                    Some(_) => Err(e),
                    None => Ok(Value::String(leaf.to_string())),
                };
            }
        };
        let matches = path::eval(context, &parsed);
        match tag {
            None => {
                if parsed.is_definite() {
                    matches
                        .into_iter()
                        .next()
                        .ok_or_else(|| Error::UnresolvedReference(path_text.to_string()))
                } else {
                    Ok(Value::Array(matches))
                }
            }
            Some(tag) => apply_tag(tag, matches, path_text),
        }
    }

    /// Replace every `@{ expr }@` with the text form of evaluating `expr`.
    /// Markers nest; a backslash escapes a following `@`. An expression
    /// yielding an array contributes its first element and fails when empty.
    fn interpolate(&self, leaf: &str, context: &Value) -> Result<String> {
        if !leaf.contains("@{") {
            return Ok(leaf.to_string());
        }
        let chars: Vec<char> = leaf.chars().collect();
        let mut out = String::new();
        let mut inner = String::new();
        let mut depth = 0usize;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && i + 1 < chars.len() && chars[i + 1] == '@' {
                let target = if depth == 0 { &mut out } else { &mut inner };
                target.push('@');
                i += 2;
                continue;
            }
            if c == '@' && i + 1 < chars.len() && chars[i + 1] == '{' {
                if depth > 0 {
                    inner.push_str("@{");
                }
                depth += 1;
                i += 2;
                continue;
            }
            if c == '}' && i + 1 < chars.len() && chars[i + 1] == '@' && depth > 0 {
                depth -= 1;
                if depth == 0 {
                    let value = self.build_leaf(inner.trim(), context)?;
                    let value = match value {
                        Value::Array(items) => items
                            .into_iter()
                            .next()
                            .ok_or_else(|| Error::UnresolvedReference(inner.trim().to_string()))?,
                        other => other,
                    };
                    out.push_str(&coerce::to_text(&value));
                    inner.clear();
                } else {
                    inner.push_str("}@");
                }
                i += 2;
                continue;
            }
            if depth == 0 {
                out.push(c);
            } else {
                inner.push(c);
            }
            i += 1;
        }
        if depth > 0 {
            return Err(Error::Expression(format!(
                "unterminated interpolation in `{leaf}`"
            )));
        }
        Ok(out)
    }
}

/// Apply a type tag to path/function results. Scalar tags take the first
/// match and require one; array tags coerce element-wise, splicing a single
/// array match.
fn apply_tag(tag: TypeTag, matches: Vec<Value>, origin: &str) -> Result<Value> {
    if tag.array {
        let elements = match matches.as_slice() {
            [Value::Array(_)] => match matches.into_iter().next() {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => matches,
        };
        let coerced = elements
            .into_iter()
            .map(|v| coerce_scalar(tag.coercion, v))
            .collect::<Result<Vec<Value>>>()?;
        Ok(Value::Array(coerced))
    } else {
        let first = matches
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnresolvedReference(origin.to_string()))?;
        coerce_scalar(tag.coercion, first)
    }
}

fn coerce_scalar(coercion: Coercion, value: Value) -> Result<Value> {
    match coercion {
        Coercion::Text => Ok(Value::String(coerce::to_text(&value))),
        Coercion::Integer => coerce::to_integer(&value).map(Value::from),
        Coercion::Number => coerce::to_number(&value).map(Value::from),
        Coercion::Boolean => coerce::to_boolean(&value)
            .map(Value::Bool)
            .ok_or_else(|| coerce::coercion_error(&value, "boolean")),
        Coercion::Object => Ok(value),
    }
}

fn build_literal(tag: Option<TypeTag>, raw: &str) -> Result<Value> {
    let Some(tag) = tag else {
        return Ok(Value::String(raw.to_string()));
    };
    if tag.array || tag.coercion == Coercion::Object {
        // `obj`/array-tagged literals are inline JSON.
        return serde_json::from_str(raw).map_err(|e| Error::Expression(format!(
            "invalid JSON literal `{raw}`: {e}"
        )));
    }
    coerce_scalar(tag.coercion, Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn builder() -> JsonBuilder {
        JsonBuilder::new(Registry::with_builtins())
    }

    fn ctx() -> Value {
        json!({
            "original": {
                "headers": {"header_2": ["qwe", "zxc"]},
                "body": {"key_1": "abc", "key_2": 2}
            },
            "responses": [
                {"status": 200, "body": [{"value": 1}, {"value": 2}]}
            ],
            "vars": {"var_1": 2}
        })
    }

    #[test]
    fn typed_scalar_lookups() {
        let b = builder();
        assert_eq!(
            b.build_leaf("str $.original.body.key_1", &ctx()).unwrap(),
            json!("abc")
        );
        assert_eq!(
            b.build_leaf("int $.original.body.key_2", &ctx()).unwrap(),
            json!(2)
        );
    }

    #[test]
    fn int_tag_rejects_non_numeric() {
        let b = builder();
        assert!(matches!(
            b.build_leaf("int $.original.body.key_1", &ctx()),
            Err(Error::TypeCoercion { .. })
        ));
    }

    #[test]
    fn int_tag_parses_numeric_string() {
        let b = builder();
        let c = json!({"n": "17"});
        assert_eq!(b.build_leaf("int $.n", &c).unwrap(), json!(17));
    }

    #[test]
    fn string_array_lookup_keeps_match_order() {
        let b = builder();
        assert_eq!(
            b.build_leaf("str[] $.original.headers.header_2[*]", &ctx())
                .unwrap(),
            json!(["qwe", "zxc"])
        );
    }

    #[test]
    fn obj_tag_returns_structure_unchanged() {
        let b = builder();
        assert_eq!(
            b.build_leaf("obj $.responses[0].body", &ctx()).unwrap(),
            json!([{"value": 1}, {"value": 2}])
        );
    }

    #[test]
    fn bare_definite_path_yields_raw_result() {
        let b = builder();
        assert_eq!(b.build_leaf("$.vars", &ctx()).unwrap(), json!({"var_1": 2}));
        assert!(matches!(
            b.build_leaf("$.vars.missing", &ctx()),
            Err(Error::UnresolvedReference(_))
        ));
    }

    #[test]
    fn bare_indefinite_path_yields_match_array() {
        let b = builder();
        assert_eq!(
            b.build_leaf("$.responses[0].body[*].value", &ctx()).unwrap(),
            json!([1, 2])
        );
    }

    #[test]
    fn interpolation_embeds_context_fragments() {
        let b = builder();
        assert_eq!(
            b.build_leaf("https://host/@{$.vars.var_1}@/items", &ctx())
                .unwrap(),
            json!("https://host/2/items")
        );
    }

    #[test]
    fn interpolation_takes_first_of_many() {
        let b = builder();
        assert_eq!(
            b.build_leaf("@{$.original.headers.header_2[*]}@", &ctx())
                .unwrap(),
            json!("qwe")
        );
    }

    #[test]
    fn interpolation_fails_on_no_match() {
        let b = builder();
        assert!(matches!(
            b.build_leaf("x-@{$.missing.deep}@", &ctx()),
            Err(Error::UnresolvedReference(_))
        ));
    }

    #[test]
    fn interpolation_runs_before_function_classification() {
        let b = builder();
        assert_eq!(
            b.build_leaf("__cmp(\"@{$.vars.var_1}@ < 5\")", &ctx()).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn escaped_marker_stays_literal() {
        let b = builder();
        assert_eq!(
            b.build_leaf("mail\\@{host}", &ctx()).unwrap(),
            json!("mail@{host}")
        );
    }

    #[test]
    fn function_result_coerced_by_tag() {
        let b = builder();
        assert_eq!(
            b.build_leaf("int __sum(\"$.responses[0].body[*].value\")", &ctx())
                .unwrap(),
            json!(3)
        );
    }

    #[test]
    fn unknown_function_is_reported() {
        let b = builder();
        assert!(matches!(
            b.build_leaf("__nope(1)", &ctx()),
            Err(Error::UnknownFunction(name)) if name == "nope"
        ));
    }

    #[test]
    fn recursion_preserves_structure() {
        let b = builder();
        let template = json!({
            "key_1": "str $.original.body.key_1",
            "nested": {"n": "int $.original.body.key_2"},
            "list": ["$.responses[0].body[*].value", 7],
            "passthrough": 3.5
        });
        assert_eq!(
            b.build(&template, &ctx()).unwrap(),
            json!({
                "key_1": "abc",
                "nested": {"n": 2},
                "list": [1, 2, 7],
                "passthrough": 3.5
            })
        );
    }

    #[test]
    fn array_path_projection() {
        let b = builder();
        let template = json!([{
            "__array_path": "$.responses[0].body[*]",
            "v": "int $.value"
        }]);
        assert_eq!(
            b.build(&template, &ctx()).unwrap(),
            json!([{"v": 1}, {"v": 2}])
        );
    }

    #[test]
    fn tagged_literals() {
        let b = builder();
        assert_eq!(b.build_leaf("int 0", &ctx()).unwrap(), json!(0));
        assert_eq!(b.build_leaf("bool true", &ctx()).unwrap(), json!(true));
        assert_eq!(
            b.build_leaf("obj {\"a\": 1}", &ctx()).unwrap(),
            json!({"a": 1})
        );
    }

    proptest! {
        // Literals without markers, tags, `$` or `__` evaluate to themselves.
        #[test]
        fn plain_literals_are_fixed_points(s in "[a-zA-Z0-9 ,.:/-]{0,40}") {
            prop_assume!(expression_free(&s));
            let b = builder();
            let out = b.build_leaf(&s, &json!({})).unwrap();
            prop_assert_eq!(out, Value::String(s.trim().to_string()));
        }
    }

    fn expression_free(s: &str) -> bool {
        let t = s.trim_start();
        !t.starts_with('$')
            && !t.starts_with("__")
            && ![
                "str ", "string ", "int ", "integer ", "num ", "number ", "bool ", "boolean ",
                "obj ", "object ", "str[] ", "string[] ", "int[] ", "integer[] ", "num[] ",
                "number[] ", "bool[] ", "boolean[] ", "obj[] ", "object[] ",
            ]
            .iter()
            .any(|p| t.starts_with(p))
    }
}
