use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::coerce;
use crate::errors::{Error, Result};
use crate::path;

/// Pluggable function used by the template evaluator. Arguments arrive as
/// the literal (already interpolated) strings from the `__name(...)` call;
/// path evaluation against the context is the function's own business.
pub trait Function: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, args: &[String], context: &Value) -> Result<Value>;
}

/// Thread-safe, open function registry.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<HashMap<&'static str, Arc<dyn Function>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut map: HashMap<&'static str, Arc<dyn Function>> = HashMap::new();
        map.insert("sum", Arc::new(builtins::Sum));
        map.insert("average", Arc::new(builtins::Average));
        map.insert("min", Arc::new(builtins::Min));
        map.insert("max", Arc::new(builtins::Max));
        map.insert("and", Arc::new(builtins::And));
        map.insert("or", Arc::new(builtins::Or));
        let compare: Arc<dyn Function> = Arc::new(builtins::Compare);
        map.insert("compare", compare.clone());
        map.insert("cmp", compare);
        Self {
            inner: Arc::new(map),
        }
    }

    pub fn register<F: Function + 'static>(&mut self, f: F) {
        let map = Arc::make_mut(&mut self.inner);
        map.insert(f.name(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.inner.get(name).cloned()
    }
}

/// Numeric sequence selected by a path argument, integer arithmetic kept
/// when every element is integral.
enum Numbers {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl Numbers {
    fn len(&self) -> usize {
        match self {
            Numbers::Ints(v) => v.len(),
            Numbers::Floats(v) => v.len(),
        }
    }
}

/// Evaluate one path argument and flatten nested arrays down to scalars.
fn flat_matches(arg: &str, context: &Value) -> Result<Vec<Value>> {
    let parsed = path::parse(arg)?;
    let mut out = Vec::new();
    for m in path::eval(context, &parsed) {
        flatten_into(m, &mut out);
    }
    Ok(out)
}

fn flatten_into(v: Value, out: &mut Vec<Value>) {
    match v {
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        other => out.push(other),
    }
}

fn numeric_matches(arg: &str, context: &Value) -> Result<Numbers> {
    let values = flat_matches(arg, context)?;
    let as_ints: Option<Vec<i64>> = values
        .iter()
        .map(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .collect();
    if let Some(ints) = as_ints {
        return Ok(Numbers::Ints(ints));
    }
    let floats = values
        .iter()
        .map(coerce::to_number)
        .collect::<Result<Vec<f64>>>()?;
    Ok(Numbers::Floats(floats))
}

fn single_path_arg<'a>(function: &'static str, args: &'a [String]) -> Result<&'a str> {
    use itertools::Itertools;
    args.iter()
        .exactly_one()
        .map(|s| s.as_str())
        .map_err(|_| Error::FunctionArgument {
            function,
            reason: format!("expected 1 argument, got {}", args.len()),
        })
}

pub mod builtins {
    use super::*;

    pub struct Sum;
    impl Function for Sum {
        fn name(&self) -> &'static str {
            "sum"
        }
        fn evaluate(&self, args: &[String], context: &Value) -> Result<Value> {
            let arg = single_path_arg(self.name(), args)?;
            Ok(match numeric_matches(arg, context)? {
                Numbers::Ints(v) => Value::from(v.iter().sum::<i64>()),
                Numbers::Floats(v) => Value::from(v.iter().sum::<f64>()),
            })
        }
    }

    pub struct Average;
    impl Function for Average {
        fn name(&self) -> &'static str {
            "average"
        }
        fn evaluate(&self, args: &[String], context: &Value) -> Result<Value> {
            let arg = single_path_arg(self.name(), args)?;
            let numbers = numeric_matches(arg, context)?;
            let count = numbers.len();
            if count == 0 {
                return Err(Error::EmptySequence(self.name()));
            }
            let total = match numbers {
                Numbers::Ints(v) => v.iter().sum::<i64>() as f64,
                Numbers::Floats(v) => v.iter().sum::<f64>(),
            };
            Ok(Value::from(total / count as f64))
        }
    }

    pub struct Min;
    impl Function for Min {
        fn name(&self) -> &'static str {
            "min"
        }
        fn evaluate(&self, args: &[String], context: &Value) -> Result<Value> {
            let arg = single_path_arg(self.name(), args)?;
            extremum(self.name(), numeric_matches(arg, context)?, false)
        }
    }

    pub struct Max;
    impl Function for Max {
        fn name(&self) -> &'static str {
            "max"
        }
        fn evaluate(&self, args: &[String], context: &Value) -> Result<Value> {
            let arg = single_path_arg(self.name(), args)?;
            extremum(self.name(), numeric_matches(arg, context)?, true)
        }
    }

    fn extremum(function: &'static str, numbers: Numbers, want_max: bool) -> Result<Value> {
        match numbers {
            Numbers::Ints(v) => {
                let picked = if want_max {
                    v.into_iter().max()
                } else {
                    v.into_iter().min()
                };
                picked
                    .map(Value::from)
                    .ok_or(Error::EmptySequence(function))
            }
            Numbers::Floats(v) => {
                let mut iter = v.into_iter();
                let first = iter.next().ok_or(Error::EmptySequence(function))?;
                let picked = iter.fold(first, |acc, x| {
                    if (x > acc) == want_max {
                        x
                    } else {
                        acc
                    }
                });
                Ok(Value::from(picked))
            }
        }
    }

    pub struct And;
    impl Function for And {
        fn name(&self) -> &'static str {
            "and"
        }
        fn evaluate(&self, args: &[String], context: &Value) -> Result<Value> {
            reduce_booleans(self.name(), args, context, |acc, b| acc && b, true)
        }
    }

    pub struct Or;
    impl Function for Or {
        fn name(&self) -> &'static str {
            "or"
        }
        fn evaluate(&self, args: &[String], context: &Value) -> Result<Value> {
            reduce_booleans(self.name(), args, context, |acc, b| acc || b, false)
        }
    }

    fn reduce_booleans(
        function: &'static str,
        args: &[String],
        context: &Value,
        fold: impl Fn(bool, bool) -> bool,
        identity: bool,
    ) -> Result<Value> {
        if args.is_empty() {
            return Err(Error::FunctionArgument {
                function,
                reason: "expected at least 1 argument".into(),
            });
        }
        let mut acc = identity;
        for arg in args {
            for v in flat_matches(arg, context)? {
                let b = coerce::to_boolean(&v)
                    .ok_or_else(|| coerce::coercion_error(&v, "boolean"))?;
                acc = fold(acc, b);
            }
        }
        Ok(Value::Bool(acc))
    }

    pub struct Compare;
    impl Function for Compare {
        fn name(&self) -> &'static str {
            "compare"
        }
        fn evaluate(&self, args: &[String], context: &Value) -> Result<Value> {
            let _ = context;
            let expression = single_path_arg(self.name(), args)?;
            let (op, at, token_len) =
                find_operator(expression).ok_or_else(|| Error::FunctionArgument {
                    function: self.name(),
                    reason: format!("no comparison operator in `{expression}`"),
                })?;
            let left = Value::String(expression[..at].trim().to_string());
            let right = Value::String(expression[at + token_len..].trim().to_string());
            Ok(Value::Bool(op.holds(coerce::cmp_values(&left, &right))))
        }
    }

    /// Leftmost operator wins; two-character operators are tried first at
    /// each position so `<=` never reads as `<`.
    fn find_operator(s: &str) -> Option<(coerce::CmpOp, usize, usize)> {
        for (at, _) in s.char_indices() {
            for (token, op) in coerce::CmpOp::TOKENS {
                if s[at..].starts_with(token) {
                    return Some((*op, at, token.len()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: &[&str], ctx: &Value) -> Result<Value> {
        let registry = Registry::with_builtins();
        let f = registry.get(name).unwrap();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        f.evaluate(&args, ctx)
    }

    #[test]
    fn sum_keeps_integers() {
        let ctx = json!({"a": [1, 2]});
        assert_eq!(call("sum", &["$.a[*]"], &ctx).unwrap(), json!(3));
    }

    #[test]
    fn sum_flattens_nested_arrays() {
        let ctx = json!({"a": [[1, 2], [3]]});
        assert_eq!(call("sum", &["$.a"], &ctx).unwrap(), json!(6));
    }

    #[test]
    fn average_fails_on_empty_match() {
        let ctx = json!({"a": []});
        assert!(matches!(
            call("average", &["$.a[*]"], &ctx),
            Err(Error::EmptySequence("average"))
        ));
    }

    #[test]
    fn min_max_pick_extremes() {
        let ctx = json!({"a": [4, 1, 9]});
        assert_eq!(call("min", &["$.a[*]"], &ctx).unwrap(), json!(1));
        assert_eq!(call("max", &["$.a[*]"], &ctx).unwrap(), json!(9));
    }

    #[test]
    fn and_or_reduce_boolean_sequences() {
        let ctx = json!({"flags": [true, true, false]});
        assert_eq!(call("and", &["$.flags[*]"], &ctx).unwrap(), json!(false));
        assert_eq!(call("or", &["$.flags[*]"], &ctx).unwrap(), json!(true));
    }

    #[test]
    fn and_rejects_non_boolean() {
        let ctx = json!({"flags": [1, "x"]});
        assert!(call("and", &["$.flags[*]"], &ctx).is_err());
    }

    #[test]
    fn compare_numeric_and_text() {
        let ctx = json!({});
        assert_eq!(call("compare", &["5 != 5"], &ctx).unwrap(), json!(false));
        assert_eq!(call("compare", &["5 != 6"], &ctx).unwrap(), json!(true));
        assert_eq!(call("cmp", &["4 < 10"], &ctx).unwrap(), json!(true));
        assert_eq!(call("cmp", &["abc == abc"], &ctx).unwrap(), json!(true));
    }

    #[test]
    fn registry_is_open() {
        struct Constantly;
        impl Function for Constantly {
            fn name(&self) -> &'static str {
                "constantly"
            }
            fn evaluate(&self, _: &[String], _: &Value) -> Result<Value> {
                Ok(json!(42))
            }
        }
        let mut registry = Registry::with_builtins();
        registry.register(Constantly);
        let f = registry.get("constantly").unwrap();
        assert_eq!(f.evaluate(&[], &json!({})).unwrap(), json!(42));
        assert!(registry.get("missing").is_none());
    }
}
