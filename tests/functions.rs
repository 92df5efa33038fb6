use pretty_assertions::assert_eq;
use serde_json::json;

use json_batch::{build, Error};

#[test]
fn sum_over_values() {
    let ctx = json!({"responses": [{"body": [{"value": 1}, {"value": 2}]}]});
    assert_eq!(
        build(&json!("int __sum(\"$.responses[0].body[*].value\")"), &ctx).unwrap(),
        json!(3)
    );
}

#[test]
fn compare_literal_expressions() {
    let ctx = json!({});
    assert_eq!(build(&json!("__compare(\"5 != 5\")"), &ctx).unwrap(), json!(false));
    assert_eq!(build(&json!("__compare(\"5 != 6\")"), &ctx).unwrap(), json!(true));
    assert_eq!(build(&json!("__cmp(\"2 <= 10\")"), &ctx).unwrap(), json!(true));
}

#[test]
fn average_and_extremes() {
    let ctx = json!({"a": [2, 4, 9]});
    assert_eq!(build(&json!("__average(\"$.a[*]\")"), &ctx).unwrap(), json!(5.0));
    assert_eq!(build(&json!("__min(\"$.a[*]\")"), &ctx).unwrap(), json!(2));
    assert_eq!(build(&json!("__max(\"$.a[*]\")"), &ctx).unwrap(), json!(9));
}

#[test]
fn min_on_empty_match_fails() {
    let ctx = json!({"a": []});
    assert!(matches!(
        build(&json!("__min(\"$.a[*]\")"), &ctx),
        Err(Error::EmptySequence("min"))
    ));
}

#[test]
fn and_or_over_multiple_paths() {
    let ctx = json!({"a": [true, true], "b": [false]});
    assert_eq!(
        build(&json!("__and(\"$.a[*]\", \"$.b[*]\")"), &ctx).unwrap(),
        json!(false)
    );
    assert_eq!(
        build(&json!("__or(\"$.a[*]\", \"$.b[*]\")"), &ctx).unwrap(),
        json!(true)
    );
}

#[test]
fn unknown_function_is_an_error() {
    assert!(matches!(
        build(&json!("__frobnicate(\"$.a\")"), &json!({})),
        Err(Error::UnknownFunction(_))
    ));
}

#[test]
fn wrong_arity_is_an_error() {
    assert!(matches!(
        build(&json!("__sum(\"$.a\", \"$.b\")"), &json!({})),
        Err(Error::FunctionArgument { function: "sum", .. })
    ));
}
