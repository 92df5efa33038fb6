use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Whole batch template: the request tree plus the root response
/// construction list and template-scoped options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchTemplate {
    pub requests: Vec<RequestTemplate>,
    pub responses: Option<Vec<ResponseTemplate>>,
    pub dispatch_options: Option<DispatchOptions>,
    pub loop_options: Option<LoopOptions>,
}

/// One node of the request tree. String fields and `headers`/`body` leaves
/// are template expressions resolved against the context at dispatch time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestTemplate {
    pub predicate: Option<String>,
    pub http_method: Option<String>,
    pub url: Option<String>,
    pub headers: Option<Value>,
    pub body: Option<Value>,
    pub requests: Option<Vec<RequestTemplate>>,
    pub responses: Option<Vec<ResponseTemplate>>,
    pub transformers: Option<Vec<ResponseTemplate>>,
    pub vars: Option<Vec<VarTemplate>>,
    #[serde(rename = "loop")]
    pub loop_spec: Option<LoopTemplate>,
    pub dispatch_options: Option<DispatchOptions>,
}

/// Bounded while construct: `counter_init` runs once, `counter_predicate`
/// before every iteration, `counter_update` after each one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopTemplate {
    pub counter_init: Value,
    pub counter_predicate: Value,
    pub counter_update: Value,
    pub requests: Vec<RequestTemplate>,
}

/// One `vars` block: templated names mapped to templated values, optionally
/// gated by a predicate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VarTemplate {
    pub predicate: Option<String>,
    pub vars: serde_json::Map<String, Value>,
}

/// Response construction entry, also used for transformers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseTemplate {
    pub predicate: Option<String>,
    pub status: Option<Value>,
    pub headers: Option<Value>,
    pub body: Option<Value>,
}

/// Leniency flags honored by the dispatcher's response-parsing step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchOptions {
    pub fail_back_as_string: bool,
    pub ignore_parsing_error: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopOptions {
    /// Iteration cap. Absent leaves the predicate as the sole bound.
    pub max_loop_time: Option<u64>,
}

/// A concrete HTTP request, either the caller-supplied original or one
/// materialized from a node template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Request {
    pub http_method: String,
    pub url: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Value,
}

impl Request {
    /// Projection stored under `original` in the context.
    pub fn original_value(&self) -> Value {
        json!({
            "headers": self.headers,
            "body": self.body,
        })
    }

    /// Full document stored in the node's `requests` slot.
    pub fn to_value(&self) -> Value {
        json!({
            "http_method": self.http_method,
            "url": self.url,
            "headers": self.headers,
            "body": self.body,
        })
    }
}

/// A concrete HTTP response as seen by templates: `{status, headers, body}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    pub status: i64,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Value,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Value::Null,
        }
    }
}

impl Response {
    pub fn to_value(&self) -> Value {
        json!({
            "status": self.status,
            "headers": self.headers,
            "body": self.body,
        })
    }
}
