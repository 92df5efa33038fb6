//! Declarative batch-template engine: a tree of HTTP request descriptions
//! whose URLs, headers, bodies, loop conditions and output shapes are small
//! expressions reading from the evolving results of already-executed
//! requests. The engine materializes each request against a shared, growing
//! context document, hands it to a [`RequestDispatcher`], folds the response
//! back in, and produces one consolidated response.

pub mod builder;
pub mod coerce;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod functions;
pub mod models;
pub mod path;

mod expression;
mod filter;
mod parser;

pub use builder::JsonBuilder;
pub use context::ContextDocument;
pub use dispatcher::RequestDispatcher;
pub use engine::BatchEngine;
pub use errors::{Error, Result};
pub use functions::{Function, Registry};
pub use models::{
    BatchTemplate, DispatchOptions, LoopOptions, LoopTemplate, Request, RequestTemplate, Response,
    ResponseTemplate, VarTemplate,
};

/// Convenience: evaluate one template value against a context document with
/// the built-in function registry.
pub fn build(template: &serde_json::Value, context: &serde_json::Value) -> Result<serde_json::Value> {
    JsonBuilder::new(Registry::with_builtins()).build(template, context)
}
