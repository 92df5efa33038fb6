use serde_json::Value;
use tracing::warn;

use crate::errors::{Error, Result};
use crate::models::{DispatchOptions, Request, Response};

/// Transport boundary: sends one concrete request and returns one concrete
/// response. Transport failures always abort the batch; only response-body
/// parse failures are recoverable, gated by the options.
pub trait RequestDispatcher {
    fn dispatch(&self, request: &Request, options: &DispatchOptions) -> Result<Response>;
}

/// Closures work as dispatchers, which keeps tests and embedders free of
/// one-off newtypes.
impl<F> RequestDispatcher for F
where
    F: Fn(&Request, &DispatchOptions) -> Result<Response>,
{
    fn dispatch(&self, request: &Request, options: &DispatchOptions) -> Result<Response> {
        self(request, options)
    }
}

/// Decode a raw response body the way every dispatcher implementation is
/// expected to: `fail_back_as_string` keeps an unparsable body as text,
/// `ignore_parsing_error` downgrades the failure to a null body.
pub fn parse_body(raw: &str, options: &DispatchOptions) -> Result<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(e) if options.fail_back_as_string => {
            warn!(error = %e, "cannot parse response body as JSON, keeping raw text");
            Ok(Value::String(raw.to_string()))
        }
        Err(e) if options.ignore_parsing_error => {
            warn!(error = %e, "cannot parse response body as JSON, dropping it");
            Ok(Value::Null)
        }
        Err(e) => Err(Error::Parse(e.to_string())),
    }
}
