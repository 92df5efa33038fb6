use thiserror::Error;

/// Everything that can abort one `execute` call. Evaluator errors carry the
/// expression or path that triggered them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unresolved reference: no match for `{0}`")]
    UnresolvedReference(String),

    #[error("cannot coerce `{value}` to {target}")]
    TypeCoercion { value: String, target: &'static str },

    #[error("unknown function: __{0}")]
    UnknownFunction(String),

    #[error("invalid arguments for __{function}: {reason}")]
    FunctionArgument {
        function: &'static str,
        reason: String,
    },

    #[error("empty sequence passed to __{0}")]
    EmptySequence(&'static str),

    #[error("invalid expression: {0}")]
    Expression(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cannot parse response body: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
