use crate::ast::Operator;

/// Boxed error produced by a [`crate::Transport`] implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for building, translating and executing `OData` queries
///
/// Construction errors are raised by the builder call that violates the contract,
/// translation errors while rendering a chain into URL segments, and the
/// remaining variants while executing a request.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Construction errors
    #[error("invalid predicate composition: {0}")]
    InvalidPredicateComposition(String),

    #[error("invalid argument for '{operator}': {reason}")]
    InvalidArgument {
        operator: Operator,
        reason: String,
    },

    #[error("invalid field path: '{0}'")]
    InvalidFieldPath(String),

    // Translation errors
    #[error("operator '{0}' is not supported")]
    UnsupportedOperator(Operator),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("unsupported value kind: {0}")]
    UnsupportedValue(String),

    // Execution errors
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Connection(#[source] BoxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid next link '{link}': {source}")]
    InvalidNextLink {
        link: String,
        #[source]
        source: url::ParseError,
    },

    #[error("no transport configured for this provider")]
    TransportUnavailable,
}

impl Error {
    /// HTTP status carried by the error, if the server answered with one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
