use thiserror::Error;

use super::expression::ExpressionError;

/// Errors raised while applying a [`CacheDirective`](super::CacheDirective).
///
/// All of them are configuration or programming errors: deterministic for a
/// given directive, never worth retrying.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The directive uses an expression but no evaluator is wired in.
    #[error(
        "cannot evaluate `{expression}`: no expression evaluator is configured \
         (enable the `jq` feature or supply one with `ConditionalCache::with_evaluator`)"
    )]
    ConfigurationUnavailable { expression: String },

    /// `max_age`, `shared_max_age` or `expires` does not resolve to a time.
    #[error("malformed time expression for `{field}`: {expression:?}")]
    MalformedTimeExpression {
        field: &'static str,
        expression: String,
    },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// The last-modified expression produced a value that is not a timestamp.
    #[error("last-modified expression `{expression}` produced {value}, which is not a timestamp")]
    InvalidLastModified { expression: String, value: String },
}
