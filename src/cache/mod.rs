//! Conditional HTTP caching: validators, `304 Not Modified`, and freshness headers.
//!
//! A route declares a [`CacheDirective`]. Before its handler runs,
//! [`ConditionalCache::before_dispatch`] evaluates the directive's ETag and
//! Last-Modified expressions against the request [`Attributes`] and compares
//! them with the client's `If-None-Match` / `If-Modified-Since`. A match ends
//! the request with a 304 and the handler never runs. Otherwise the computed
//! validators are parked in [`PendingValidators`] under the request's
//! [`RequestId`] until [`ConditionalCache::after_dispatch`] attaches them,
//! together with `Cache-Control`, `Expires` and `Vary`, to the real response.
//!
//! [`HttpCacheMiddleware`] runs both phases around a middleware chain.
//!
//! [`Attributes`]: crate::context::Attributes
//! [`RequestId`]: crate::context::RequestId

mod directive;
mod error;
mod evaluator;
pub mod expression;
mod middleware;
mod store;
pub mod time;

pub use directive::{Age, CacheDirective, Visibility};
pub use error::CacheError;
pub use evaluator::{CACHEABLE_STATUSES, ConditionalCache, hash_etag};
#[cfg(feature = "jq")]
pub use expression::JqEvaluator;
pub use expression::{ExpressionError, ExpressionEvaluator};
pub use middleware::HttpCacheMiddleware;
pub use store::{PendingGuard, PendingValidators};
pub use time::{Clock, FixedClock, SystemClock};
