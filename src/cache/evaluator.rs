//! The two-phase conditional cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use super::{
    Age, CacheDirective, CacheError, Visibility,
    expression::ExpressionEvaluator,
    store::PendingValidators,
    time::{self, Clock, SystemClock},
};
use crate::{
    Response, StatusCode,
    context::{Context, RequestId},
    http::date,
};

/// Statuses whose responses may carry validators and freshness information.
pub const CACHEABLE_STATUSES: [StatusCode; 8] = [
    StatusCode::Ok,
    StatusCode::NonAuthoritativeInformation,
    StatusCode::MultipleChoices,
    StatusCode::MovedPermanently,
    StatusCode::Found,
    StatusCode::NotModified,
    StatusCode::NotFound,
    StatusCode::Gone,
];

/// Evaluates [`CacheDirective`]s around handler dispatch.
///
/// [`before_dispatch`](Self::before_dispatch) computes the route's validators
/// and answers `304 Not Modified` when the client's copy is still current;
/// [`after_dispatch`](Self::after_dispatch) decorates the handler's response
/// with freshness headers and the validators parked by the first phase.
/// [`HttpCacheMiddleware`](super::HttpCacheMiddleware) wires both into a
/// middleware chain.
///
/// # Examples
///
/// ```
/// use revalidate::cache::{Age, CacheDirective, ConditionalCache, ExpressionError};
/// use revalidate::context::{Attributes, Context};
/// use revalidate::{Method, Request, Response, StatusCode};
/// use serde_json::Value;
///
/// let cache = ConditionalCache::new().with_evaluator(|expr: &str, attrs: &Attributes| {
///     Ok::<_, ExpressionError>(attrs.get(expr).cloned().unwrap_or(Value::Null))
/// });
///
/// let mut ctx = Context::new(Request::new(Method::Get, "/"));
/// ctx.attributes_mut().insert("version", "v1");
/// ctx.extensions_mut().insert(CacheDirective::new().etag("version").max_age(Age::Seconds(60)));
///
/// // No If-None-Match: the handler has to run.
/// assert!(cache.before_dispatch(&ctx).unwrap().is_none());
///
/// let mut response = Response::new(StatusCode::Ok);
/// let directive = ctx.extensions().get::<CacheDirective>();
/// cache.after_dispatch(ctx.id(), directive, &mut response).unwrap();
/// assert_eq!(response.headers().get("cache-control"), Some("max-age=60"));
/// assert!(response.etag().is_some());
/// ```
pub struct ConditionalCache {
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    clock: Arc<dyn Clock>,
    pending: Arc<PendingValidators>,
}

impl Default for ConditionalCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionalCache {
    /// Creates a cache using the system clock and, when the `jq` feature is
    /// enabled, the jq evaluator.
    pub fn new() -> Self {
        Self {
            evaluator: default_evaluator(),
            clock: Arc::new(SystemClock),
            pending: Arc::new(PendingValidators::new()),
        }
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl ExpressionEvaluator + 'static) -> Self {
        self.evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Removes the evaluator; directives with expressions then fail with
    /// [`CacheError::ConfigurationUnavailable`].
    #[must_use]
    pub fn without_evaluator(mut self) -> Self {
        self.evaluator = None;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn pending(&self) -> &Arc<PendingValidators> {
        &self.pending
    }

    /// Checks a directive at wiring time: its expressions have an evaluator
    /// and compile, and its time expressions resolve.
    pub fn verify(&self, directive: &CacheDirective) -> Result<(), CacheError> {
        for expression in directive.expressions() {
            self.evaluator(expression)?.check(expression)?;
        }
        self.resolve_freshness(directive, self.clock.now())
            .map(|_| ())
    }

    pub fn verify_all<'a>(
        &self,
        directives: impl IntoIterator<Item = &'a CacheDirective>,
    ) -> Result<(), CacheError> {
        directives
            .into_iter()
            .try_for_each(|directive| self.verify(directive))
    }

    /// Phase 1: runs before the handler.
    ///
    /// Returns `Ok(Some(response))` with a `304 Not Modified` when the
    /// client's validators match, in which case the handler must not run.
    /// Otherwise parks the computed validators under the request's id and
    /// returns `Ok(None)`. A request without a directive is left alone.
    pub fn before_dispatch(&self, ctx: &Context) -> Result<Option<Response>, CacheError> {
        let Some(directive) = ctx.extensions().get::<CacheDirective>() else {
            return Ok(None);
        };
        for expression in directive.expressions() {
            self.evaluator(expression)?;
        }

        let mut response = Response::new(StatusCode::Ok);

        let last_modified = match &directive.last_modified {
            Some(expression) => {
                let value = self.evaluate(expression, ctx)?;
                last_modified_from(expression, value, self.clock.now())?
            }
            None => None,
        };
        if last_modified.is_some() {
            response.set_last_modified(last_modified);
        }

        let etag = match &directive.etag {
            Some(expression) => Some(hash_etag(&self.evaluate(expression, ctx)?)),
            None => None,
        };
        if let Some(etag) = &etag {
            response.set_etag(etag, false);
        }

        if response.is_not_modified(ctx.request()) {
            debug!(request = %ctx.id(), path = ctx.request().path(), "validators match, answering 304");
            return Ok(Some(response));
        }

        if let Some(date) = last_modified {
            self.pending.remember_last_modified(ctx.id(), date);
        }
        if let Some(etag) = etag {
            self.pending.remember_etag(ctx.id(), etag);
        }
        trace!(request = %ctx.id(), "validators parked until response");
        Ok(None)
    }

    /// Phase 2: runs on the response, whoever produced it.
    ///
    /// Applies the directive's freshness headers and re-attaches the
    /// validators parked for `request`, consuming them. Responses whose
    /// status is not in [`CACHEABLE_STATUSES`] are left untouched and the
    /// parked validators discarded.
    pub fn after_dispatch(
        &self,
        request: RequestId,
        directive: Option<&CacheDirective>,
        response: &mut Response,
    ) -> Result<(), CacheError> {
        let Some(directive) = directive else {
            return Ok(());
        };

        let last_modified = self.pending.take_last_modified(request);
        let etag = self.pending.take_etag(request);

        if !CACHEABLE_STATUSES.contains(&response.status()) {
            trace!(%request, status = response.status().as_u16(), "status not cacheable, skipping headers");
            return Ok(());
        }

        let freshness = self.resolve_freshness(directive, self.clock.now())?;

        if let Some(seconds) = freshness.shared_max_age {
            response.set_shared_max_age(seconds);
        }
        if let Some(seconds) = freshness.max_age {
            response.set_max_age(seconds);
        }
        if let Some(expires) = freshness.expires {
            response.set_expires(expires);
        }
        if let Some(vary) = &directive.vary {
            response.set_vary(vary);
        }
        match directive.visibility {
            Visibility::Public => response.set_public(),
            Visibility::Private => response.set_private(),
            Visibility::Unset => {}
        }
        if last_modified.is_some() {
            response.set_last_modified(last_modified);
        }
        if let Some(etag) = etag {
            response.set_etag(&etag, false);
        }
        Ok(())
    }

    fn evaluator(&self, expression: &str) -> Result<&dyn ExpressionEvaluator, CacheError> {
        self.evaluator
            .as_deref()
            .ok_or_else(|| CacheError::ConfigurationUnavailable {
                expression: expression.to_owned(),
            })
    }

    fn evaluate(&self, expression: &str, ctx: &Context) -> Result<Value, CacheError> {
        Ok(self
            .evaluator(expression)?
            .evaluate(expression, ctx.attributes())?)
    }

    fn resolve_freshness(
        &self,
        directive: &CacheDirective,
        now: DateTime<Utc>,
    ) -> Result<Freshness, CacheError> {
        let resolve = |field: &'static str, age: &Age| {
            time::resolve_age(age, now).ok_or_else(|| CacheError::MalformedTimeExpression {
                field,
                expression: match age {
                    Age::Seconds(seconds) => seconds.to_string(),
                    Age::Expression(expression) => expression.clone(),
                },
            })
        };

        Ok(Freshness {
            max_age: directive
                .max_age
                .as_ref()
                .map(|age| resolve("max_age", age))
                .transpose()?,
            shared_max_age: directive
                .shared_max_age
                .as_ref()
                .map(|age| resolve("shared_max_age", age))
                .transpose()?,
            expires: directive
                .expires
                .as_deref()
                .map(|expression| {
                    time::resolve_instant(expression, now).ok_or_else(|| {
                        CacheError::MalformedTimeExpression {
                            field: "expires",
                            expression: expression.to_owned(),
                        }
                    })
                })
                .transpose()?,
        })
    }
}

/// Freshness headers resolved up front, so a bad directive fails before the
/// response is touched.
struct Freshness {
    max_age: Option<u64>,
    shared_max_age: Option<u64>,
    expires: Option<DateTime<Utc>>,
}

#[cfg(feature = "jq")]
fn default_evaluator() -> Option<Arc<dyn ExpressionEvaluator>> {
    Some(Arc::new(super::JqEvaluator::new()))
}

#[cfg(not(feature = "jq"))]
fn default_evaluator() -> Option<Arc<dyn ExpressionEvaluator>> {
    None
}

/// SHA-256 of the value's text, hex encoded. Strings hash as-is, `null` as
/// the empty string, anything else as its JSON text.
pub fn hash_etag(value: &Value) -> String {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn last_modified_from(
    expression: &str,
    value: Value,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, CacheError> {
    let parsed = match &value {
        Value::Null | Value::Bool(false) => return Ok(None),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|seconds| seconds.is_finite())
                    .map(|seconds| seconds.trunc() as i64)
            })
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0)),
        Value::String(text) => time::resolve_instant(text, now),
        _ => None,
    };
    parsed
        .map(|date| Some(date::truncate_to_seconds(date)))
        .ok_or_else(|| CacheError::InvalidLastModified {
            expression: expression.to_owned(),
            value: value.to_string(),
        })
}
