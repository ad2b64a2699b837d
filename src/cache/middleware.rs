use std::{future::Future, pin::Pin, sync::Arc};

use tracing::error;

use super::{CacheDirective, CacheError, ConditionalCache};
use crate::{
    Response, StatusCode,
    context::{Context, RequestId},
    middleware::{Middleware, Next},
};

/// Runs a [`ConditionalCache`] around the rest of the chain.
///
/// Must sit after whatever attaches the [`CacheDirective`] and fills the
/// attributes its expressions read; as a [`Router`](crate::Router) layer it
/// sees the matched route's directive and path parameters.
///
/// A 304 produced before dispatch still goes through the response phase, so
/// it carries the same `Cache-Control`, `Expires` and `Vary` as a full
/// response would. A [`CacheError`] becomes a `500 Internal Server Error`.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use revalidate::cache::{CacheDirective, ConditionalCache, HttpCacheMiddleware};
/// use revalidate::middleware::from_middleware;
/// use revalidate::{Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router.layer(from_middleware(Arc::new(HttpCacheMiddleware::new(ConditionalCache::new()))));
/// router
///     .get("/posts/:id", |_ctx| async { Response::new(StatusCode::Ok) })
///     .cache(CacheDirective::new().etag(".id").public());
/// ```
pub struct HttpCacheMiddleware {
    cache: Arc<ConditionalCache>,
}

impl HttpCacheMiddleware {
    pub fn new(cache: ConditionalCache) -> Self {
        Self::shared(Arc::new(cache))
    }

    pub fn shared(cache: Arc<ConditionalCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ConditionalCache> {
        &self.cache
    }
}

impl Middleware for HttpCacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = Arc::clone(&self.cache);
        Box::pin(async move {
            let Some(directive) = ctx.extensions().get::<CacheDirective>().cloned() else {
                return next.run(ctx).await;
            };
            let id = ctx.id();
            let _guard = cache.pending().guard(id);

            let mut response = match cache.before_dispatch(&ctx) {
                Ok(Some(not_modified)) => not_modified,
                Ok(None) => next.run(ctx).await,
                Err(err) => return failure(id, &err),
            };

            match cache.after_dispatch(id, Some(&directive), &mut response) {
                Ok(()) => response,
                Err(err) => failure(id, &err),
            }
        })
    }
}

fn failure(request: RequestId, err: &CacheError) -> Response {
    error!(%request, error = %err, "cache directive failed");
    Response::new(StatusCode::InternalServerError).body("Internal Server Error")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    use super::*;
    use crate::{
        Method, Request,
        cache::{Age, ExpressionError, FixedClock, hash_etag},
        context::Attributes,
        middleware::{MiddlewareHandler, from_middleware},
    };

    type BoxedResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

    fn lookup(expression: &str, attributes: &Attributes) -> Result<Value, ExpressionError> {
        Ok(attributes.get(expression).cloned().unwrap_or(Value::Null))
    }

    fn middleware() -> HttpCacheMiddleware {
        HttpCacheMiddleware::new(
            ConditionalCache::new()
                .with_evaluator(lookup)
                .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())),
        )
    }

    /// A handler that counts its invocations and answers with `status`.
    fn handler(calls: Arc<AtomicUsize>, status: StatusCode) -> MiddlewareHandler {
        Arc::new(move |_ctx: Context, _next: Next| -> BoxedResponse {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Response::new(status).body("fresh body") })
        })
    }

    /// A handler answering with whatever `respond` builds.
    fn responding(respond: fn() -> Response) -> MiddlewareHandler {
        Arc::new(move |_ctx: Context, _next: Next| -> BoxedResponse {
            Box::pin(async move { respond() })
        })
    }

    fn context(request: Request, directive: Option<CacheDirective>) -> Context {
        let mut ctx = Context::new(request);
        ctx.attributes_mut().insert("version", "v1");
        if let Some(directive) = directive {
            ctx.extensions_mut().insert(directive);
        }
        ctx
    }

    async fn run(
        cache: &Arc<HttpCacheMiddleware>,
        ctx: Context,
        calls: &Arc<AtomicUsize>,
        status: StatusCode,
    ) -> Response {
        let chain = vec![
            from_middleware(Arc::clone(cache)),
            handler(Arc::clone(calls), status),
        ];
        Next::new(chain).run(ctx).await
    }

    async fn run_with(
        cache: &Arc<HttpCacheMiddleware>,
        directive: CacheDirective,
        respond: fn() -> Response,
    ) -> Response {
        let chain = vec![from_middleware(Arc::clone(cache)), responding(respond)];
        let ctx = context(Request::new(Method::Get, "/"), Some(directive));
        Next::new(chain).run(ctx).await
    }

    fn directive() -> CacheDirective {
        CacheDirective::new()
            .etag("version")
            .max_age(Age::Seconds(30))
            .public()
    }

    #[tokio::test]
    async fn without_directive_response_is_untouched() {
        let cache = Arc::new(middleware());
        let calls = Arc::new(AtomicUsize::new(0));
        let response = run(&cache, context(Request::new(Method::Get, "/"), None), &calls, StatusCode::Ok).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(response.headers().is_empty());
        assert_eq!(response.body_ref(), b"fresh body");
    }

    #[tokio::test]
    async fn matching_etag_skips_handler() {
        let cache = Arc::new(middleware());
        let calls = Arc::new(AtomicUsize::new(0));
        let etag = format!("\"{}\"", hash_etag(&Value::from("v1")));
        let request = Request::new(Method::Get, "/").header("If-None-Match", etag.as_str());

        let response = run(&cache, context(request, Some(directive())), &calls, StatusCode::Ok).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.status(), StatusCode::NotModified);
        assert!(response.body_ref().is_empty());
        assert_eq!(response.etag(), Some(etag.as_str()));
        assert_eq!(
            response.headers().get("cache-control"),
            Some("max-age=30, public")
        );
    }

    #[tokio::test]
    async fn stale_copy_gets_full_response() {
        let cache = Arc::new(middleware());
        let calls = Arc::new(AtomicUsize::new(0));
        let request = Request::new(Method::Get, "/").header("If-None-Match", "\"old\"");

        let response = run(&cache, context(request, Some(directive())), &calls, StatusCode::Ok).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.body_ref(), b"fresh body");
        let expected = format!("\"{}\"", hash_etag(&Value::from("v1")));
        assert_eq!(response.etag(), Some(expected.as_str()));
        assert!(cache.cache().pending().is_empty());
    }

    #[tokio::test]
    async fn error_responses_are_not_decorated() {
        let cache = Arc::new(middleware());
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = context(Request::new(Method::Get, "/"), Some(directive()));

        let response = run(&cache, ctx, &calls, StatusCode::ServiceUnavailable).await;

        assert_eq!(response.status(), StatusCode::ServiceUnavailable);
        assert!(response.headers().is_empty());
        assert!(cache.cache().pending().is_empty());
    }

    #[tokio::test]
    async fn configuration_errors_become_500() {
        let cache = Arc::new(HttpCacheMiddleware::new(
            ConditionalCache::new().without_evaluator(),
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let ctx = context(Request::new(Method::Get, "/"), Some(directive()));

        let response = run(&cache, ctx, &calls, StatusCode::Ok).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(response.status(), StatusCode::InternalServerError);
        assert!(!response.headers().contains("cache-control"));
    }

    #[tokio::test]
    async fn handler_cache_control_is_kept() {
        let cache = Arc::new(middleware());
        let response = run_with(
            &cache,
            CacheDirective::new().max_age(Age::Seconds(60)).public(),
            || Response::new(StatusCode::Ok).header("Cache-Control", "no-store, must-revalidate"),
        )
        .await;

        assert_eq!(
            response.headers().get_all("cache-control").collect::<Vec<_>>(),
            vec!["max-age=60, must-revalidate, no-store, public"]
        );
    }

    #[tokio::test]
    async fn handler_max_age_is_overridden() {
        let cache = Arc::new(middleware());
        let response = run_with(&cache, CacheDirective::new().max_age(Age::Seconds(60)), || {
            Response::new(StatusCode::Ok).header("Cache-Control", "private, max-age=5")
        })
        .await;

        assert_eq!(
            response.headers().get("cache-control"),
            Some("max-age=60, private")
        );
    }

    #[tokio::test]
    async fn directive_vary_replaces_handler_vary() {
        let cache = Arc::new(middleware());
        let response = run_with(&cache, CacheDirective::new().vary(["Accept"]), || {
            Response::new(StatusCode::Ok)
                .header("Vary", "Cookie")
                .header("Vary", "Origin")
        })
        .await;

        assert_eq!(response.headers().get_all("vary").collect::<Vec<_>>(), vec!["Accept"]);
    }

    #[tokio::test]
    async fn handler_vary_and_expires_survive_unrelated_directive() {
        let cache = Arc::new(middleware());
        let response = run_with(&cache, CacheDirective::new().max_age(Age::Seconds(1)), || {
            Response::new(StatusCode::Ok)
                .header("Vary", "Cookie")
                .header("Expires", "Thu, 01 Jan 1970 00:00:00 GMT")
        })
        .await;

        assert_eq!(response.headers().get("vary"), Some("Cookie"));
        assert_eq!(
            response.headers().get("expires"),
            Some("Thu, 01 Jan 1970 00:00:00 GMT")
        );
    }

    #[tokio::test]
    async fn directive_expires_replaces_handler_expires() {
        let cache = Arc::new(middleware());
        let response = run_with(&cache, CacheDirective::new().expires("+1 hour"), || {
            Response::new(StatusCode::Ok).header("Expires", "0")
        })
        .await;

        assert_eq!(
            response.headers().get_all("expires").collect::<Vec<_>>(),
            vec!["Fri, 01 Mar 2024 13:00:00 GMT"]
        );
    }

    #[tokio::test]
    async fn abandoned_requests_leave_nothing_behind() {
        let cache = Arc::new(middleware());
        let stalled: MiddlewareHandler = Arc::new(|_ctx: Context, _next: Next| -> BoxedResponse {
            Box::pin(std::future::pending())
        });
        let chain = vec![from_middleware(Arc::clone(&cache)), stalled];
        let ctx = context(Request::new(Method::Get, "/"), Some(directive()));

        let request = tokio::spawn(Next::new(chain).run(ctx));
        while cache.cache().pending().is_empty() {
            tokio::task::yield_now().await;
        }
        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        assert!(cache.cache().pending().is_empty());
    }
}
