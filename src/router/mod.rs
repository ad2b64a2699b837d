//! Request routing: map URL patterns and HTTP methods to handler functions.
//!
//! Three pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params              |
//! |----------------------|----------------------------|------------------------------|
//! | `/users`             | `/users`                   | *(none)*                     |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                  |
//! | `/files/*`           | `/files/docs/readme.txt`   | `wildcard → "/docs/readme.txt"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so `/users/` and
//! `/users` are treated as equivalent.
//!
//! Routes are matched in registration order; the first route whose method and pattern both
//! match the incoming request wins. The matched route's [`CacheDirective`] is put into the
//! context's extensions and the router's layers run between matching and the handler, so a
//! cache layer sees both the directive and the path parameters.

use std::pin::Pin;
use std::sync::Arc;

use crate::cache::CacheDirective;
use crate::context::{Context, Parameters};
use crate::middleware::{MiddlewareHandler, Next};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler that processes a [`Context`] and returns a [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
    Wildcard(String),
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

impl Pattern {
    /// `/*` suffix → wildcard, any `:` → parameterized, otherwise exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if let Some(prefix) = pattern.strip_suffix("/*") {
            return Pattern::Wildcard(prefix.to_string());
        }

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_string()),
                    None => Segment::Static(s.to_string()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_string())
    }

    fn matches(&self, path: &str) -> Option<Parameters> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(Parameters::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = Parameters::new();
                for (segment, value) in segments.iter().zip(path_segments) {
                    match segment {
                        Segment::Static(s) if s != value => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => params.insert(name.as_str(), value),
                    }
                }
                Some(params)
            }
            Pattern::Wildcard(prefix) => path.strip_prefix(prefix.as_str()).map(|suffix| {
                let mut params = Parameters::new();
                params.insert("wildcard", suffix);
                params
            }),
        }
    }
}

/// A registered route. Returned by the registration methods on [`Router`] so
/// a [`CacheDirective`] can be attached.
pub struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
    directive: Option<CacheDirective>,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        Self {
            method,
            pattern: Pattern::parse(pattern),
            handler,
            directive: None,
        }
    }

    /// Declares the caching behavior of this route.
    pub fn cache(&mut self, directive: CacheDirective) -> &mut Self {
        self.directive = Some(directive);
        self
    }

    pub fn directive(&self) -> Option<&CacheDirective> {
        self.directive.as_ref()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    fn matches(&self, method: &Method, path: &str) -> Option<Parameters> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router.
///
/// When no route matches, a `404 Not Found` response is returned without
/// running the layers.
///
/// # Examples
///
/// ```rust,no_run
/// use revalidate::cache::{Age, CacheDirective};
/// use revalidate::context::Context;
/// use revalidate::{Response, Router, StatusCode};
///
/// let mut router = Router::new();
///
/// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok) });
///
/// router
///     .get("/users/:id", |ctx: Context| async move {
///         let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///         Response::new(StatusCode::Ok).body(id)
///     })
///     .cache(CacheDirective::new().etag(".id").max_age(Age::Seconds(60)));
/// ```
pub struct Router {
    routes: Vec<Route>,
    layers: Vec<MiddlewareHandler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty `Router` with no registered routes.
    ///
    /// ```rust
    /// use revalidate::Router;
    ///
    /// let router = Router::new();
    /// assert!(router.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Get, path, handler)
    }

    pub fn head(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Head, path, handler)
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Post, path, handler)
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Put, path, handler)
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Delete, path, handler)
    }

    pub fn options(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Options, path, handler)
    }

    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Patch, path, handler)
    }

    pub fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) -> &mut Route {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route::new(method, path, handler));
        let last = self.routes.len() - 1;
        &mut self.routes[last]
    }

    /// Appends a middleware that runs for every matched route, in the order
    /// layers were added, before the route's handler.
    pub fn layer(&mut self, middleware: MiddlewareHandler) -> &mut Self {
        self.layers.push(middleware);
        self
    }

    /// Every directive attached to a route, for checking at startup with
    /// [`ConditionalCache::verify_all`](crate::cache::ConditionalCache::verify_all).
    pub fn directives(&self) -> impl Iterator<Item = &CacheDirective> {
        self.routes.iter().filter_map(Route::directive)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` to the first matching route and return its response.
    pub async fn route(&self, request: Request) -> Response {
        let Some((route, params)) = self
            .routes
            .iter()
            .find_map(|route| route.matches(request.method(), request.path()).map(|p| (route, p)))
        else {
            return Response::new(StatusCode::NotFound);
        };

        let mut ctx = Context::with_params(request, params);
        if let Some(directive) = &route.directive {
            ctx.extensions_mut().insert(directive.clone());
        }

        let handler = Arc::clone(&route.handler);
        let endpoint: MiddlewareHandler = Arc::new(move |ctx: Context, _next: Next| handler(ctx));

        let mut chain = self.layers.clone();
        chain.push(endpoint);
        Next::new(chain).run(ctx).await
    }
}
