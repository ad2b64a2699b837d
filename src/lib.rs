//! # revalidate
//!
//! Conditional HTTP caching for async route handlers: per-route ETag and
//! Last-Modified validators computed from request data, `304 Not Modified`
//! answered before the handler runs, and `Cache-Control`, `Expires` and
//! `Vary` applied to whatever the handler returns.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use revalidate::cache::{Age, CacheDirective, ConditionalCache, HttpCacheMiddleware};
//! use revalidate::middleware::from_middleware;
//! use revalidate::{Method, Request, Response, Router, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = Arc::new(ConditionalCache::new());
//!     let mut router = Router::new();
//!     router.layer(from_middleware(Arc::new(HttpCacheMiddleware::shared(Arc::clone(&cache)))));
//!     router
//!         .get("/posts/:id", |_ctx| async { Response::new(StatusCode::Ok).body("post") })
//!         .cache(CacheDirective::new().etag(".id").max_age(Age::Seconds(60)).public());
//!
//!     cache.verify_all(router.directives())?;
//!
//!     let response = router.route(Request::new(Method::Get, "/posts/1")).await;
//!     println!("{} etag={:?}", response.status(), response.etag());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;

pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
