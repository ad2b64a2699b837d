//! Two requests against a cached route: the first gets the full body and its
//! validators, the second sends them back and gets `304 Not Modified`.
//!
//! ```sh
//! RUST_LOG=revalidate=debug cargo run --example conditional_get
//! ```

use std::{future::Future, pin::Pin, sync::Arc};

use revalidate::cache::{Age, CacheDirective, ConditionalCache, HttpCacheMiddleware};
use revalidate::context::Context;
use revalidate::middleware::{LoggerMiddleware, Next, from_middleware};
use revalidate::{Method, Request, Response, Router, StatusCode};
use serde_json::json;
use tracing_subscriber::EnvFilter;

type BoxedResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Stands in for a repository lookup: puts the post named by `:id` into the
/// attributes the cache expressions read.
fn load_post(mut ctx: Context, next: Next) -> BoxedResponse {
    if let Some(id) = ctx.params().get("id").and_then(|id| id.parse::<u64>().ok()) {
        ctx.attributes_mut().insert(
            "post",
            json!({ "id": id, "revision": 3, "updated_at": "2024-03-01 12:00:00" }),
        );
    }
    Box::pin(next.run(ctx))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cache = Arc::new(ConditionalCache::new());

    let mut router = Router::new();
    router
        .layer(from_middleware(Arc::new(LoggerMiddleware)))
        .layer(Arc::new(load_post))
        .layer(from_middleware(Arc::new(HttpCacheMiddleware::shared(
            Arc::clone(&cache),
        ))));
    router
        .get("/posts/:id", |ctx: Context| async move {
            let id = ctx.params().get("id").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok)
                .header("Content-Type", "text/plain")
                .body(format!("post {id}"))
        })
        .cache(
            CacheDirective::new()
                .last_modified(".post.updated_at")
                .etag("[.post.id, .post.revision]")
                .max_age(Age::Seconds(60))
                .shared_max_age("+1 hour")
                .vary(["Accept"])
                .public(),
        );

    cache.verify_all(router.directives())?;

    let first = router.route(Request::new(Method::Get, "/posts/7")).await;
    println!("first:  {}", first.status());
    for (name, value) in first.headers().iter() {
        println!("        {name}: {value}");
    }

    let mut revalidate = Request::new(Method::Get, "/posts/7");
    if let Some(etag) = first.etag() {
        revalidate = revalidate.header("If-None-Match", etag);
    }
    let second = router.route(revalidate).await;
    println!(
        "second: {} ({} body bytes)",
        second.status(),
        second.body_ref().len()
    );

    Ok(())
}
