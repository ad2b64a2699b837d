//! HTTP/1.1 response builder and cache header mutators.
//!
//! Besides the fluent builder used by handlers, [`Response`] exposes the
//! in-place mutators the conditional cache needs (`set_etag`,
//! `set_max_age`, …) and the RFC 9110 §13 freshness predicate
//! [`Response::is_not_modified`].

use chrono::{DateTime, Utc};

use super::{CacheControl, Headers, Request, StatusCode, date};

/// Headers that describe a representation body and must not accompany a 304.
const NOT_MODIFIED_STRIPPED: [&str; 7] = [
    "Allow",
    "Content-Encoding",
    "Content-Language",
    "Content-Length",
    "Content-MD5",
    "Content-Type",
    "Last-Modified",
];

/// An HTTP/1.1 response.
///
/// # Examples
///
/// ```
/// use revalidate::http::{Response, StatusCode};
///
/// let mut response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// response.set_etag("abc", false);
/// response.set_max_age(60);
/// response.set_public();
///
/// assert_eq!(response.headers().get("etag"), Some("\"abc\""));
/// assert_eq!(response.headers().get("cache-control"), Some("max-age=60, public"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// The directives currently in the `Cache-Control` header, across all
    /// of its lines.
    pub fn cache_control(&self) -> CacheControl {
        let value = self
            .headers
            .get_all("cache-control")
            .collect::<Vec<_>>()
            .join(", ");
        CacheControl::parse(&value)
    }

    /// Sets the `ETag` header, quoting `etag` unless it already is quoted.
    pub fn set_etag(&mut self, etag: &str, weak: bool) {
        let quoted = if etag.starts_with('"') {
            etag.to_owned()
        } else {
            format!("\"{etag}\"")
        };
        let value = if weak { format!("W/{quoted}") } else { quoted };
        self.headers.set("ETag", value);
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get("etag")
    }

    /// Sets `Last-Modified` to `date`, or removes it when `None`.
    pub fn set_last_modified(&mut self, date: Option<DateTime<Utc>>) {
        match date {
            Some(date) => self
                .headers
                .set("Last-Modified", date::format_http_date(date)),
            None => {
                self.headers.remove("last-modified");
            }
        }
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.headers
            .get("last-modified")
            .and_then(date::parse_http_date)
    }

    pub fn set_expires(&mut self, date: DateTime<Utc>) {
        self.headers.set("Expires", date::format_http_date(date));
    }

    /// Replaces the `Vary` header with `fields`. An empty list removes it.
    pub fn set_vary<S: AsRef<str>>(&mut self, fields: &[S]) {
        if fields.is_empty() {
            self.headers.remove("vary");
            return;
        }
        let joined = fields
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ");
        self.headers.set("Vary", joined);
    }

    /// Sets `max-age` (freshness lifetime for any cache).
    pub fn set_max_age(&mut self, seconds: u64) {
        self.update_cache_control(|cc| cc.set_max_age(seconds));
    }

    /// Sets `s-maxage`. Shared caches only honour it on public responses,
    /// so this marks the response public too.
    pub fn set_shared_max_age(&mut self, seconds: u64) {
        self.update_cache_control(|cc| {
            cc.set_public();
            cc.set_s_maxage(seconds);
        });
    }

    pub fn set_public(&mut self) {
        self.update_cache_control(CacheControl::set_public);
    }

    pub fn set_private(&mut self) {
        self.update_cache_control(CacheControl::set_private);
    }

    /// Turns this response into a `304 Not Modified`: empty body, and no
    /// header that describes the omitted representation.
    pub fn set_not_modified(&mut self) {
        self.status = StatusCode::NotModified;
        self.body.clear();
        for name in NOT_MODIFIED_STRIPPED {
            self.headers.remove(name);
        }
    }

    /// Decides whether `request`'s validators match this response, and if so
    /// converts it with [`set_not_modified`](Self::set_not_modified).
    ///
    /// `If-None-Match` takes precedence: when present, `If-Modified-Since` is
    /// not consulted (RFC 9110 §13.1.3). Entity tags are compared weakly.
    pub fn is_not_modified(&mut self, request: &Request) -> bool {
        if !request.method().is_cacheable() {
            return false;
        }

        let candidates = request.if_none_match();
        let not_modified = if !candidates.is_empty() {
            let current = self.etag().map(strip_weak);
            candidates
                .iter()
                .any(|tag| *tag == "*" || Some(strip_weak(tag)) == current)
        } else {
            match (request.if_modified_since(), self.last_modified()) {
                (Some(since), Some(modified)) => since >= modified,
                _ => false,
            }
        };

        if not_modified {
            self.set_not_modified();
        }
        not_modified
    }

    // Re-reads the header on every change so directives the handler set
    // itself are merged with, not replaced by, the managed ones.
    fn update_cache_control(&mut self, change: impl FnOnce(&mut CacheControl)) {
        let mut cc = self.cache_control();
        change(&mut cc);
        if cc.is_empty() {
            self.headers.remove("cache-control");
        } else {
            self.headers.set("Cache-Control", cc.to_string());
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
