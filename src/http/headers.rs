//! HTTP header map with case-insensitive name lookup.
//!
//! HTTP headers are order-preserving and case-insensitive per [RFC 9110 §5].
//! List-valued fields (`If-None-Match`, `Vary`, `Cache-Control`) may arrive
//! either comma-joined or spread over repeated lines; [`Headers::get_list`]
//! flattens both forms.

use std::fmt;

/// A case-insensitive, multi-value HTTP header map.
///
/// # Examples
///
/// ```
/// use revalidate::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Vary", "Accept");
/// headers.insert("Vary", "Accept-Encoding, Cookie");
///
/// let fields: Vec<_> = headers.get_list("vary").collect();
/// assert_eq!(fields, vec!["Accept", "Accept-Encoding", "Cookie"]);
///
/// headers.set("Vary", "Origin");
/// assert_eq!(headers.get_all("vary").count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single `value`, keeping the
    /// position of the first one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let Some(first) = self
            .inner
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&name))
        else {
            self.inner.push((name, value));
            return;
        };
        let mut index = 0;
        self.inner.retain(|(k, _)| {
            let keep = index <= first || !k.eq_ignore_ascii_case(&name);
            index += 1;
            keep
        });
        self.inner[first] = (name, value);
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all values for the given header name (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the comma-separated members of a list-valued header, across
    /// all of its lines, trimmed and with empty members skipped.
    pub fn get_list<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.get_all(name)
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|member| !member.is_empty())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("ETag", "\"abc\"");
        assert_eq!(h.get("etag"), Some("\"abc\""));
        assert_eq!(h.get("ETAG"), Some("\"abc\""));
    }

    #[test]
    fn set_replaces_every_line() {
        let mut h = Headers::new();
        h.insert("Vary", "Accept");
        h.insert("vary", "Cookie");
        h.insert("X-Other", "1");
        h.set("Vary", "Origin");
        let vals: Vec<_> = h.get_all("vary").collect();
        assert_eq!(vals, vec!["Origin"]);
        assert_eq!(h.iter().next(), Some(("Vary", "Origin")));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn list_members_span_lines() {
        let mut h = Headers::new();
        h.insert("If-None-Match", "\"a\", \"b\"");
        h.insert("If-None-Match", " \"c\" ,");
        let tags: Vec<_> = h.get_list("if-none-match").collect();
        assert_eq!(tags, vec!["\"a\"", "\"b\"", "\"c\""]);
    }

    #[test]
    fn remove() {
        let mut h = Headers::new();
        h.insert("Last-Modified", "x");
        h.insert("last-modified", "y");
        assert!(h.remove("LAST-MODIFIED"));
        assert!(h.is_empty());
        assert!(!h.remove("last-modified"));
    }
}
