//! Validators computed before dispatch, parked until the response exists.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::context::RequestId;

/// Two request-keyed tables holding the ETag and Last-Modified computed for
/// requests that were not short-circuited.
///
/// An entry exists for a request from the moment phase 1 stores it until
/// phase 2 takes it, or until the request's [`PendingGuard`] is dropped.
#[derive(Debug, Default)]
pub struct PendingValidators {
    last_modified: DashMap<RequestId, DateTime<Utc>>,
    etags: DashMap<RequestId, String>,
}

impl PendingValidators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember_last_modified(&self, request: RequestId, date: DateTime<Utc>) {
        self.last_modified.insert(request, date);
    }

    pub fn remember_etag(&self, request: RequestId, etag: String) {
        self.etags.insert(request, etag);
    }

    pub fn last_modified(&self, request: RequestId) -> Option<DateTime<Utc>> {
        self.last_modified.get(&request).map(|entry| *entry)
    }

    pub fn etag(&self, request: RequestId) -> Option<String> {
        self.etags.get(&request).map(|entry| entry.clone())
    }

    pub fn take_last_modified(&self, request: RequestId) -> Option<DateTime<Utc>> {
        self.last_modified.remove(&request).map(|(_, date)| date)
    }

    pub fn take_etag(&self, request: RequestId) -> Option<String> {
        self.etags.remove(&request).map(|(_, etag)| etag)
    }

    /// Drops everything stored for `request`.
    pub fn forget(&self, request: RequestId) {
        self.last_modified.remove(&request);
        self.etags.remove(&request);
    }

    pub fn contains(&self, request: RequestId) -> bool {
        self.last_modified.contains_key(&request) || self.etags.contains_key(&request)
    }

    /// Number of requests with at least one parked validator.
    pub fn len(&self) -> usize {
        self.etags.len()
            + self
                .last_modified
                .iter()
                .filter(|entry| !self.etags.contains_key(entry.key()))
                .count()
    }

    pub fn is_empty(&self) -> bool {
        self.last_modified.is_empty() && self.etags.is_empty()
    }

    /// Returns a guard that forgets `request` when dropped.
    pub fn guard(self: &Arc<Self>, request: RequestId) -> PendingGuard {
        PendingGuard {
            store: Arc::clone(self),
            request,
        }
    }
}

/// Forgets a request's pending validators on drop, so a request abandoned
/// between the two phases (client gone, future cancelled) cannot leak them.
#[must_use = "the guard forgets the request as soon as it is dropped"]
#[derive(Debug)]
pub struct PendingGuard {
    store: Arc<PendingValidators>,
    request: RequestId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.store.contains(self.request) {
            tracing::debug!(request = %self.request, "discarding unconsumed validators");
            self.store.forget(self.request);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_removes_entry() {
        let store = PendingValidators::new();
        let id = RequestId::next();
        store.remember_etag(id, "\"abc\"".into());
        assert_eq!(store.etag(id).as_deref(), Some("\"abc\""));
        assert_eq!(store.take_etag(id).as_deref(), Some("\"abc\""));
        assert_eq!(store.take_etag(id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn requests_do_not_share_entries() {
        let store = PendingValidators::new();
        let (a, b) = (RequestId::next(), RequestId::next());
        store.remember_etag(a, "a".into());
        store.remember_last_modified(b, Utc::now());
        assert_eq!(store.len(), 2);
        assert_eq!(store.etag(b), None);
        assert_eq!(store.last_modified(a), None);
        store.forget(a);
        assert!(!store.contains(a));
        assert!(store.contains(b));
    }

    #[test]
    fn len_counts_requests_not_entries() {
        let store = PendingValidators::new();
        let id = RequestId::next();
        store.remember_etag(id, "a".into());
        store.remember_last_modified(id, Utc::now());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn guard_forgets_on_drop() {
        let store = Arc::new(PendingValidators::new());
        let id = RequestId::next();
        {
            let _guard = store.guard(id);
            store.remember_etag(id, "a".into());
            store.remember_last_modified(id, Utc::now());
        }
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_stay_isolated() {
        let store = Arc::new(PendingValidators::new());
        let tasks: Vec<_> = (0..64)
            .map(|n| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let id = RequestId::next();
                    store.remember_etag(id, format!("tag-{n}"));
                    tokio::task::yield_now().await;
                    store.take_etag(id) == Some(format!("tag-{n}"))
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert!(store.is_empty());
    }
}
