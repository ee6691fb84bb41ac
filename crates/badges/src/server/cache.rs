//! In-memory cache for GET responses.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

use super::AppState;

#[derive(Debug, Clone)]
struct CachedResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
    stored_at: Instant,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Default upper bound on cached responses.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Default)]
struct Entries {
    responses: HashMap<String, CachedResponse>,
    /// Bumped by every clear; responses read before a clear are not stored.
    generation: u64,
}

/// Successful GET responses keyed by path and query. A zero TTL disables
/// caching.
///
/// Expired responses are dropped on every insert and at most `max_entries`
/// are kept, the oldest being evicted first.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<Entries>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current generation, to be passed back to [`ResponseCache::insert`].
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.lock();
        match entries.responses.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.clone()),
            Some(_) => {
                entries.responses.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response read during `generation`. Skipped when the cache was
    /// cleared since.
    fn insert(&self, key: String, entry: CachedResponse, generation: u64) -> bool {
        let mut entries = self.lock();
        if entries.generation != generation {
            debug!("Not caching {}: cache cleared while it was read", key);
            return false;
        }

        let ttl = self.ttl;
        entries
            .responses
            .retain(|_, cached| cached.stored_at.elapsed() < ttl);

        while entries.responses.len() >= self.max_entries
            && !entries.responses.contains_key(&key)
        {
            let Some(oldest) = entries
                .responses
                .iter()
                .min_by_key(|(_, cached)| cached.stored_at)
                .map(|(stale, _)| stale.clone())
            else {
                break;
            };
            entries.responses.remove(&oldest);
        }

        entries.responses.insert(key, entry);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.responses.clear();
        entries.generation = entries.generation.wrapping_add(1);
    }
}

fn cache_key(request: &Request) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

pub async fn cache_responses(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET || !state.cache.is_enabled() {
        return next.run(request).await;
    }

    let key = cache_key(&request);
    if let Some(hit) = state.cache.get(&key) {
        debug!("Cache hit for {}", key);
        return hit.into_response();
    }
    let generation = state.cache.generation();

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let (parts, body) = response.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to buffer response for {}: {}", key, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    state.cache.insert(
        key,
        CachedResponse {
            status: parts.status,
            content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
            body: body.clone(),
            stored_at: Instant::now(),
        },
        generation,
    );
    Response::from_parts(parts, Body::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            content_type: None,
            body: Bytes::from_static(body.as_bytes()),
            stored_at: Instant::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(40));
        cache.insert("/badge-award".to_string(), entry("[]"), cache.generation());

        tokio::time::advance(Duration::from_secs(39)).await;
        assert!(cache.get("/badge-award").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("/badge-award").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_drops_expired_entries_for_other_keys() {
        let cache = ResponseCache::new(Duration::from_secs(40)).with_max_entries(usize::MAX);
        for since in 0..10_000 {
            cache.insert(
                format!("/badge-award?since={}", since),
                entry("[]"),
                cache.generation(),
            );
        }
        assert_eq!(cache.len(), 10_000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        cache.insert("/badge-accepted".to_string(), entry("[]"), cache.generation());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("/badge-accepted").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_entry_is_evicted_at_capacity() {
        let cache = ResponseCache::new(Duration::from_secs(40)).with_max_entries(2);
        cache.insert("/a".to_string(), entry("1"), cache.generation());
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("/b".to_string(), entry("2"), cache.generation());
        tokio::time::advance(Duration::from_secs(1)).await;

        // refreshing a present key evicts nothing
        cache.insert("/b".to_string(), entry("3"), cache.generation());
        assert_eq!(cache.len(), 2);

        cache.insert("/c".to_string(), entry("4"), cache.generation());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("/a").is_none());
        assert_eq!(cache.get("/b").unwrap().body, Bytes::from_static(b"3"));
        assert!(cache.get("/c").is_some());
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = ResponseCache::new(Duration::from_secs(40));
        cache.insert("/a".to_string(), entry("1"), cache.generation());
        cache.insert("/b?since=1".to_string(), entry("2"), cache.generation());
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_response_read_before_clear_is_not_stored() {
        let cache = ResponseCache::new(Duration::from_secs(40));
        let before = cache.generation();

        cache.clear();
        assert!(!cache.insert("/badge-award".to_string(), entry("[1]"), before));
        assert!(cache.get("/badge-award").is_none());

        assert!(cache.insert("/badge-award".to_string(), entry("[]"), cache.generation()));
        assert!(cache.get("/badge-award").is_some());
    }

    #[test]
    fn test_zero_ttl_or_capacity_disables_cache() {
        assert!(!ResponseCache::new(Duration::ZERO).is_enabled());
        assert!(!ResponseCache::new(Duration::from_secs(1)).with_max_entries(0).is_enabled());
        assert!(ResponseCache::new(Duration::from_secs(1)).is_enabled());
    }
}
