//! Stored cache entries.

use crate::http::{Method, Request, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A response captured for a request, plus when it was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub method: Method,
    pub url: Url,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn new(request: &Request, response: Response) -> Self {
        Self {
            method: request.method,
            url: request.url.clone(),
            response,
            stored_at: Utc::now(),
        }
    }

    /// Key under which this entry is stored; matches [`Request::cache_key`].
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Whether the entry was stored more than `max_age_secs` before `now`.
    pub fn is_expired(&self, max_age_secs: u64, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.stored_at).num_seconds();
        age >= 0 && age as u64 > max_age_secs
    }
}
