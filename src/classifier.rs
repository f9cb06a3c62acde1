//! Request classification.
//!
//! Every intercepted request falls into exactly one [`RequestClass`], which
//! decides the fetch strategy the engine applies to it.

use crate::config::ClassifierConfig;
use crate::http::Request;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the engine treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestClass {
    /// Volatile market/news data: always from the network, never cached.
    LiveData,
    /// Persistent streaming transport: not intercepted at all.
    TransportExempt,
    /// Everything else: cache first, revalidated in the background.
    CacheableAsset,
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LiveData => "live-data",
            Self::TransportExempt => "transport-exempt",
            Self::CacheableAsset => "cacheable-asset",
        })
    }
}

/// Classifies requests by host and scheme.
#[derive(Debug, Clone)]
pub struct Classifier {
    live_data_hosts: Vec<String>,
    streaming_schemes: Vec<String>,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            live_data_hosts: config
                .live_data_hosts
                .iter()
                .map(|h| h.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            streaming_schemes: config
                .streaming_schemes
                .iter()
                .map(|s| s.trim_end_matches(':').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Classify a request. Live-data hosts take precedence over the scheme check.
    pub fn classify(&self, request: &Request) -> RequestClass {
        if request.host().is_some_and(|host| self.is_live_host(host)) {
            RequestClass::LiveData
        } else if self.is_streaming_scheme(request.scheme()) {
            RequestClass::TransportExempt
        } else {
            RequestClass::CacheableAsset
        }
    }

    /// `host` is a listed domain or one of its subdomains.
    fn is_live_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.live_data_hosts.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn is_streaming_scheme(&self, scheme: &str) -> bool {
        self.streaming_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}
