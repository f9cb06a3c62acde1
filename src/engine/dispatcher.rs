//! Per-request fetch strategies.

use super::FetchInterceptionEngine;
use crate::cache::{CacheGeneration, CachedEntry};
use crate::classifier::RequestClass;
use crate::error::Result;
use crate::http::{Fetcher, Request, Response};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the engine did with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// Not intercepted; the host sends the request itself.
    Passthrough,
    /// The engine produced the response.
    Respond(Response),
}

impl Interception {
    /// The response, if the engine produced one.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Passthrough => None,
            Self::Respond(response) => Some(response),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }
}

impl FetchInterceptionEngine {
    /// Classify a request and apply its strategy.
    ///
    /// Only a transport failure on an uncached asset is returned as an error.
    pub async fn on_request(&self, request: Request) -> Result<Interception> {
        let class = self.classifier.classify(&request);
        debug!(%class, "{} {}", request.method, request.url);

        match class {
            RequestClass::TransportExempt => Ok(Interception::Passthrough),
            RequestClass::LiveData => Ok(Interception::Respond(self.network_only(&request).await)),
            RequestClass::CacheableAsset => self.cache_first(request).await.map(Interception::Respond),
        }
    }

    /// Always hit the network. Transport failures and timeouts become the
    /// offline body; HTTP error statuses are returned as they are.
    async fn network_only(&self, request: &Request) -> Response {
        let timeout_secs = self.config.network.live_data_timeout_secs;
        match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.fetcher.fetch(request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Live data unreachable ({}): {}", request.url, e);
                Response::offline()
            }
            Err(_) => {
                warn!(
                    "Live data timed out after {}s: {}",
                    timeout_secs, request.url
                );
                Response::offline()
            }
        }
    }

    /// Serve from the current generation and revalidate in the background,
    /// or fetch and store on a miss.
    async fn cache_first(&self, request: Request) -> Result<Response> {
        let generation = self.current_generation().await;

        if let Some(entry) = generation.get(&request).await {
            if !self.is_expired(&entry) {
                debug!("Cache hit {}", request.cache_key());
                self.revalidate(generation, request).await;
                return Ok(entry.response);
            }
            debug!("Cache entry expired {}", request.cache_key());
        }

        let response = self.fetcher.fetch(&request).await?;
        if response.is_success() && request.method.is_cacheable() {
            generation.put(&request, response.clone()).await;
            debug!("Cached {}", request.cache_key());
        }
        Ok(response)
    }

    fn is_expired(&self, entry: &CachedEntry) -> bool {
        self.config
            .cache
            .max_entry_age_secs
            .is_some_and(|max_age| entry.is_expired(max_age, Utc::now()))
    }

    /// Spawn a background refresh of a cached entry. Failures are dropped.
    async fn revalidate(&self, generation: CacheGeneration, request: Request) {
        let fetcher: Arc<dyn Fetcher> = Arc::clone(&self.fetcher);
        let mut tasks = self.revalidations.lock().await;
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    generation.put(&request, response).await;
                    debug!("Revalidated {}", request.cache_key());
                }
                Ok(response) => {
                    debug!(
                        "Revalidation of {} returned {}",
                        request.cache_key(),
                        response.status
                    );
                }
                Err(e) => {
                    debug!("Revalidation of {} failed: {}", request.cache_key(), e);
                }
            }
        });
    }

    /// Number of background revalidations still tracked.
    pub async fn pending_revalidations(&self) -> usize {
        self.revalidations.lock().await.len()
    }

    /// Wait for every outstanding revalidation to finish.
    pub async fn settle(&self) {
        let mut tasks = std::mem::take(&mut *self.revalidations.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Revalidation task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::cache::{CacheStorage, StorageSnapshot};
    use crate::http::{Method, MockFetcher};
    use mockall::predicate::always;
    use pretty_assertions::assert_eq;
    use url::Url;

    async fn active_engine(fetcher: Arc<ScriptedFetcher>) -> FetchInterceptionEngine {
        script_manifest(&fetcher);
        let engine = engine_with(fetcher);
        engine.on_install().await.unwrap();
        engine.on_activate().await.unwrap();
        engine
    }

    #[tokio::test]
    async fn test_live_data_success_is_not_cached() {
        let fetcher = ScriptedFetcher::new();
        let url = "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin";
        fetcher.script(url, Reply::Respond(Response::ok(r#"{"bitcoin":{"usd":1}}"#)));
        let engine = active_engine(fetcher).await;

        let request = Request::get(url).unwrap();
        let response = engine
            .on_request(request.clone())
            .await
            .unwrap()
            .into_response()
            .unwrap();

        assert_eq!(response.text(), r#"{"bitcoin":{"usd":1}}"#);
        assert!(engine.current_generation().await.get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_live_data_failure_returns_offline_body() {
        let fetcher = ScriptedFetcher::new();
        let engine = active_engine(fetcher).await;

        let request = Request::get("https://cryptopanic.com/api/v1/posts/").unwrap();
        let response = engine
            .on_request(request.clone())
            .await
            .unwrap()
            .into_response()
            .unwrap();

        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"], "Offline");
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert!(engine.current_generation().await.get(&request).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_data_timeout_returns_offline_body() {
        let fetcher = ScriptedFetcher::new();
        let url = "https://api.alternative.me/fng/";
        fetcher.script(url, Reply::Hang);
        let engine = active_engine(fetcher).await;

        let response = engine
            .on_request(Request::get(url).unwrap())
            .await
            .unwrap()
            .into_response()
            .unwrap();

        assert_eq!(response, Response::offline());
    }

    #[tokio::test]
    async fn test_live_data_http_error_passes_through() {
        let fetcher = ScriptedFetcher::new();
        let url = "https://api.coingecko.com/api/v3/coins/bitcoin";
        fetcher.script(url, Reply::Respond(Response::new(500, "upstream down")));
        let engine = active_engine(fetcher).await;

        let response = engine
            .on_request(Request::get(url).unwrap())
            .await
            .unwrap()
            .into_response()
            .unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(response.text(), "upstream down");
    }

    #[tokio::test]
    async fn test_streaming_request_passes_through_untouched() {
        let fetcher = ScriptedFetcher::new();
        let engine = active_engine(fetcher.clone()).await;
        let calls_before = fetcher.calls().len();
        let entries_before = engine.current_generation().await.len().await;

        let request = Request::get("wss://feed.example.com/stream").unwrap();
        let interception = engine.on_request(request.clone()).await.unwrap();

        assert!(interception.is_passthrough());
        assert_eq!(fetcher.calls().len(), calls_before);
        assert_eq!(engine.current_generation().await.len().await, entries_before);
        assert!(engine.current_generation().await.get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_miss_fetches_and_stores() {
        let fetcher = ScriptedFetcher::new();
        let url = "https://app.example/logo.png";
        fetcher.script(url, Reply::Respond(Response::ok("png")));
        let engine = active_engine(fetcher).await;

        let request = Request::get(url).unwrap();
        let response = engine
            .on_request(request.clone())
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(response.text(), "png");

        let entry = engine.current_generation().await.get(&request).await.unwrap();
        assert_eq!(entry.response.text(), "png");
    }

    #[tokio::test]
    async fn test_miss_with_error_status_is_not_stored() {
        let fetcher = ScriptedFetcher::new();
        let url = "https://app.example/missing.png";
        fetcher.script(url, Reply::Respond(Response::new(404, "")));
        let engine = active_engine(fetcher).await;

        let request = Request::get(url).unwrap();
        let response = engine
            .on_request(request.clone())
            .await
            .unwrap()
            .into_response()
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(engine.current_generation().await.get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_miss_with_non_get_is_not_stored() {
        let fetcher = ScriptedFetcher::new();
        let url = "https://backend.example/bot/start";
        fetcher.script(url, Reply::Respond(Response::ok(r#"{"running":true}"#)));
        let engine = active_engine(fetcher).await;

        let request = Request::new(Method::Post, Url::parse(url).unwrap());
        let response = engine
            .on_request(request.clone())
            .await
            .unwrap()
            .into_response()
            .unwrap();

        assert!(response.is_success());
        assert!(engine.current_generation().await.get(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_miss_transport_failure_propagates() {
        let fetcher = ScriptedFetcher::new();
        let engine = active_engine(fetcher).await;

        let result = engine
            .on_request(Request::get("https://app.example/never-seen.js").unwrap())
            .await;

        assert!(matches!(result, Err(crate::Error::Network(_))));
    }

    #[tokio::test]
    async fn test_hit_does_not_wait_for_revalidation() {
        let fetcher = ScriptedFetcher::new();
        let engine = active_engine(fetcher.clone()).await;
        fetcher.script("https://app.example/app.html", Reply::Hang);

        let response = tokio::time::timeout(
            Duration::from_secs(1),
            engine.on_request(Request::get("https://app.example/app.html").unwrap()),
        )
        .await
        .expect("cache hit must not wait on revalidation")
        .unwrap()
        .into_response()
        .unwrap();

        assert_eq!(response.text(), "<html></html>");
        assert_eq!(engine.pending_revalidations().await, 1);
    }

    #[tokio::test]
    async fn test_revalidation_overwrites_entry() {
        let fetcher = ScriptedFetcher::new();
        let engine = active_engine(fetcher.clone()).await;
        fetcher.script(
            "https://app.example/app.html",
            Reply::Respond(Response::ok("<html>v2</html>")),
        );
        let request = Request::get("https://app.example/app.html").unwrap();

        let first = engine.on_request(request.clone()).await.unwrap();
        assert_eq!(first.into_response().unwrap().text(), "<html></html>");

        engine.settle().await;
        assert_eq!(engine.pending_revalidations().await, 0);

        let second = engine.on_request(request).await.unwrap();
        assert_eq!(second.into_response().unwrap().text(), "<html>v2</html>");
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_entry() {
        let fetcher = ScriptedFetcher::new();
        let engine = active_engine(fetcher.clone()).await;
        let request = Request::get("https://app.example/manifest.json").unwrap();

        fetcher.script("https://app.example/manifest.json", Reply::Fail);
        engine.on_request(request.clone()).await.unwrap();
        engine.settle().await;

        fetcher.script(
            "https://app.example/manifest.json",
            Reply::Respond(Response::new(503, "busy")),
        );
        engine.on_request(request.clone()).await.unwrap();
        engine.settle().await;

        let entry = engine.current_generation().await.get(&request).await.unwrap();
        assert_eq!(entry.response.text(), "{}");
    }

    #[tokio::test]
    async fn test_expired_entry_is_treated_as_miss() {
        let fetcher = ScriptedFetcher::new();
        script_manifest(&fetcher);
        let mut config = test_config();
        config.cache.max_entry_age_secs = Some(60);

        let request = Request::get("https://app.example/app.html").unwrap();
        let mut stale = CachedEntry::new(&request, Response::ok("stale"));
        stale.stored_at = Utc::now() - chrono::Duration::minutes(5);
        let mut snapshot = StorageSnapshot::default();
        snapshot
            .generations
            .insert(config.cache.version_tag.clone(), vec![stale]);

        let engine = FetchInterceptionEngine::builder(config)
            .fetcher(fetcher)
            .storage(CacheStorage::from_snapshot(snapshot))
            .build()
            .unwrap();

        let response = engine
            .on_request(request.clone())
            .await
            .unwrap()
            .into_response()
            .unwrap();
        assert_eq!(response.text(), "<html></html>");
        assert_eq!(engine.pending_revalidations().await, 0);

        let entry = engine.current_generation().await.get(&request).await.unwrap();
        assert_eq!(entry.response.text(), "<html></html>");
    }

    #[tokio::test]
    async fn test_mock_fetcher_called_once_for_live_data() {
        let mut mock = MockFetcher::new();
        mock.expect_fetch()
            .with(always())
            .times(1)
            .returning(|_| Ok(Response::ok(r#"{"data":[]}"#)));

        let engine = FetchInterceptionEngine::builder(test_config())
            .fetcher(Arc::new(mock))
            .build()
            .unwrap();

        let interception = engine
            .on_request(Request::get("https://api.binance.com/api/v3/ticker/price").unwrap())
            .await
            .unwrap();
        tokio_test::assert_ok!(interception.into_response().unwrap().json::<serde_json::Value>());
    }
}
