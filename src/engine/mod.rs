//! Fetch interception engine.
//!
//! The engine owns the cache storage and reacts to host lifecycle events:
//!
//! - `on_install` precaches the static asset manifest into the current generation
//! - `on_activate` evicts every other generation and claims open clients
//! - `on_request` classifies a request and applies its fetch strategy
//! - `on_push` / `on_sync` handle out-of-band events
//!
//! ```text
//! uninstalled -> installing -> installed -> activating -> active
//!                    |  ^
//!                    v  | (retry)
//!              install-failed
//! ```

mod dispatcher;
mod lifecycle;

pub use dispatcher::Interception;
pub use lifecycle::{ActivationReport, ClientId, InstallReport};

use crate::cache::{CacheGeneration, CacheStorage};
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::Result;
use crate::http::{Fetcher, HttpFetcher};
use crate::notify::{LogNotifier, Notification, NotificationRelay, Notifier};
use lifecycle::ClientRegistry;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Uninstalled,
    Installing,
    Installed,
    InstallFailed,
    Activating,
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::InstallFailed => "install-failed",
            Self::Activating => "activating",
            Self::Active => "active",
        })
    }
}

/// Builder for creating an engine.
pub struct EngineBuilder {
    config: Config,
    fetcher: Option<Arc<dyn Fetcher>>,
    storage: Option<CacheStorage>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl EngineBuilder {
    /// Create a new builder with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: None,
            storage: None,
            notifier: None,
        }
    }

    /// Use a custom network fetcher instead of the reqwest one.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Start from an existing storage (e.g. restored from a snapshot).
    pub fn storage(mut self, storage: CacheStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set where push notifications are displayed.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the engine.
    pub fn build(self) -> Result<FetchInterceptionEngine> {
        self.config.validate()?;

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&self.config.network)?),
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        Ok(FetchInterceptionEngine {
            classifier: Classifier::new(&self.config.classifier),
            relay: NotificationRelay::new(self.config.notifications.clone(), notifier),
            storage: self.storage.unwrap_or_default(),
            fetcher,
            config: self.config,
            state: RwLock::new(LifecycleState::Uninstalled),
            clients: RwLock::new(ClientRegistry::default()),
            revalidations: Mutex::new(JoinSet::new()),
        })
    }
}

/// Intercepts requests and manages the versioned response cache.
pub struct FetchInterceptionEngine {
    /// Configuration.
    config: Config,
    /// All cache generations.
    storage: CacheStorage,
    /// Network access.
    fetcher: Arc<dyn Fetcher>,
    /// Request classifier.
    classifier: Classifier,
    /// Push notification relay.
    relay: NotificationRelay,
    /// Current lifecycle state.
    state: RwLock<LifecycleState>,
    /// Known client sessions.
    clients: RwLock<ClientRegistry>,
    /// Background revalidation tasks.
    revalidations: Mutex<JoinSet<()>>,
}

impl FetchInterceptionEngine {
    /// Build an engine with the reqwest fetcher and log notifier.
    pub fn new(config: Config) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Name of the current cache generation.
    pub fn version_tag(&self) -> &str {
        &self.config.cache.version_tag
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the cache storage.
    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Open the current generation.
    pub async fn current_generation(&self) -> CacheGeneration {
        self.storage.open(self.version_tag()).await
    }

    /// Handle a push event. Only an active engine displays notifications.
    pub async fn on_push(&self, payload: Option<&[u8]>) -> Option<Notification> {
        let state = self.state().await;
        if state != LifecycleState::Active {
            debug!("Push event ignored while {}", state);
            return None;
        }
        self.relay.relay(payload)
    }

    /// Handle a background-sync event. Logged only.
    pub fn on_sync(&self, tag: &str) {
        info!("Sync event: {}", tag);
    }

    async fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.write().await;
        debug!("Lifecycle {} -> {}", *state, next);
        *state = next;
    }
}

impl fmt::Debug for FetchInterceptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchInterceptionEngine")
            .field("version_tag", &self.version_tag())
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::http::{Request, Response};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// What a scripted fetcher does for a URL.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Respond(Response),
        Fail,
        Hang,
    }

    /// Fetcher answering from a per-URL script and counting calls.
    #[derive(Debug, Default)]
    pub struct ScriptedFetcher {
        replies: StdMutex<HashMap<String, Reply>>,
        calls: StdMutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn script(&self, url: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .insert(url.to_string(), reply);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push(url.clone());
            let reply = self.replies.lock().unwrap().get(&url).cloned();
            match reply {
                Some(Reply::Respond(response)) => Ok(response),
                Some(Reply::Hang) => std::future::pending().await,
                Some(Reply::Fail) | None => {
                    Err(crate::Error::network(format!("connection refused: {}", url)))
                }
            }
        }
    }

    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.cache.origin = "https://app.example/".to_string();
        config.cache.static_assets = vec!["/app.html".to_string(), "/manifest.json".to_string()];
        config.network.live_data_timeout_secs = 1;
        config
    }

    pub fn engine_with(fetcher: Arc<ScriptedFetcher>) -> FetchInterceptionEngine {
        FetchInterceptionEngine::builder(test_config())
            .fetcher(fetcher)
            .build()
            .unwrap()
    }

    pub fn script_manifest(fetcher: &ScriptedFetcher) {
        fetcher.script(
            "https://app.example/app.html",
            Reply::Respond(Response::ok("<html></html>")),
        );
        fetcher.script(
            "https://app.example/manifest.json",
            Reply::Respond(Response::ok("{}")),
        );
    }
}
