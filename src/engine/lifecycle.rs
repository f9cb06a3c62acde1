//! Install and activate handling.

use super::{FetchInterceptionEngine, LifecycleState};
use crate::error::{Error, Result};
use crate::http::{Method, Request, Response};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Identifier of a client session routed through the engine.
pub type ClientId = Uuid;

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Generation that was populated.
    pub generation: String,
    /// Cache keys written, in manifest order.
    pub precached: Vec<String>,
}

/// Outcome of a successful activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stale generations removed.
    pub evicted: Vec<String>,
    /// Number of client sessions now controlled.
    pub claimed: usize,
}

/// Client sessions known to the engine.
#[derive(Debug, Default)]
pub(super) struct ClientRegistry {
    connected: BTreeSet<ClientId>,
    controlled: BTreeSet<ClientId>,
}

impl FetchInterceptionEngine {
    /// Precache the static asset manifest into the current generation.
    ///
    /// All manifest entries are fetched concurrently. Nothing is written
    /// unless every one of them succeeds with a 2xx status; otherwise the
    /// engine moves to `install-failed` and the install may be retried.
    pub async fn on_install(&self) -> Result<InstallReport> {
        {
            let mut state = self.state.write().await;
            match *state {
                LifecycleState::Uninstalled | LifecycleState::InstallFailed => {
                    *state = LifecycleState::Installing;
                }
                other => {
                    return Err(Error::lifecycle(format!("cannot install while {}", other)));
                }
            }
        }

        info!("Installing cache generation {}", self.version_tag());

        match self.precache().await {
            Ok(report) => {
                self.set_state(LifecycleState::Installed).await;
                info!(
                    "Installed {} with {} asset(s)",
                    report.generation,
                    report.precached.len()
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(LifecycleState::InstallFailed).await;
                warn!("Install failed: {}", e);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<InstallReport> {
        let origin = self.config.cache.origin_url()?;
        let requests = self
            .config
            .cache
            .manifest()
            .iter()
            .map(|entry| -> Result<Request> { Ok(Request::new(Method::Get, origin.join(entry)?)) })
            .collect::<Result<Vec<Request>>>()?;

        let results = join_all(requests.iter().map(|req| self.fetcher.fetch(req))).await;

        let mut fetched: Vec<(Request, Response)> = Vec::with_capacity(requests.len());
        let mut failed = Vec::new();
        for (request, result) in requests.into_iter().zip(results) {
            match result {
                Ok(response) if response.is_success() => fetched.push((request, response)),
                Ok(response) => {
                    warn!("Precache {} returned {}", request.url, response.status);
                    failed.push(request.url.to_string());
                }
                Err(e) => {
                    warn!("Precache {} failed: {}", request.url, e);
                    failed.push(request.url.to_string());
                }
            }
        }

        if !failed.is_empty() {
            return Err(Error::Install { failed });
        }

        let precached = fetched.iter().map(|(req, _)| req.cache_key()).collect();
        let generation = self.current_generation().await;
        generation.put_all(fetched).await;

        Ok(InstallReport {
            generation: generation.name().to_string(),
            precached,
        })
    }

    /// Evict stale generations and take control of open client sessions.
    ///
    /// Eviction completes before the engine reports itself active.
    pub async fn on_activate(&self) -> Result<ActivationReport> {
        {
            let mut state = self.state.write().await;
            match *state {
                LifecycleState::Installed => *state = LifecycleState::Activating,
                LifecycleState::Active => return Ok(ActivationReport::default()),
                other => {
                    return Err(Error::lifecycle(format!("cannot activate while {}", other)));
                }
            }
        }

        let mut evicted = Vec::new();
        for name in self.storage.keys().await {
            if name != self.version_tag() && self.storage.delete(&name).await {
                info!("Removed stale cache generation {}", name);
                evicted.push(name);
            }
        }
        self.current_generation().await;

        let claimed = {
            let mut clients = self.clients.write().await;
            clients.controlled = clients.connected.clone();
            clients.controlled.len()
        };

        self.set_state(LifecycleState::Active).await;
        info!(
            "Activated {} (evicted {}, claimed {} client(s))",
            self.version_tag(),
            evicted.len(),
            claimed
        );

        Ok(ActivationReport { evicted, claimed })
    }

    /// Register a client session. An active engine controls it immediately.
    pub async fn connect_client(&self) -> ClientId {
        let id = Uuid::new_v4();
        let active = self.state().await == LifecycleState::Active;
        let mut clients = self.clients.write().await;
        clients.connected.insert(id);
        if active {
            clients.controlled.insert(id);
        }
        id
    }

    pub async fn disconnect_client(&self, id: ClientId) {
        let mut clients = self.clients.write().await;
        clients.connected.remove(&id);
        clients.controlled.remove(&id);
    }

    /// Whether requests from this client are routed through the engine.
    pub async fn controls(&self, id: ClientId) -> bool {
        self.clients.read().await.controlled.contains(&id)
    }
}
