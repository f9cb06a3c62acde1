//! Typed handle for sending events to a running [`super::EventLoop`].

use super::LifecycleEvent;
use crate::engine::{ActivationReport, ClientId, InstallReport, Interception};
use crate::error::{Error, Result};
use crate::http::Request;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Cloneable front for a running event loop.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    event_tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl EngineHandle {
    pub fn new(event_tx: mpsc::UnboundedSender<LifecycleEvent>) -> Self {
        Self { event_tx }
    }

    /// Send a raw event.
    pub fn dispatch(&self, event: LifecycleEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|e| Error::channel(e.to_string()))
    }

    pub async fn install(&self) -> Result<InstallReport> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(LifecycleEvent::Install { reply })?;
        Self::receive(rx).await?
    }

    pub async fn activate(&self) -> Result<ActivationReport> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(LifecycleEvent::Activate { reply })?;
        Self::receive(rx).await?
    }

    /// Install, then activate unless the loop already does so after install.
    ///
    /// A recoverable failure (an asset that could not be precached, a network
    /// outage) is logged and yields `Ok(None)`: the engine stays in
    /// `install-failed` and keeps serving from whatever generation it holds.
    pub async fn start_up(&self, skip_waiting: bool) -> Result<Option<InstallReport>> {
        let started = async {
            let report = self.install().await?;
            if !skip_waiting {
                self.activate().await?;
            }
            Ok::<InstallReport, Error>(report)
        };

        match started.await {
            Ok(report) => Ok(Some(report)),
            Err(e) if e.is_recoverable() => {
                warn!("Install did not complete, serving existing cache: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Route a request through the engine.
    pub async fn fetch(&self, request: Request) -> Result<Interception> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(LifecycleEvent::Fetch { request, reply })?;
        Self::receive(rx).await?
    }

    pub async fn connect(&self) -> Result<ClientId> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(LifecycleEvent::Connect { reply })?;
        Self::receive(rx).await
    }

    pub fn disconnect(&self, id: ClientId) -> Result<()> {
        self.dispatch(LifecycleEvent::Disconnect(id))
    }

    pub fn push(&self, payload: Option<Vec<u8>>) -> Result<()> {
        self.dispatch(LifecycleEvent::Push(payload))
    }

    pub fn sync(&self, tag: impl Into<String>) -> Result<()> {
        self.dispatch(LifecycleEvent::Sync(tag.into()))
    }

    /// Ask the loop to finish outstanding revalidations and stop.
    pub fn shutdown(&self) -> Result<()> {
        self.dispatch(LifecycleEvent::Shutdown)
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|_| Error::channel("event loop dropped the reply"))
    }
}
