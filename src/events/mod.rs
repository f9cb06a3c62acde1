//! Host adapter for the interception engine.
//!
//! A host runtime turns its own event source into [`LifecycleEvent`]s and
//! sends them over a channel; the [`EventLoop`] drains that channel and
//! dispatches each event to the engine.

mod handle;

pub use handle::EngineHandle;

use crate::engine::{ActivationReport, ClientId, FetchInterceptionEngine, InstallReport, Interception};
use crate::error::Result;
use crate::http::Request;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Events delivered by the host runtime.
#[derive(Debug)]
pub enum LifecycleEvent {
    /// Precache the manifest.
    Install {
        reply: oneshot::Sender<Result<InstallReport>>,
    },
    /// Evict stale generations and claim clients.
    Activate {
        reply: oneshot::Sender<Result<ActivationReport>>,
    },
    /// Intercept an outbound request.
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<Interception>>,
    },
    /// Push message with an optional payload.
    Push(Option<Vec<u8>>),
    /// Background-sync trigger.
    Sync(String),
    /// A new client session opened.
    Connect { reply: oneshot::Sender<ClientId> },
    /// A client session closed.
    Disconnect(ClientId),
    /// Finish outstanding work and stop the loop.
    Shutdown,
}

/// Dispatches host events to an engine.
pub struct EventLoop {
    engine: Arc<FetchInterceptionEngine>,
    event_tx: mpsc::UnboundedSender<LifecycleEvent>,
    event_rx: mpsc::UnboundedReceiver<LifecycleEvent>,
}

impl EventLoop {
    /// Create a new event loop around an engine.
    pub fn new(engine: Arc<FetchInterceptionEngine>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            event_tx,
            event_rx,
        }
    }

    /// Get a sender for raw events.
    pub fn sender(&self) -> mpsc::UnboundedSender<LifecycleEvent> {
        self.event_tx.clone()
    }

    /// Get a typed handle for driving the engine.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.event_tx.clone())
    }

    /// Start the loop on the runtime.
    ///
    /// Lifecycle events are handled in arrival order. Each fetch runs in its
    /// own task so a slow network call never holds up other requests.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let Self {
            engine,
            event_tx,
            mut event_rx,
        } = self;
        // The loop must end once every external sender is gone.
        drop(event_tx);

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if !Self::dispatch(&engine, event).await {
                    break;
                }
            }
            engine.settle().await;
            info!("Event loop stopped");
        })
    }

    /// Handle one event. Returns `false` when the loop should stop.
    async fn dispatch(engine: &Arc<FetchInterceptionEngine>, event: LifecycleEvent) -> bool {
        match event {
            LifecycleEvent::Install { reply } => {
                let result = engine.on_install().await;
                if result.is_ok() && engine.config().lifecycle.skip_waiting {
                    debug!("Skipping wait, activating immediately");
                    if let Err(e) = engine.on_activate().await {
                        warn!("Activation after install failed: {}", e);
                    }
                }
                let _ = reply.send(result);
            }
            LifecycleEvent::Activate { reply } => {
                let _ = reply.send(engine.on_activate().await);
            }
            LifecycleEvent::Fetch { request, reply } => {
                let engine = Arc::clone(engine);
                tokio::spawn(async move {
                    let _ = reply.send(engine.on_request(request).await);
                });
            }
            LifecycleEvent::Push(payload) => {
                engine.on_push(payload.as_deref()).await;
            }
            LifecycleEvent::Sync(tag) => engine.on_sync(&tag),
            LifecycleEvent::Connect { reply } => {
                let _ = reply.send(engine.connect_client().await);
            }
            LifecycleEvent::Disconnect(id) => engine.disconnect_client(id).await,
            LifecycleEvent::Shutdown => return false,
        }
        true
    }
}
