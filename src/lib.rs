//! # visor-cache - fetch interception for the Visor Crypto client
//!
//! A versioned response cache that sits in front of the client's outbound
//! HTTP traffic, in the manner of a PWA service worker.
//!
//! ## Architecture
//!
//! - **Engine**: install/activate lifecycle and per-request fetch strategies
//! - **Classifier**: maps a request to live-data, transport-exempt or cacheable-asset
//! - **Cache**: named cache generations and snapshot persistence
//! - **HTTP**: request/response types and the network fetcher seam
//! - **Notify**: push payload relay
//! - **Events**: host adapter driving the engine over a channel
//! - **Config**: configuration management

pub mod cache;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod notify;

pub use cache::{CacheGeneration, CacheStorage};
pub use classifier::{Classifier, RequestClass};
pub use config::Config;
pub use engine::{EngineBuilder, FetchInterceptionEngine, Interception, LifecycleState};
pub use error::{Error, Result};
pub use events::{EngineHandle, EventLoop, LifecycleEvent};
pub use http::{Fetcher, HttpFetcher, Method, Request, Response};
