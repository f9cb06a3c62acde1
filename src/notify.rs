//! Push notification relay.
//!
//! Decodes push payloads and hands them to a [`Notifier`]. A payload that is
//! missing or malformed is logged and ignored.

use crate::config::NotificationConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Wire shape of a push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub badge: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// A notification ready to be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub tag: Option<String>,
}

/// Displays notifications to the user.
pub trait Notifier: Send + Sync {
    fn show(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, notification: &Notification) -> Result<()> {
        info!(
            title = %notification.title,
            tag = ?notification.tag,
            "Notification: {}",
            notification.body
        );
        Ok(())
    }
}

/// Forwards notifications to a host UI over a channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn show(&self, notification: &Notification) -> Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|e| Error::channel(e.to_string()))
    }
}

/// Turns push payloads into displayed notifications.
#[derive(Clone)]
pub struct NotificationRelay {
    config: NotificationConfig,
    notifier: Arc<dyn Notifier>,
}

impl NotificationRelay {
    pub fn new(config: NotificationConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    /// Decode and display a payload. Returns the displayed notification, if any.
    pub fn relay(&self, payload: Option<&[u8]>) -> Option<Notification> {
        let Some(bytes) = payload else {
            warn!("Push event without payload ignored");
            return None;
        };

        let payload: PushPayload = match serde_json::from_slice(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Ignoring malformed push payload: {}", e);
                return None;
            }
        };

        let notification = self.build(payload);
        match self.notifier.show(&notification) {
            Ok(()) => Some(notification),
            Err(e) => {
                warn!("Failed to show notification: {}", e);
                None
            }
        }
    }

    fn build(&self, payload: PushPayload) -> Notification {
        Notification {
            title: payload.title,
            body: payload.body.unwrap_or_default(),
            icon: payload
                .icon
                .unwrap_or_else(|| self.config.default_icon.clone()),
            badge: payload
                .badge
                .unwrap_or_else(|| self.config.default_badge.clone()),
            vibrate: self.config.vibrate.clone(),
            tag: payload.tag,
        }
    }
}

impl std::fmt::Debug for NotificationRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRelay")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn channel_relay() -> (NotificationRelay, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = NotificationRelay::new(
            NotificationConfig::default(),
            Arc::new(ChannelNotifier::new(tx)),
        );
        (relay, rx)
    }

    #[test]
    fn test_relay_fills_defaults() {
        let (relay, mut rx) = channel_relay();
        let shown = relay
            .relay(Some(br#"{"title":"BTC alert","body":"BTC crossed 70k"}"#))
            .unwrap();

        assert_eq!(
            shown,
            Notification {
                title: "BTC alert".to_string(),
                body: "BTC crossed 70k".to_string(),
                icon: "./icon-192.png".to_string(),
                badge: "./icon-192.png".to_string(),
                vibrate: vec![200, 100, 200],
                tag: None,
            }
        );
        assert_eq!(rx.try_recv().unwrap(), shown);
    }

    #[test]
    fn test_relay_uses_payload_icon() {
        let (relay, _rx) = channel_relay();
        let shown = relay
            .relay(Some(br#"{"title":"t","icon":"/eth.png","tag":"signal"}"#))
            .unwrap();
        assert_eq!(shown.icon, "/eth.png");
        assert_eq!(shown.body, "");
        assert_eq!(shown.tag.as_deref(), Some("signal"));
    }

    #[test]
    fn test_malformed_payload_shows_nothing() {
        let (relay, mut rx) = channel_relay();
        assert!(relay.relay(Some(b"not json")).is_none());
        assert!(relay.relay(Some(br#"{"body":"no title"}"#)).is_none());
        assert!(relay.relay(None).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_absorbed() {
        let (relay, rx) = channel_relay();
        drop(rx);
        assert!(relay.relay(Some(br#"{"title":"t"}"#)).is_none());
    }

    #[test]
    fn test_log_notifier() {
        assert!(LogNotifier.show(&Notification {
            title: "t".to_string(),
            body: "b".to_string(),
            icon: String::new(),
            badge: String::new(),
            vibrate: vec![],
            tag: None,
        })
        .is_ok());
    }
}
