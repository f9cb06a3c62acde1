//! Configuration settings for visor-cache.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache generation and precache manifest.
    pub cache: CacheConfig,
    /// Request classification rules.
    pub classifier: ClassifierConfig,
    /// Network fetch settings.
    pub network: NetworkConfig,
    /// Install/activate behavior.
    pub lifecycle: LifecycleConfig,
    /// Push notification defaults.
    pub notifications: NotificationConfig,
}

impl Config {
    /// Load configuration from file, returning default if file doesn't exist.
    pub fn load_or_default() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from file.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self =
                toml::from_str(&content).map_err(|e| Error::config(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self, path: Option<PathBuf>) -> Result<()> {
        let config_path = path.unwrap_or_else(Self::default_path);

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.version_tag.trim().is_empty() {
            return Err(Error::config("cache.version_tag must not be empty"));
        }
        if self.network.live_data_timeout_secs == 0 {
            return Err(Error::config(
                "network.live_data_timeout_secs must be greater than zero",
            ));
        }
        self.cache.origin_url()?;
        Ok(())
    }

    fn default_path() -> PathBuf {
        super::config_dir()
            .map(|p| p.join("config.toml"))
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the current cache generation. Changing it evicts older ones on activate.
    pub version_tag: String,
    /// Base URL that relative manifest entries are resolved against.
    pub origin: String,
    /// Resources precached at install, in order.
    pub static_assets: Vec<String>,
    /// Third-party stylesheets/fonts that may be precached alongside.
    pub cdn_assets: Vec<String>,
    /// Precache `cdn_assets` together with `static_assets`.
    pub precache_cdn_assets: bool,
    /// Treat entries older than this as missing (unset = never expire).
    pub max_entry_age_secs: Option<u64>,
    /// Where the host persists cache generations between runs
    /// (unset = `cache.json` in the platform data directory).
    pub snapshot_path: Option<PathBuf>,
}

impl CacheConfig {
    /// Parse the configured origin.
    pub fn origin_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.origin)?)
    }

    /// The full install manifest: static assets, then CDN assets when enabled.
    pub fn manifest(&self) -> Vec<String> {
        let mut manifest = self.static_assets.clone();
        if self.precache_cdn_assets {
            manifest.extend(self.cdn_assets.iter().cloned());
        }
        manifest
    }

    /// The snapshot file to restore from and save to.
    pub fn snapshot_file(&self) -> Option<PathBuf> {
        self.snapshot_path
            .clone()
            .or_else(|| super::data_dir().ok().map(|dir| dir.join("cache.json")))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version_tag: "visor-crypto-v1".to_string(),
            origin: "http://localhost:8080/".to_string(),
            static_assets: vec![
                "./tradebot-mobile.html".to_string(),
                "./manifest.json".to_string(),
            ],
            cdn_assets: vec![
                "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css"
                    .to_string(),
            ],
            precache_cdn_assets: false,
            max_entry_age_secs: None,
            snapshot_path: None,
        }
    }
}

/// Request classification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Hosts serving volatile data (prices, news, sentiment, translation, previews).
    pub live_data_hosts: Vec<String>,
    /// URL schemes of persistent streaming transports.
    pub streaming_schemes: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            live_data_hosts: vec![
                "binance.com".to_string(),
                "coingecko.com".to_string(),
                "cryptopanic.com".to_string(),
                "alternative.me".to_string(),
                "microlink.io".to_string(),
                "translate.googleapis.com".to_string(),
            ],
            streaming_schemes: vec!["ws".to_string(), "wss".to_string()],
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout for live-data fetches before falling back to the offline body.
    pub live_data_timeout_secs: u64,
    /// Timeout applied by the HTTP client to every request.
    pub request_timeout_secs: u64,
    /// User agent sent with outbound requests.
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            live_data_timeout_secs: 10,
            request_timeout_secs: 30,
            user_agent: concat!("visor-cache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Activate right after a successful install.
    pub skip_waiting: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { skip_waiting: true }
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Icon used when the push payload has none.
    pub default_icon: String,
    /// Badge used when the push payload has none.
    pub default_badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_icon: "./icon-192.png".to_string(),
            default_badge: "./icon-192.png".to_string(),
            vibrate: vec![200, 100, 200],
        }
    }
}
