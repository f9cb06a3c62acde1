//! On-disk persistence of cache generations.

use super::CachedEntry;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Serializable copy of a [`super::CacheStorage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    pub generations: BTreeMap<String, Vec<CachedEntry>>,
}

impl StorageSnapshot {
    /// Read a snapshot, or an empty one if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No cache snapshot at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read(path)?;
        let snapshot: Self = serde_json::from_slice(&content)?;
        info!(
            "Loaded {} cache generation(s) from {}",
            snapshot.generations.len(),
            path.display()
        );
        Ok(snapshot)
    }

    /// Write the snapshot, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec(self)?)?;
        debug!("Saved cache snapshot to {}", path.display());
        Ok(())
    }
}
