use serde::{Deserialize, Serialize};
use std::{fs, io, path::PathBuf, sync::Arc};
use tokio::sync::{RwLock, watch};

use crate::geo::{DEFAULT_HALF_HEIGHT, DEFAULT_HALF_WIDTH};

/// Tunables for the location photo search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSettings {
    pub per_page: u32,
    /// Upper bound of the random result page requested per search.
    pub max_page: u32,
    pub bbox_half_width: f64,
    pub bbox_half_height: f64,
    pub safe_search: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            per_page: 21,
            max_page: 10,
            bbox_half_width: DEFAULT_HALF_WIDTH,
            bbox_half_height: DEFAULT_HALF_HEIGHT,
            safe_search: true,
        }
    }
}

struct SettingsStore {
    inner: RwLock<SearchSettings>,
    tx: watch::Sender<SearchSettings>,
    file_path: Option<PathBuf>,
}

#[derive(Clone)]
pub struct SharedSettings(Arc<SettingsStore>);

impl SharedSettings {
    /// Load from disk, writing the defaults first if the file is missing.
    pub fn load(file_path: &str) -> io::Result<Self> {
        let settings_path = PathBuf::from(file_path);

        let initial: SearchSettings = if settings_path.exists() {
            let toml = fs::read_to_string(&settings_path)?;
            toml::from_str(&toml).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        } else {
            let default = SearchSettings::default();
            let toml_str = toml::to_string_pretty(&default).map_err(io::Error::other)?;
            fs::write(&settings_path, toml_str)?;
            tracing::info!("wrote default search settings to {}", settings_path.display());
            default
        };

        Ok(Self::build(initial, Some(settings_path)))
    }

    /// Settings that live only in memory.
    pub fn in_memory(initial: SearchSettings) -> Self {
        Self::build(initial, None)
    }

    fn build(initial: SearchSettings, file_path: Option<PathBuf>) -> Self {
        let (tx, _) = watch::channel(initial.clone());
        SharedSettings(Arc::new(SettingsStore {
            inner: RwLock::new(initial),
            tx,
            file_path,
        }))
    }

    /// Get a snapshot of the current settings.
    pub async fn get(&self) -> SearchSettings {
        self.0.inner.read().await.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSettings> {
        self.0.tx.subscribe()
    }

    /// Mutate in memory and write back to disk atomically.
    pub async fn update<F>(&self, mutator: F) -> io::Result<SearchSettings>
    where
        F: FnOnce(&mut SearchSettings),
    {
        let mut guard = self.0.inner.write().await;
        let mut new = guard.clone();
        mutator(&mut new);

        if let Some(settings_path) = &self.0.file_path {
            let tmp = settings_path.with_extension("toml.tmp");
            let s = toml::to_string_pretty(&new).map_err(io::Error::other)?;
            fs::write(&tmp, s)?;
            fs::rename(&tmp, settings_path)?;
        }

        *guard = new.clone();
        let _ = self.0.tx.send(new.clone());
        Ok(new)
    }
}
