//! Durable key/value storage for the four collections and the volume scalar.
//!
//! The in-memory stores are the source of truth; this layer is write-through
//! with no cache of its own. Loads never fail: anything missing or unparsable
//! comes back as an empty collection.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::song::{Playlist, Song};

pub const FAVORITES_KEY: &str = "groovewave_favorites";
pub const PLAYLISTS_KEY: &str = "groovewave_playlists";
pub const RECENT_KEY: &str = "groovewave_recent";
pub const SEARCH_HISTORY_KEY: &str = "groovewave_search_history";
pub const VOLUME_KEY: &str = "groovewave_volume";

pub const DEFAULT_VOLUME: f32 = 1.0;

/// get/set/remove contract over string values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// One `<key>.json` file per key inside `dir`.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Typed, cloneable handle over a `KeyValueStore`.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn load_favorites(&self) -> Vec<Song> {
        self.load_json(FAVORITES_KEY)
    }

    pub fn save_favorites(&self, favorites: &[Song]) {
        self.save_json(FAVORITES_KEY, &favorites);
    }

    pub fn load_playlists(&self) -> Vec<Playlist> {
        self.load_json(PLAYLISTS_KEY)
    }

    pub fn save_playlists(&self, playlists: &[Playlist]) {
        self.save_json(PLAYLISTS_KEY, &playlists);
    }

    pub fn load_recent(&self) -> Vec<Song> {
        self.load_json(RECENT_KEY)
    }

    pub fn save_recent(&self, recent: &[Song]) {
        self.save_json(RECENT_KEY, &recent);
    }

    pub fn load_search_history(&self) -> Vec<String> {
        self.load_json(SEARCH_HISTORY_KEY)
    }

    pub fn save_search_history(&self, terms: &[String]) {
        self.save_json(SEARCH_HISTORY_KEY, &terms);
    }

    pub fn clear_search_history(&self) {
        if let Err(e) = self.store.remove(SEARCH_HISTORY_KEY) {
            warn!("[persist] failed to remove {}: {}", SEARCH_HISTORY_KEY, e);
        }
    }

    pub fn load_volume(&self) -> f32 {
        let raw = match self.store.get(VOLUME_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return DEFAULT_VOLUME,
            Err(e) => {
                warn!("[persist] failed to read {}: {}", VOLUME_KEY, e);
                return DEFAULT_VOLUME;
            }
        };
        match raw.trim().parse::<f32>() {
            Ok(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => {
                debug!("[persist] ignoring malformed volume {:?}", raw);
                DEFAULT_VOLUME
            }
        }
    }

    pub fn save_volume(&self, volume: f32) {
        let v = volume.clamp(0.0, 1.0);
        if let Err(e) = self.store.set(VOLUME_KEY, &v.to_string()) {
            warn!("[persist] failed to write {}: {}", VOLUME_KEY, e);
        }
    }

    fn load_json<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!("[persist] failed to read {}: {}", key, e);
                return T::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("[persist] {} is corrupt, treating as empty: {}", key, e);
            T::default()
        })
    }

    // Fire-and-forget: a failed write is logged and the in-memory state stays authoritative.
    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("[persist] failed to encode {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key, &json) {
            warn!("[persist] failed to write {}: {}", key, e);
        }
    }
}
