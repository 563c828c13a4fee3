use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::analysis::{AnalyticsEvent, TrackedItem};

pub const WATCHLIST_KEY: &str = "pg_v10_tracked";
pub const ANALYTICS_KEY: &str = "pg_v10_analytics";

/// Client-local persisted collection. Read once at startup, rewritten wholesale on every mutation.
pub trait CollectionStore<T>: Send {
    fn load(&self) -> anyhow::Result<Vec<T>>;
    fn save(&self, items: &[T]) -> anyhow::Result<()>;
}

/// One JSON array per file, named after the collection key.
#[derive(Debug, Clone)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn for_key(data_dir: &Path, key: &str) -> Self {
        Self::new(data_dir.join(format!("{key}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn watchlist_store(data_dir: &Path) -> JsonFileStore<TrackedItem> {
    JsonFileStore::for_key(data_dir, WATCHLIST_KEY)
}

pub fn analytics_store(data_dir: &Path) -> JsonFileStore<AnalyticsEvent> {
    JsonFileStore::for_key(data_dir, ANALYTICS_KEY)
}

impl<T> CollectionStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> anyhow::Result<Vec<T>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed reading {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Vec<T>>(&raw) {
            Ok(items) => Ok(items),
            Err(err) => {
                warn!(
                    "ignoring unreadable collection {}: {err}",
                    self.path.display()
                );
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, items: &[T]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(items)?)
            .with_context(|| format!("failed writing {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory collection. Clones share the same backing vector.
#[derive(Debug)]
pub struct MemoryStore<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> MemoryStore<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }
}

impl<T: Clone + Send> CollectionStore<T> for MemoryStore<T> {
    fn load(&self) -> anyhow::Result<Vec<T>> {
        let items = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(items.clone())
    }

    fn save(&self, items: &[T]) -> anyhow::Result<()> {
        let mut stored = self
            .items
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        *stored = items.to_vec();
        Ok(())
    }
}
