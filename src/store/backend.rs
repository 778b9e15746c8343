use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Durable store for the serialized listing mapping
///
/// The whole `id -> Listing` mapping lives in one durable record; the
/// backend only moves the serialized blob. Failures propagate to the
/// caller untouched — no retries, no swallowing.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Load the serialized mapping, `None` if nothing was ever saved
    async fn load(&self) -> Result<Option<String>>;

    /// Persist the serialized mapping, replacing the previous record
    async fn save(&self, payload: &str) -> Result<()>;
}

/// File-backed storage: one JSON file holds the entire mapping
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StoreBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, payload: &str) -> Result<()> {
        tokio::fs::write(&self.path, payload)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!("Persisted listing mapping to {}", self.path.display());
        Ok(())
    }
}

/// In-memory backend for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryBackend {
    record: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `save` was called, for write-avoidance assertions
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.record.lock().expect("backend lock poisoned").clone())
    }

    async fn save(&self, payload: &str) -> Result<()> {
        *self.record.lock().expect("backend lock poisoned") = Some(payload.to_string());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
