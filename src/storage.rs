//! Screenshot sinks: where published screenshot bytes are kept and served from

use crate::{is_safe_filename, ReaderError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Route prefix under which stored screenshots are retrievable.
pub const SCREENSHOT_ROUTE_PREFIX: &str = "/instant-screenshots";

const SCREENSHOT_DIR: &str = "instant-screenshots";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScreenshotSink: Send + Sync {
    /// Stores `bytes` and returns the opaque id they are retrievable under.
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ReaderError>;

    /// `Ok(None)` when nothing is stored under `id`.
    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, ReaderError>;
}

fn new_screenshot_id() -> String {
    format!("{}.png", Uuid::new_v4())
}

/// Public path of a stored screenshot.
pub fn screenshot_path(id: &str) -> String {
    format!("{SCREENSHOT_ROUTE_PREFIX}/{id}")
}

/// PNG files in `<root>/instant-screenshots`.
pub struct LocalScreenshotStore {
    dir: PathBuf,
}

impl LocalScreenshotStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(SCREENSHOT_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<(), ReaderError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ReaderError::Storage(format!("{}: {e}", self.dir.display())))
    }
}

#[async_trait]
impl ScreenshotSink for LocalScreenshotStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ReaderError> {
        self.ensure_dir().await?;

        let id = new_screenshot_id();
        let path = self.dir.join(&id);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ReaderError::Storage(format!("{}: {e}", path.display())))?;

        debug!(id = %id, size = bytes.len(), "Stored screenshot");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, ReaderError> {
        if !is_safe_filename(id) {
            return Ok(None);
        }

        match tokio::fs::read(self.dir.join(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReaderError::Storage(e.to_string())),
        }
    }
}

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryScreenshotStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryScreenshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ScreenshotSink for MemoryScreenshotStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ReaderError> {
        let id = new_screenshot_id();
        self.entries.insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<u8>>, ReaderError> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }
}
