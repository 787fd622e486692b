//! HistoryLog - Analysis History Persistence
//!
//! ## Responsibilities
//!
//! - Append-only record of analysis results with their source image
//! - Lookup by id, oldest-first listing, clear-all
//! - `history.json` index + `images/<id>.jpg` under the history directory
//!
//! Entries are never mutated or evicted; the log grows until cleared.

use crate::ai_client::AnalysisVerdict;
use crate::error::{Error, Result};
use crate::status_aggregator::PrintStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

const INDEX_FILE: &str = "history.json";
const IMAGE_DIR: &str = "images";

/// One recorded analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub verdict: AnalysisVerdict,
    /// Print status at time of capture
    pub print_status: PrintStatus,
    /// Image path relative to the history directory
    pub image_ref: Option<String>,
    pub image_size: u64,
}

/// HistoryLog instance
pub struct HistoryLog {
    dir: PathBuf,
    entries: RwLock<Vec<HistoryEntry>>,
    next_id: AtomicU64,
    /// Serializes appends and clears, including their image files
    persist: Mutex<()>,
}

impl HistoryLog {
    /// Open (or create) the log under `dir`, reloading a previous index
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(IMAGE_DIR)).await?;

        let entries = load_index(&dir.join(INDEX_FILE)).await;
        let next_id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;

        tracing::info!(
            dir = %dir.display(),
            entries = entries.len(),
            "History log opened"
        );

        Ok(Self {
            dir,
            entries: RwLock::new(entries),
            next_id: AtomicU64::new(next_id),
            persist: Mutex::new(()),
        })
    }

    /// Record one analysis and its image
    pub async fn append(
        &self,
        verdict: AnalysisVerdict,
        print_status: PrintStatus,
        image: Option<&[u8]>,
    ) -> Result<HistoryEntry> {
        // Image write and index push are ordered against clear()
        let _persist = self.persist.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let (image_ref, image_size) = match image {
            Some(data) => {
                let rel = format!("{}/{}.jpg", IMAGE_DIR, id);
                fs::write(self.dir.join(&rel), data).await?;
                (Some(rel), data.len() as u64)
            }
            None => (None, 0),
        };

        let entry = HistoryEntry {
            id,
            timestamp: verdict.analyzed_at,
            verdict,
            print_status,
            image_ref,
            image_size,
        };

        self.entries.write().await.push(entry.clone());
        self.write_index().await?;

        tracing::debug!(
            id = id,
            binary_status = entry.verdict.binary_status,
            image_size = image_size,
            "History entry appended"
        );

        Ok(entry)
    }

    /// All entries, oldest first
    pub async fn list(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    /// Entry by id
    pub async fn get(&self, id: u64) -> Result<HistoryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("History entry {}", id)))
    }

    /// Stored image bytes of an entry
    pub async fn get_image(&self, id: u64) -> Result<Vec<u8>> {
        let entry = self.get(id).await?;
        let rel = entry
            .image_ref
            .ok_or_else(|| Error::NotFound(format!("History entry {} has no image", id)))?;

        match fs::read(self.dir.join(rel)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Image for history entry {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove all entries and their images
    pub async fn clear(&self) -> Result<usize> {
        let _persist = self.persist.lock().await;
        let removed = {
            let mut entries = self.entries.write().await;
            let n = entries.len();
            entries.clear();
            n
        };

        let images = self.dir.join(IMAGE_DIR);
        match fs::remove_dir_all(&images).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&images).await?;
        self.write_index().await?;

        tracing::info!(removed = removed, "History cleared");
        Ok(removed)
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Caller holds `persist`
    async fn write_index(&self) -> Result<()> {
        let json = {
            let entries = self.entries.read().await;
            serde_json::to_vec_pretty(&*entries)?
        };

        let path = self.dir.join(INDEX_FILE);
        let tmp = self.dir.join(format!("{}.tmp", INDEX_FILE));
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

async fn load_index(path: &Path) -> Vec<HistoryEntry> {
    let raw = match fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read history index");
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Vec<HistoryEntry>>(&raw) {
        Ok(mut entries) => {
            entries.sort_by_key(|e| e.id);
            entries
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Malformed history index, starting empty"
            );
            Vec::new()
        }
    }
}
