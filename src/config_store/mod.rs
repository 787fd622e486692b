//! ConfigStore - AI and monitoring settings
//!
//! ## Responsibilities
//!
//! - Load `ai_config.json` (prompt, sampling, timeouts, interval bounds, keywords)
//! - Fall back to defaults on missing or malformed files
//! - Runtime reload

mod types;

pub use types::*;

use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// ConfigStore instance
pub struct ConfigStore {
    path: PathBuf,
    /// In-memory copy for frequent reads
    cache: RwLock<AiConfig>,
}

impl ConfigStore {
    /// Load configuration from `path`, falling back to defaults
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = read_config(&path).await;

        Self {
            path,
            cache: RwLock::new(config),
        }
    }

    /// Store holding a fixed configuration (no backing file)
    pub fn with_config(config: AiConfig) -> Self {
        Self {
            path: PathBuf::new(),
            cache: RwLock::new(config.sanitized()),
        }
    }

    /// Current configuration
    pub async fn get(&self) -> AiConfig {
        self.cache.read().await.clone()
    }

    /// Re-read the backing file
    pub async fn reload(&self) -> AiConfig {
        if self.path.as_os_str().is_empty() {
            return self.get().await;
        }

        let config = read_config(&self.path).await;
        *self.cache.write().await = config.clone();
        tracing::info!(path = %self.path.display(), "AI configuration reloaded");
        config
    }
}

async fn read_config(path: &Path) -> AiConfig {
    if path.as_os_str().is_empty() {
        return AiConfig::default();
    }

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "AI config not found, using defaults");
            return AiConfig::default();
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read AI config, using defaults"
            );
            return AiConfig::default();
        }
    };

    match serde_json::from_str::<AiConfig>(&raw) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "AI configuration loaded");
            config.sanitized()
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Malformed AI config, using defaults"
            );
            AiConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(dir.path().join("ai_config.json")).await;
        assert_eq!(store.get().await, AiConfig::default());
    }

    #[tokio::test]
    async fn test_malformed_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai_config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let store = ConfigStore::load(&path).await;
        assert_eq!(store.get().await, AiConfig::default());
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai_config.json");
        tokio::fs::write(&path, r#"{"analysis_settings":{"retry_attempts":1}}"#)
            .await
            .unwrap();

        let store = ConfigStore::load(&path).await;
        assert_eq!(store.get().await.analysis_settings.retry_attempts, 1);

        tokio::fs::write(&path, r#"{"analysis_settings":{"retry_attempts":5}}"#)
            .await
            .unwrap();
        let reloaded = store.reload().await;
        assert_eq!(reloaded.analysis_settings.retry_attempts, 5);
        assert_eq!(store.get().await.analysis_settings.retry_attempts, 5);
    }
}
