//! Persisted record of the last successful refresh.

use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::swap::atomic_write;
use crate::types::CacheIdentity;

/// Contents of `cache.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub git_uri: String,
    pub branch: String,
    /// Seconds since the epoch of the last successful refresh
    pub timestamp: f64,
}

impl CacheMetadata {
    /// A record stamped with the current time.
    pub fn now(identity: &CacheIdentity) -> Self {
        Self {
            git_uri: identity.git_uri.clone(),
            branch: identity.branch.clone(),
            timestamp: unix_now(),
        }
    }

    pub fn identity(&self) -> CacheIdentity {
        CacheIdentity::new(self.git_uri.clone(), self.branch.clone())
    }

    pub fn matches(&self, identity: &CacheIdentity) -> bool {
        self.git_uri == identity.git_uri && self.branch == identity.branch
    }

    /// Read the record at `path`; `None` if the cache was never refreshed.
    pub fn load(path: &Path) -> Result<Option<Self>, MetadataError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Replace the record at `path` in one atomic step.
    pub fn store(&self, path: &Path) -> Result<(), MetadataError> {
        let raw = serde_json::to_vec(self)?;
        atomic_write(path, &raw)?;
        Ok(())
    }
}

/// Errors reading or writing `cache.json`.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed cache metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Current wall-clock time as float seconds since the epoch.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn identity() -> CacheIdentity {
        CacheIdentity::new("https://example.com/cfg.git", "master")
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempdir().unwrap();
        let meta = CacheMetadata::load(&dir.path().join("cache.json")).unwrap();
        assert!(meta.is_none());
    }

    #[test]
    fn store_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let meta = CacheMetadata::now(&identity());

        meta.store(&path).unwrap();
        let loaded = CacheMetadata::load(&path).unwrap().unwrap();
        assert_eq!(loaded, meta);
        assert!(loaded.matches(&identity()));
    }

    #[test]
    fn reads_document_written_by_other_tools() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            r#"{"git_uri": "https://example.com/cfg.git", "branch": "master", "timestamp": 1700000000.25}"#,
        )
        .unwrap();

        let loaded = CacheMetadata::load(&path).unwrap().unwrap();
        assert_eq!(loaded.timestamp, 1700000000.25);
        assert_eq!(loaded.identity(), identity());
    }

    #[test]
    fn written_document_has_expected_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        CacheMetadata::now(&identity()).store(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["git_uri"], "https://example.com/cfg.git");
        assert_eq!(value["branch"], "master");
        assert!(value["timestamp"].is_f64());
    }

    #[test]
    fn malformed_document_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            CacheMetadata::load(&path),
            Err(MetadataError::Json(_))
        ));
    }

    #[test]
    fn matches_requires_uri_and_branch() {
        let meta = CacheMetadata::now(&identity());
        assert!(!meta.matches(&CacheIdentity::new("https://example.com/cfg.git", "devel")));
        assert!(!meta.matches(&CacheIdentity::new("https://example.com/other.git", "master")));
    }
}
