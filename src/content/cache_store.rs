//! Persisted content cache
//!
//! Directory structure:
//! ```text
//! {data_dir}/content_cache/
//! └── {stitch-id}.json   # One resolved stitch per file
//! ```
//!
//! Each file is written to a temporary name and renamed into place, so a
//! reader never sees half a stitch.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;

use super::models::Stitch;

#[derive(Error, Debug)]
pub enum CacheStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stitch id for cache: {0}")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, CacheStoreError>;

/// File-backed cache of stitches fetched from the network
pub struct ContentCacheStore {
    cache_dir: PathBuf,
}

impl ContentCacheStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        let cache_dir = data_dir.join("content_cache");
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    fn stitch_path(&self, stitch_id: &str) -> Result<PathBuf> {
        let safe = !stitch_id.is_empty()
            && stitch_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !stitch_id.starts_with('.');
        if !safe {
            return Err(CacheStoreError::InvalidId(stitch_id.to_string()));
        }
        Ok(self.cache_dir.join(format!("{}.json", stitch_id)))
    }

    /// Read a cached stitch; `None` if absent
    pub fn get(&self, stitch_id: &str) -> Result<Option<Stitch>> {
        let path = self.stitch_path(stitch_id)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let stitch: Stitch = serde_json::from_str(&content)?;
        Ok(Some(stitch))
    }

    /// Write a stitch atomically
    pub fn put(&self, stitch: &Stitch) -> Result<()> {
        let path = self.stitch_path(&stitch.id)?;
        let tmp = path.with_extension("json.tmp");

        fs::write(&tmp, serde_json::to_string_pretty(stitch)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn contains(&self, stitch_id: &str) -> bool {
        self.stitch_path(stitch_id)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    /// Remove every cached stitch
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}
