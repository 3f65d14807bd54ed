//! Data models for the content manifest

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::TubeIndex;

/// Manifest shipped with the client, used until a newer one is supplied
const EMBEDDED_MANIFEST: &str = include_str!("../../resources/manifest.json");

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid tube index in manifest: {0}")]
    InvalidTube(u8),

    #[error("Duplicate stitch {stitch_id} in tube {tube}")]
    DuplicateStitch { tube: u8, stitch_id: String },
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// Versioned, read-only index of every stitch per tube and thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentManifest {
    pub version: u32,
    #[serde(default)]
    pub tubes: BTreeMap<u8, TubeManifest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TubeManifest {
    #[serde(default)]
    pub threads: BTreeMap<String, ThreadManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadManifest {
    pub title: String,
    #[serde(default)]
    pub stitches: Vec<StitchReference>,
}

/// Pointer to a stitch; `order` defines the canonical sequence in its thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StitchReference {
    pub id: String,
    pub order: u32,
    pub title: String,
}

impl ContentManifest {
    /// Parse and normalise a manifest.
    ///
    /// Stitches are sorted by `order`; tube keys outside 1..=3 and stitch ids
    /// repeated within a tube are rejected.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut manifest: ContentManifest = serde_json::from_str(json)?;

        for (&tube, tube_manifest) in manifest.tubes.iter_mut() {
            if TubeIndex::try_from(tube).is_err() {
                return Err(ManifestError::InvalidTube(tube));
            }

            let mut seen = HashSet::new();
            for thread in tube_manifest.threads.values_mut() {
                thread.stitches.sort_by_key(|s| s.order);
                for stitch in &thread.stitches {
                    if !seen.insert(stitch.id.clone()) {
                        return Err(ManifestError::DuplicateStitch {
                            tube,
                            stitch_id: stitch.id.clone(),
                        });
                    }
                }
            }
        }

        Ok(manifest)
    }

    /// Load a manifest file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The manifest bundled with the crate
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_MANIFEST)
    }

    fn tube(&self, tube: TubeIndex) -> Option<&TubeManifest> {
        self.tubes.get(&tube.as_u8())
    }

    /// The thread a tube draws from: its first thread in key order
    pub fn primary_thread(&self, tube: TubeIndex) -> Option<&str> {
        self.tube(tube)
            .and_then(|t| t.threads.keys().next())
            .map(String::as_str)
    }

    /// Ordered stitch references for a thread within a tube
    pub fn thread_stitches(&self, tube: TubeIndex, thread_id: &str) -> &[StitchReference] {
        self.tube(tube)
            .and_then(|t| t.threads.get(thread_id))
            .map(|t| t.stitches.as_slice())
            .unwrap_or(&[])
    }

    /// Find which tube and thread a stitch belongs to
    pub fn thread_of(&self, stitch_id: &str) -> Option<(TubeIndex, &str)> {
        for (&tube, tube_manifest) in &self.tubes {
            for (thread_id, thread) in &tube_manifest.threads {
                if thread.stitches.iter().any(|s| s.id == stitch_id) {
                    let index = TubeIndex::try_from(tube).ok()?;
                    return Some((index, thread_id.as_str()));
                }
            }
        }
        None
    }

    /// The next `count` stitch ids after `from_id` in canonical order.
    ///
    /// Walks only the thread of `tube` that contains `from_id`; does not wrap
    /// around. Unknown ids yield an empty list.
    pub fn upcoming(&self, tube: TubeIndex, from_id: &str, count: usize) -> Vec<String> {
        let Some(tube_manifest) = self.tube(tube) else {
            return Vec::new();
        };

        for thread in tube_manifest.threads.values() {
            if let Some(idx) = thread.stitches.iter().position(|s| s.id == from_id) {
                return thread.stitches[idx + 1..]
                    .iter()
                    .take(count)
                    .map(|s| s.id.clone())
                    .collect();
            }
        }

        Vec::new()
    }

    /// Total number of stitches across all tubes
    pub fn stitch_count(&self) -> usize {
        self.tubes
            .values()
            .flat_map(|t| t.threads.values())
            .map(|t| t.stitches.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "version": 2,
        "tubes": {
            "1": { "threads": { "t1-a": { "title": "Times", "stitches": [
                { "id": "s3", "order": 3, "title": "Three" },
                { "id": "s1", "order": 1, "title": "One" },
                { "id": "s2", "order": 2, "title": "Two" }
            ] } } },
            "2": { "threads": { "t2-a": { "title": "Bonds", "stitches": [
                { "id": "b1", "order": 1, "title": "Bond one" }
            ] } } }
        }
    }"#;

    #[test]
    fn test_stitches_sorted_by_order() {
        let manifest = ContentManifest::from_json(SAMPLE).unwrap();
        let ids: Vec<&str> = manifest
            .thread_stitches(TubeIndex::One, "t1-a")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_upcoming_window() {
        let manifest = ContentManifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.upcoming(TubeIndex::One, "s1", 5), vec!["s2", "s3"]);
        assert_eq!(manifest.upcoming(TubeIndex::One, "s1", 1), vec!["s2"]);
        assert!(manifest.upcoming(TubeIndex::One, "s3", 2).is_empty());
        assert!(manifest.upcoming(TubeIndex::One, "missing", 2).is_empty());
        assert!(manifest.upcoming(TubeIndex::Three, "s1", 2).is_empty());
    }

    #[test]
    fn test_thread_lookup() {
        let manifest = ContentManifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.primary_thread(TubeIndex::Two), Some("t2-a"));
        assert_eq!(manifest.primary_thread(TubeIndex::Three), None);
        assert_eq!(manifest.thread_of("b1"), Some((TubeIndex::Two, "t2-a")));
        assert_eq!(manifest.thread_of("nope"), None);
        assert_eq!(manifest.stitch_count(), 4);
    }

    #[test]
    fn test_rejects_invalid_tube() {
        let json = r#"{ "version": 1, "tubes": { "4": { "threads": {} } } }"#;
        assert!(matches!(
            ContentManifest::from_json(json),
            Err(ManifestError::InvalidTube(4))
        ));
    }

    #[test]
    fn test_rejects_duplicate_stitch() {
        let json = r#"{ "version": 1, "tubes": { "1": { "threads": {
            "a": { "title": "A", "stitches": [{ "id": "x", "order": 1, "title": "X" }] },
            "b": { "title": "B", "stitches": [{ "id": "x", "order": 1, "title": "X" }] }
        } } } }"#;
        assert!(matches!(
            ContentManifest::from_json(json),
            Err(ManifestError::DuplicateStitch { tube: 1, .. })
        ));
    }

    #[test]
    fn test_embedded_manifest_covers_all_tubes() {
        let manifest = ContentManifest::embedded().unwrap();
        for tube in TubeIndex::ALL {
            let thread = manifest.primary_thread(tube).unwrap();
            assert!(!manifest.thread_stitches(tube, thread).is_empty());
        }
    }
}
