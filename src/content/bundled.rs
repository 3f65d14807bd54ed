//! Offline content shipped with the client

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use super::models::Stitch;

const EMBEDDED_CONTENT: &str = include_str!("../../resources/bundled_content.json");

#[derive(Deserialize)]
struct BundleFile {
    stitches: Vec<Stitch>,
}

/// Fixed id → stitch map; zero latency, no failure mode once built
#[derive(Debug, Clone, Default)]
pub struct BundledDataset {
    stitches: HashMap<String, Arc<Stitch>>,
}

impl BundledDataset {
    pub fn from_stitches(stitches: impl IntoIterator<Item = Stitch>) -> Self {
        Self {
            stitches: stitches
                .into_iter()
                .map(|s| (s.id.clone(), Arc::new(s)))
                .collect(),
        }
    }

    /// Parse a bundle of the form `{ "stitches": [...] }`
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: BundleFile = serde_json::from_str(json)?;
        Ok(Self::from_stitches(file.stitches))
    }

    /// The dataset compiled into the crate
    pub fn embedded() -> Result<Self, serde_json::Error> {
        Self::from_json(EMBEDDED_CONTENT)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Stitch>> {
        self.stitches.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stitches.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Stitch>)> {
        self.stitches.iter()
    }

    pub fn len(&self) -> usize {
        self.stitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stitches.is_empty()
    }
}
