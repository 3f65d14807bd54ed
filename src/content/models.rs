//! Data models for drill content

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// An atomic learning unit: a short set of questions within a thread.
///
/// Immutable once resolved; shared as `Arc<Stitch>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stitch {
    pub id: String,
    pub thread_id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub correct_answer: String,
    /// Wrong answers keyed by distractor level (1 = easiest, 5 = hardest)
    #[serde(default)]
    pub distractors: BTreeMap<u8, String>,
}

impl Question {
    /// Distractor for a level, falling back to the nearest easier level and
    /// then to any level the question has
    pub fn distractor_for(&self, level: u8) -> Option<&str> {
        self.distractors
            .range(..=level)
            .next_back()
            .or_else(|| self.distractors.iter().next())
            .map(|(_, d)| d.as_str())
    }
}

/// Where a stitch's content came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceTier {
    Memory,
    Persisted,
    Bundled,
    Network,
    Synthetic,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Persisted => "persisted",
            Self::Bundled => "bundled",
            Self::Network => "network",
            Self::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}

/// A cached stitch and the tier that originally produced it
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub stitch_id: String,
    pub stitch: Arc<Stitch>,
    pub source_tier: SourceTier,
}

/// Content handed back to callers of the resolver
#[derive(Debug, Clone)]
pub struct ResolvedStitch {
    pub stitch: Arc<Stitch>,
    /// Tier that satisfied this lookup
    pub source: SourceTier,
}

/// Whether a session may reach the network tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentAccess {
    /// Bundled content plus network fetches
    #[default]
    Full,
    /// Restricted to content shipped with the client
    BundledOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(levels: &[(u8, &str)]) -> Question {
        Question {
            id: "q".to_string(),
            prompt: "2 × 3".to_string(),
            correct_answer: "6".to_string(),
            distractors: levels.iter().map(|(l, d)| (*l, d.to_string())).collect(),
        }
    }

    #[test]
    fn test_distractor_for_level() {
        let q = question(&[(1, "60"), (3, "7"), (5, "5")]);
        assert_eq!(q.distractor_for(1), Some("60"));
        assert_eq!(q.distractor_for(2), Some("60"));
        assert_eq!(q.distractor_for(4), Some("7"));
        assert_eq!(q.distractor_for(5), Some("5"));
    }

    #[test]
    fn test_distractor_fallback_to_any_level() {
        let q = question(&[(4, "8")]);
        assert_eq!(q.distractor_for(1), Some("8"));
        assert_eq!(question(&[]).distractor_for(3), None);
    }

    #[test]
    fn test_question_json_shape() {
        let json = r#"{ "id": "q1", "prompt": "3 × 3", "correctAnswer": "9",
                        "distractors": { "1": "90", "5": "8" } }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.correct_answer, "9");
        assert_eq!(q.distractor_for(5), Some("8"));
    }
}
