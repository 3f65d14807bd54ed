//! Scheduler state persistence
//!
//! The session layer saves a learner's `TubeState` after every completion
//! through the `StatePersistence` port. Where it lands is a configuration
//! choice (`PersistenceMode`):
//! - `Local` - JSON file per user under the data directory (default)
//! - `Remote` - the user-state HTTP API
//! - `Memory` - in-process only, nothing survives the session

pub mod file_store;
pub mod http_store;
pub mod memory_store;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::TubeState;

pub use file_store::FileStateStore;
pub use http_store::HttpStateStore;
pub use memory_store::MemoryStateStore;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Storage port for scheduler state
#[async_trait]
pub trait StatePersistence: Send + Sync {
    async fn save(&self, user_id: &str, state: &TubeState) -> Result<()>;

    /// `None` if nothing has been saved for this user
    async fn load(&self, user_id: &str) -> Result<Option<TubeState>>;

    async fn delete(&self, user_id: &str) -> Result<()>;
}

/// Where scheduler state is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Device-local file store
    #[default]
    Local,
    /// Server sync on every completion
    Remote,
    /// Nothing persisted past the process
    Memory,
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Memory => "memory",
        };
        f.write_str(name)
    }
}

impl FromStr for PersistenceMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown persistence mode '{}' (expected local, remote or memory)",
                other
            )),
        }
    }
}

/// User ids become path segments and URL segments
pub(crate) fn validate_user_id(user_id: &str) -> Result<()> {
    let valid = !user_id.is_empty()
        && user_id.len() <= 128
        && !user_id.starts_with('.')
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(PersistenceError::InvalidUserId(user_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("local".parse::<PersistenceMode>(), Ok(PersistenceMode::Local));
        assert_eq!("Remote".parse::<PersistenceMode>(), Ok(PersistenceMode::Remote));
        assert!("cloud".parse::<PersistenceMode>().is_err());
        assert_eq!(PersistenceMode::default(), PersistenceMode::Local);
    }

    #[test]
    fn test_user_id_validation() {
        assert!(validate_user_id("learner-1").is_ok());
        assert!(validate_user_id("a.b_c").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("../etc").is_err());
        assert!(validate_user_id("a/b").is_err());
        assert!(validate_user_id(".hidden").is_err());
    }
}
