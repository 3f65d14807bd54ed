//! Application configuration
//!
//! Read from `{config_dir}/helix/config.toml`. Every field has a default, so
//! a missing file or a partial one is fine. `HELIX_CONTENT_URL` overrides
//! the content API URL; CLI flags override everything.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::ContentAccess;
use crate::persistence::PersistenceMode;

pub const CONTENT_URL_ENV: &str = "HELIX_CONTENT_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine the {0} directory")]
    DirNotFound(&'static str),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AppConfig {
    /// Root for scheduler state and the persisted content cache
    pub data_dir: Option<PathBuf>,
    pub user_id: String,
    /// Base URL of the content API; no network tier without it
    pub content_api_url: Option<String>,
    /// Restrict sessions to content shipped with the client
    pub bundled_only: bool,
    /// Stitches to fetch ahead of the learner
    pub prefetch_window: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_retries: u32,
    pub persistence: PersistenceMode,
    /// Base URL of the user-state API, for `persistence = "remote"`
    pub state_api_url: Option<String>,
    /// Manifest to use instead of the embedded one
    pub manifest_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            user_id: "local".to_string(),
            content_api_url: None,
            bundled_only: false,
            prefetch_window: 5,
            fetch_timeout_secs: 10,
            fetch_retries: 2,
            persistence: PersistenceMode::Local,
            state_api_url: None,
            manifest_path: None,
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("helix").join("config.toml"))
            .ok_or(ConfigError::DirNotFound("config"))
    }

    /// Load from `path`, or the default location; a missing file yields the
    /// defaults. Environment overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if path.exists() {
            log::debug!("Loading config from {:?}", path);
            Self::from_toml(&fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };

        if let Ok(url) = std::env::var(CONTENT_URL_ENV) {
            config.apply_content_url_override(&url);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_content_url_override(&mut self, url: &str) {
        let url = url.trim();
        if !url.is_empty() {
            self.content_api_url = Some(url.to_string());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::Invalid("user_id must not be empty".to_string()));
        }
        if self.persistence == PersistenceMode::Remote && self.state_api_url.is_none() {
            return Err(ConfigError::Invalid(
                "persistence = \"remote\" needs state_api_url".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured data directory, or the platform default
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|p| p.join("helix"))
                .ok_or(ConfigError::DirNotFound("data")),
        }
    }

    pub fn content_access(&self) -> ContentAccess {
        if self.bundled_only {
            ContentAccess::BundledOnly
        } else {
            ContentAccess::Full
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}
