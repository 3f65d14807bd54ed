use std::path::Path;

use anyhow::{Context, Result};

use helix_lib::config::AppConfig;
use helix_lib::session::SessionCoordinator;
use helix_lib::AppState;

/// Shared application state for CLI commands
pub struct App {
    pub state: AppState,
}

/// Flags that override the config file
pub struct Overrides<'a> {
    pub config_path: Option<&'a Path>,
    pub user: Option<&'a str>,
    pub offline: bool,
}

impl App {
    pub fn new(overrides: Overrides<'_>) -> Result<Self> {
        let mut config =
            AppConfig::load(overrides.config_path).context("Failed to load configuration")?;

        if let Some(user) = overrides.user {
            config.user_id = user.to_string();
        }
        if overrides.offline {
            config.bundled_only = true;
        }
        config.validate().context("Invalid configuration")?;

        let state = AppState::init(config).context("Failed to initialise")?;
        Ok(Self { state })
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }

    pub async fn session(&self) -> Result<SessionCoordinator> {
        self.state
            .start_session()
            .await
            .with_context(|| format!("Failed to start session for '{}'", self.config().user_id))
    }
}
