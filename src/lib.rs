use std::sync::Arc;

use thiserror::Error;

pub mod config;
pub mod content;
pub mod manifest;
pub mod persistence;
pub mod scheduler;
pub mod session;

use config::AppConfig;
use content::{BundledDataset, ContentCacheStore, ContentResolver, HttpContentFetcher};
use manifest::ContentManifest;
use persistence::{
    FileStateStore, HttpStateStore, MemoryStateStore, PersistenceMode, StatePersistence,
};
use session::{SessionConfig, SessionCoordinator};

#[derive(Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("Failed to load manifest: {0}")]
    Manifest(#[from] manifest::ManifestError),

    #[error("Failed to load bundled content: {0}")]
    Bundle(#[from] serde_json::Error),

    #[error("Failed to open content cache: {0}")]
    Cache(#[from] content::CacheStoreError),

    #[error("Failed to set up content fetcher: {0}")]
    Fetcher(#[from] content::FetchError),

    #[error(transparent)]
    Persistence(#[from] persistence::PersistenceError),

    #[error(transparent)]
    Session(#[from] session::SessionError),
}

/// Everything a session needs, built once from the app config
pub struct AppState {
    pub config: AppConfig,
    pub manifest: Arc<ContentManifest>,
    pub resolver: ContentResolver,
    pub store: Arc<dyn StatePersistence>,
}

impl AppState {
    pub fn init(config: AppConfig) -> Result<Self, InitError> {
        let data_dir = config.resolved_data_dir()?;

        let manifest = match &config.manifest_path {
            Some(path) => ContentManifest::load(path)?,
            None => ContentManifest::embedded()?,
        };
        let manifest = Arc::new(manifest);
        let bundled = Arc::new(BundledDataset::embedded()?);

        let mut builder = ContentResolver::builder(Arc::clone(&manifest), bundled)
            .persisted(ContentCacheStore::new(data_dir.clone())?)
            .access(config.content_access());
        if let Some(url) = &config.content_api_url {
            let fetcher = HttpContentFetcher::new(
                url.clone(),
                config.fetch_timeout(),
                config.fetch_retries,
            )?;
            builder = builder.fetcher(Arc::new(fetcher));
        }
        let resolver = builder.build();

        let store: Arc<dyn StatePersistence> = match config.persistence {
            PersistenceMode::Local => Arc::new(FileStateStore::new(data_dir)),
            PersistenceMode::Memory => Arc::new(MemoryStateStore::new()),
            PersistenceMode::Remote => {
                let url = config.state_api_url.clone().ok_or_else(|| {
                    config::ConfigError::Invalid(
                        "persistence = \"remote\" needs state_api_url".to_string(),
                    )
                })?;
                Arc::new(HttpStateStore::new(url, config.fetch_timeout())?)
            }
        };

        log::info!(
            "Initialised: manifest v{} ({} stitches), content access {:?}, persistence {}",
            manifest.version,
            manifest.stitch_count(),
            config.content_access(),
            config.persistence
        );

        Ok(Self {
            config,
            manifest,
            resolver,
            store,
        })
    }

    /// Start a session for the configured learner
    pub async fn start_session(&self) -> Result<SessionCoordinator, InitError> {
        let session = SessionCoordinator::start(
            self.config.user_id.clone(),
            Arc::clone(&self.manifest),
            self.resolver.clone(),
            Arc::clone(&self.store),
            SessionConfig {
                prefetch_window: self.config.prefetch_window,
            },
        )
        .await?;
        Ok(session)
    }
}
