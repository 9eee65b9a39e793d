use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use crate::classifier::Classifier;
use crate::config::AppConfig;
use crate::db;
use crate::storage::ImageStore;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub classifier: Arc<Classifier>,
    pub store: Arc<ImageStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = db::connect(&config.database_url).await?;
        let store = Arc::new(ImageStore::open(&config.upload_dir, &config.annotated_dir)?);

        // Model availability is decided here, once, for the process lifetime.
        let classifier = Arc::new(Classifier::load(&config.model_path, config.fallback));
        info!(mode = classifier.mode(), "classifier ready");

        Ok(Self {
            db,
            config,
            classifier,
            store,
        })
    }

    pub fn from_parts(
        db: SqlitePool,
        config: Arc<AppConfig>,
        classifier: Arc<Classifier>,
        store: Arc<ImageStore>,
    ) -> Self {
        Self {
            db,
            config,
            classifier,
            store,
        }
    }
}
