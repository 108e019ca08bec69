use std::sync::Arc;

use crate::config::AppConfig;
use crate::storage::{LocalStorage, S3Storage, StorageClient};
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let store = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?) as Arc<dyn Store>,
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory store, data will not persist");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        let storage = match &config.s3 {
            Some(s3) => Arc::new(S3Storage::new(s3).await?) as Arc<dyn StorageClient>,
            None => {
                tracing::info!(root = %config.media_root.display(), "storing images on local disk");
                Arc::new(LocalStorage::new(config.media_root.clone())) as Arc<dyn StorageClient>
            }
        };

        Ok(Self {
            store,
            config,
            storage,
        })
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            store,
            config,
            storage,
        }
    }
}
