use std::sync::Arc;

use crate::config::AppConfig;
use crate::db;
use crate::directory::{self, DirectoryClient};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub directory: Arc<dyn DirectoryClient>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let pool = db::connect(&config).await?;
        db::migrate(&pool).await;

        let store = Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>;
        let directory: Arc<dyn DirectoryClient> = Arc::from(directory::from_config(&config.directory)?);

        Ok(Self {
            store,
            directory,
            config,
        })
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        directory: Arc<dyn DirectoryClient>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }
}
