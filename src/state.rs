use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use crate::{
    config::AppConfig,
    db,
    yookassa::{PaymentProvider, YooKassaClient},
};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    /// `None` runs payments in test mode: nothing leaves the process.
    pub provider: Option<Arc<dyn PaymentProvider>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = db::connect(&config.database_url).await?;
        db::migrate(&db).await?;

        let provider = match &config.yookassa {
            Some(cfg) => {
                info!(api_url = %cfg.api_url, "yookassa client configured");
                Some(Arc::new(YooKassaClient::new(cfg)?) as Arc<dyn PaymentProvider>)
            }
            None => {
                info!("yookassa credentials missing, payments run in test mode");
                None
            }
        };

        Ok(Self::from_parts(db, config, provider))
    }

    pub fn from_parts(
        db: SqlitePool,
        config: Arc<AppConfig>,
        provider: Option<Arc<dyn PaymentProvider>>,
    ) -> Self {
        Self {
            db,
            config,
            provider,
        }
    }

    #[cfg(test)]
    pub async fn fake(provider: Option<Arc<dyn PaymentProvider>>) -> Self {
        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 0,
            public_base_url: "http://localhost:3000".into(),
            jwt: crate::config::JwtConfig {
                secret: "test-secret".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 60 * 24 * 7,
            },
            yookassa: None,
        });
        Self::from_parts(db::memory_pool().await, config, provider)
    }
}
