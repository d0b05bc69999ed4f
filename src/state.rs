use std::sync::Arc;

use crate::auth::jwt::JwtKeys;
use crate::config::AppConfig;
use crate::db;
use crate::rate_limit::RateLimiter;
use crate::storage::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub keys: Arc<JwtKeys>,
    pub limiter: RateLimiter,
}

impl AppState {
    /// Loads config from the environment. `STORE=memory` skips postgres entirely.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = if std::env::var("STORE").as_deref() == Ok("memory") {
            tracing::warn!("using in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new()) as Arc<dyn Store>
        } else {
            let pool = db::connect(&config).await?;
            db::migrate(&pool).await?;
            Arc::new(PgStore::new(pool)) as Arc<dyn Store>
        };

        Ok(Self::from_parts(store, config))
    }

    pub fn from_parts(store: Arc<dyn Store>, config: Arc<AppConfig>) -> Self {
        let keys = Arc::new(JwtKeys::from(&config.jwt));
        let limiter = RateLimiter::from(&config.rate_limit);
        Self {
            store,
            config,
            keys,
            limiter,
        }
    }

    #[cfg(test)]
    pub(crate) fn fake() -> Self {
        Self::from_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(AppConfig::for_tests()),
        )
    }
}
