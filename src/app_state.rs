use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::config::Config;
use crate::middleware::auth::{create_user_cache, UserCache};
use crate::utils::assistant::ChatAssistant;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub user_cache: UserCache,
    pub assistant: ChatAssistant,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let user_cache = create_user_cache(config.user_cache_ttl_secs);
        let assistant = ChatAssistant::from_config(&config);
        Self {
            pool,
            config: Arc::new(config),
            user_cache,
            assistant,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
