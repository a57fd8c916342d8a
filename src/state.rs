// src/state.rs

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::ai::AiClient;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub ai: AiClient,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AiClient {
    fn from_ref(state: &AppState) -> Self {
        state.ai.clone()
    }
}
