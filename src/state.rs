use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::auth::service::{AuthService, SystemClock};
use crate::auth::signer::TokenSigner;
use crate::auth::store::PgUserStore;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        Self::from_parts(db, config)
    }

    /// Wires the auth service from its collaborators. The store, signer and
    /// clock are injected here and nowhere else.
    pub fn from_parts(db: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let store = Arc::new(PgUserStore::new(db.clone()));
        let signer = TokenSigner::new(&config.token)?;
        let auth = Arc::new(AuthService::new(store, signer, Arc::new(SystemClock)));

        Ok(Self { db, config, auth })
    }
}
