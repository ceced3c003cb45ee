use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::ReqwestTransport;
use crate::pipeline::Pipeline;
use crate::repositories::PgStore;

const MAX_DB_CONNECTIONS: u32 = 10;

/// A pipeline wired to Postgres and the reqwest transport.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<PgStore>,
    pub pipeline: Pipeline,
}

impl AppState {
    /// Connect, apply pending migrations and build the pipeline.
    pub async fn connect(config: Config) -> Result<Self> {
        let store = Arc::new(PgStore::connect(config.database_url(), MAX_DB_CONNECTIONS).await?);
        store.migrate().await?;

        let transport = Arc::new(ReqwestTransport::new(&config.http)?);
        let pipeline = Pipeline::builder(config.clone(), store.clone(), transport).build();

        Ok(Self {
            config,
            store,
            pipeline,
        })
    }
}
