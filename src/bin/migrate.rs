use newsdesk::{config::Config, logging, repositories::PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = Config::from_env()?;
    let store = PgStore::connect(config.database_url(), 5).await?;

    // runs all pending migrations; no-op if up-to-date
    store.migrate().await?;

    Ok(())
}
