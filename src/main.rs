//! One-shot crawl: `newsdesk [URL...]` registers any given sites, crawls
//! every active site once and prints the aggregate job as JSON.

use anyhow::Result;
use newsdesk::{app_state::AppState, config::Config, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = Config::from_env()?;
    let state = AppState::connect(config).await?;

    for url in std::env::args().skip(1) {
        let site = state.pipeline.add_site(&url).await?;
        info!(site_id = %site.id, domain = %site.domain, "tracking site");
    }

    let job = state.pipeline.crawl_all(&state.config.budget).await?;
    state.pipeline.drain().await;

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}
