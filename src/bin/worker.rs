use anyhow::Result;
use newsdesk::{
    app_state::AppState,
    config::Config,
    jobs::{CrawlScheduler, SchedulerConfig},
    logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = Config::from_env()?;
    let state = AppState::connect(config).await?;

    let scheduler_config = SchedulerConfig {
        interval: state.config.crawl_interval(),
        budget: state.config.budget,
        run_immediately: true,
    };

    CrawlScheduler::new(state.pipeline, scheduler_config)
        .run()
        .await
}
