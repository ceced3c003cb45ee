use anyhow::Result;
use std::time::Duration;
use tokio::{
    signal,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::config::CrawlBudget;
use crate::pipeline::Pipeline;

/// Scheduler configuration
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub budget: CrawlBudget,
    /// Run a crawl right away instead of waiting one interval.
    pub run_immediately: bool,
}

/// Runs `crawl_all` on a fixed period until shut down.
pub struct CrawlScheduler {
    pipeline: Pipeline,
    config: SchedulerConfig,
    scheduler_id: Uuid,
    shutdown_token: CancellationToken,
}

impl CrawlScheduler {
    pub fn new(pipeline: Pipeline, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            config,
            scheduler_id: Uuid::new_v4(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Token that stops the loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run until ctrl-c. A crawl in progress finishes before returning.
    pub async fn run(self) -> Result<()> {
        let shutdown_token = self.shutdown_token.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_token.cancel();
        });

        self.run_until_cancelled().await
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run_until_cancelled(self) -> Result<()> {
        info!(
            scheduler_id = %self.scheduler_id,
            interval_secs = self.config.interval.as_secs(),
            "starting crawl scheduler"
        );

        let mut ticks = interval(self.config.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        if !self.config.run_immediately {
            // The first tick of a tokio interval completes at once.
            ticks.tick().await;
        }

        let mut round = 0u64;
        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler shutting down");
                    break;
                }
                _ = ticks.tick() => {
                    round += 1;
                    self.crawl_round()
                        .instrument(info_span!("crawl_round", scheduler_id = %self.scheduler_id, round))
                        .await;
                }
            }
        }

        info!("Waiting for enrichment tasks to complete...");
        self.pipeline.drain().await;
        info!("Scheduler stopped");
        Ok(())
    }

    async fn crawl_round(&self) {
        match self.pipeline.crawl_all(&self.config.budget).await {
            Ok(job) => info!(
                job_id = %job.id,
                status = ?job.status,
                pages = job.pages_scraped,
                new = job.articles_found,
                "crawl round complete"
            ),
            // The next tick is the retry.
            Err(e) => error!(error = %e, "crawl round failed"),
        }
    }
}
