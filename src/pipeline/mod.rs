//! The pipeline facade: crawl triggers, criterion rescoring and the cached
//! query surface read by the external API.

pub mod ingest;

pub use ingest::Ingestor;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::cache::{ARTICLES_TAG, Cache, CacheBackend, MemoryCache};
use crate::config::{CacheConfig, Config, CrawlBudget};
use crate::crawler::domain::registered_domain_of;
use crate::crawler::{Crawler, RateLimiter};
use crate::enrichment::{Enricher, EnrichmentDispatcher, NoopEnricher};
use crate::entities::{Article, ArticleFilter, CrawlJob, JobStatus, Site, Stats};
use crate::error::{PipelineError, Result};
use crate::extractor::Extractor;
use crate::fetcher::{Fetcher, Transport};
use crate::relevance::{ArticleText, MatchSet, RelevanceScorer};
use crate::repositories::Store;

pub const MIN_QUERY_LEN: usize = 2;
pub const MAX_SEARCH_LIMIT: i64 = 200;
pub const MAX_ARTICLES_LIMIT: i64 = 500;
pub const RESCORE_BATCH: i64 = 200;

const STATS_KEY: &str = "stats";

#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Store>,
    crawler: Crawler,
    scorer: RelevanceScorer,
    cache: Cache,
    cache_config: CacheConfig,
    enrichment: EnrichmentDispatcher,
    budget: CrawlBudget,
    site_concurrency: usize,
    /// Cancellation handles of running passes, tagged with their job id.
    running: DashMap<Uuid, (Uuid, CancellationToken)>,
}

/// Assembles a [`Pipeline`] from its collaborators.
pub struct PipelineBuilder {
    config: Config,
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    enricher: Arc<dyn Enricher>,
    cache_backend: Arc<dyn CacheBackend>,
    enrichment_timeout: Option<Duration>,
}

impl PipelineBuilder {
    pub fn enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = backend;
        self
    }

    pub fn enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Pipeline {
        let config = self.config;
        let cache = Cache::new(self.cache_backend);
        let scorer = RelevanceScorer::new(&config.scoring);

        let mut enrichment = EnrichmentDispatcher::new(self.enricher, self.store.clone());
        if let Some(timeout) = self.enrichment_timeout {
            enrichment = enrichment.with_timeout(timeout);
        }

        let ingestor = Ingestor::new(
            self.store.clone(),
            scorer.clone(),
            cache.clone(),
            enrichment.clone(),
        );
        let crawler = Crawler::new(
            Fetcher::new(self.transport),
            Arc::new(RateLimiter::new(config.budget.per_host_delay)),
            Extractor::default(),
            self.store.clone(),
            Arc::new(ingestor),
            config.crawl.clone(),
        );

        Pipeline {
            inner: Arc::new(Inner {
                store: self.store,
                crawler,
                scorer,
                cache,
                cache_config: config.cache,
                enrichment,
                budget: config.budget,
                site_concurrency: config.crawl.site_concurrency.max(1),
                running: DashMap::new(),
            }),
        }
    }
}

impl Pipeline {
    pub fn builder(
        config: Config,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            config,
            store,
            transport,
            enricher: Arc::new(NoopEnricher),
            cache_backend: Arc::new(MemoryCache::new()),
            enrichment_timeout: None,
        }
    }

    /// Budget used when callers do not supply one.
    pub fn default_budget(&self) -> CrawlBudget {
        self.inner.budget
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Start tracking a top-level site. Returns the existing row when the
    /// registered domain is already tracked.
    pub async fn add_site(&self, url: &str) -> Result<Site> {
        let parsed = Url::parse(url).map_err(|e| PipelineError::Parse(format!("{url}: {e}")))?;
        let domain = registered_domain_of(&parsed)
            .ok_or_else(|| PipelineError::Parse(format!("{url}: no host")))?;

        if let Some(existing) = self.inner.store.load_site_by_domain(&domain).await? {
            return Ok(existing);
        }

        let site = Site::new(parsed.as_str(), domain);
        self.inner.store.save_site(&site).await?;
        info!(site_id = %site.id, domain = %site.domain, "site added");
        Ok(site)
    }

    /// Crawl one site and its subdomains. The returned job carries the
    /// terminal status and counters that were recorded.
    #[instrument(skip(self, budget))]
    pub async fn crawl_one(&self, site_id: Uuid, budget: &CrawlBudget) -> Result<CrawlJob> {
        let site = self
            .inner
            .store
            .load_site(site_id)
            .await?
            .ok_or(PipelineError::SiteNotFound(site_id))?;
        self.run_site(site, *budget).await
    }

    /// Crawl every active site, at most `site_concurrency` at a time, and
    /// record an aggregate job.
    #[instrument(skip_all)]
    pub async fn crawl_all(&self, budget: &CrawlBudget) -> Result<CrawlJob> {
        let sites = self.inner.store.list_active_sites().await?;
        let mut aggregate = CrawlJob::start(None);
        self.inner.store.record_crawl_job(&aggregate).await?;
        info!(job_id = %aggregate.id, sites = sites.len(), "crawl started");

        let permits = Arc::new(Semaphore::new(self.inner.site_concurrency));
        let mut passes = JoinSet::new();
        for site in sites {
            let pipeline = self.clone();
            let permits = permits.clone();
            let budget = *budget;
            passes.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let site_id = site.id;
                (site_id, pipeline.run_site(site, budget).await)
            });
        }

        let mut statuses = Vec::new();
        while let Some(joined) = passes.join_next().await {
            match joined {
                Ok((_, Ok(job))) => {
                    absorb(&mut aggregate, &job);
                    statuses.push(job.status);
                }
                Ok((site_id, Err(err))) => {
                    error!(%site_id, error = %err, "site pass aborted");
                    statuses.push(JobStatus::Failed);
                }
                Err(err) => {
                    error!(error = %err, "site pass panicked");
                    statuses.push(JobStatus::Failed);
                }
            }
        }

        let status = aggregate_status(&statuses);
        let failed = count_failed(&statuses);
        let message =
            (failed > 0).then(|| format!("{failed} of {} site passes failed", statuses.len()));
        aggregate.finish(status, message);
        self.inner.store.record_crawl_job(&aggregate).await?;

        info!(
            job_id = %aggregate.id,
            status = ?aggregate.status,
            pages = aggregate.pages_scraped,
            new = aggregate.articles_found,
            "crawl finished"
        );
        Ok(aggregate)
    }

    async fn run_site(&self, site: Site, budget: CrawlBudget) -> Result<CrawlJob> {
        let site_id = site.id;
        let mut job = CrawlJob::start(Some(site_id));
        self.inner.store.record_crawl_job(&job).await?;

        let cancel = CancellationToken::new();
        if let Some((_, (previous, token))) = self.inner.running.remove(&site_id) {
            warn!(%site_id, previous_job = %previous, "superseding a running pass");
            token.cancel();
        }
        self.inner
            .running
            .insert(site_id, (job.id, cancel.clone()));

        let result = self.inner.crawler.crawl_site(site, &budget, cancel).await;
        self.inner
            .running
            .remove_if(&site_id, |_, (job_id, _)| *job_id == job.id);

        match result {
            Ok(report) => {
                report.apply_to(&mut job);
                job.finish(report.status, report.error);
                self.inner.store.record_crawl_job(&job).await?;
                Ok(job)
            }
            Err(err) => {
                job.finish(JobStatus::Failed, Some(err.to_string()));
                if let Err(record_err) = self.inner.store.record_crawl_job(&job).await {
                    warn!(job_id = %job.id, error = %record_err, "failed to record aborted job");
                }
                Err(err.into())
            }
        }
    }

    /// Signal a running pass for `site_id` to stop. The pass ends `partial`.
    pub fn cancel(&self, site_id: Uuid) -> bool {
        match self.inner.running.get(&site_id) {
            Some(entry) => {
                entry.value().1.cancel();
                info!(%site_id, "pass cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, site_id: Uuid) -> bool {
        self.inner.running.contains_key(&site_id)
    }

    /// Rescore every active article against a created or edited criterion.
    /// Returns the number of articles scored.
    #[instrument(skip(self))]
    pub async fn criterion_changed(&self, criterion_id: Uuid) -> Result<u64> {
        let criterion = self
            .inner
            .store
            .load_criterion(criterion_id)
            .await?
            .ok_or(PipelineError::CriterionNotFound(criterion_id))?;
        if !criterion.is_active {
            return Ok(0);
        }

        let set = MatchSet::from_criterion(&criterion);
        let mut scored = 0u64;
        let mut after = None;
        loop {
            let batch = self
                .inner
                .store
                .list_articles_for_scoring(after, RESCORE_BATCH)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.id);

            for article in &batch {
                let text = ArticleText::new(&article.title, &article.content);
                let score = self.inner.scorer.score_text(&text, &set);
                self.inner
                    .store
                    .save_relevance_score(article.id, criterion.id, score)
                    .await?;
                scored += 1;
            }
            if (batch.len() as i64) < RESCORE_BATCH {
                break;
            }
        }

        self.inner.cache.invalidate(ARTICLES_TAG).await;
        info!(scored, "criterion rescored");
        Ok(scored)
    }

    /// Substring search over active articles, cached per query page.
    pub async fn search(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<Article>> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Err(PipelineError::InvalidQuery(format!(
                "query must be at least {MIN_QUERY_LEN} characters"
            )));
        }
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let offset = offset.max(0);
        let key = format!("search:{}:{limit}:{offset}", query.to_lowercase());

        let store = self.inner.store.clone();
        self.inner
            .cache
            .get_or_compute(
                &key,
                self.inner.cache_config.search_ttl,
                &[ARTICLES_TAG],
                || async move { store.search_articles(query, limit, offset).await },
            )
            .await
            .map_err(PipelineError::from)
    }

    pub async fn get_stats(&self) -> Result<Stats> {
        let store = self.inner.store.clone();
        self.inner
            .cache
            .get_or_compute(
                STATS_KEY,
                self.inner.cache_config.stats_ttl,
                &[ARTICLES_TAG],
                || async move { store.article_stats().await },
            )
            .await
            .map_err(PipelineError::from)
    }

    /// Filtered article listing. Served straight from the store.
    pub async fn get_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        let filter = ArticleFilter {
            min_relevance: filter.min_relevance.clamp(0.0, 1.0),
            limit: filter.limit.clamp(1, MAX_ARTICLES_LIMIT),
            offset: filter.offset.max(0),
            ..filter.clone()
        };
        Ok(self.inner.store.list_articles(&filter).await?)
    }

    pub async fn mark_seen(&self, article_ids: &[Uuid]) -> Result<u64> {
        if article_ids.is_empty() {
            return Ok(0);
        }
        let updated = self.inner.store.mark_seen(article_ids).await?;
        if updated > 0 {
            self.inner.cache.invalidate(ARTICLES_TAG).await;
        }
        Ok(updated)
    }

    /// Wait for detached enrichment tasks.
    pub async fn drain(&self) {
        self.inner.enrichment.drain().await;
    }
}

fn absorb(aggregate: &mut CrawlJob, job: &CrawlJob) {
    aggregate.pages_scraped += job.pages_scraped;
    aggregate.articles_found += job.articles_found;
    aggregate.articles_updated += job.articles_updated;
    aggregate.subdomains_found += job.subdomains_found;
    aggregate.duplicates_skipped += job.duplicates_skipped;
    aggregate
        .page_errors
        .0
        .extend(job.page_errors.0.iter().cloned());
}

fn count_failed(statuses: &[JobStatus]) -> usize {
    statuses.iter().filter(|s| **s == JobStatus::Failed).count()
}

/// `done` when every pass is done, `failed` when every pass failed,
/// `partial` for anything in between. No sites is a trivially done crawl.
pub fn aggregate_status(statuses: &[JobStatus]) -> JobStatus {
    if statuses.iter().all(|s| *s == JobStatus::Done) {
        JobStatus::Done
    } else if statuses.iter().all(|s| *s == JobStatus::Failed) {
        JobStatus::Failed
    } else {
        JobStatus::Partial
    }
}
