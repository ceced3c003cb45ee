//! Site crawl passes: root discovery, subdomain classification and bounded
//! breadth-first traversal under a page budget, a per-host delay, a
//! cancellation token and a wall-clock deadline.

pub mod domain;
pub mod frontier;
pub mod rate_limit;
pub mod report;

pub use frontier::{Frontier, FrontierEntry};
pub use rate_limit::RateLimiter;
pub use report::{IngestOutcome, PassCounters, PassReport, PassState};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::{CrawlBudget, CrawlSettings, SubdomainPolicy};
use crate::entities::{JobStatus, Site};
use crate::error::PipelineError;
use crate::extractor::{ArticleCandidate, Extractor};
use crate::fetcher::{FetchError, FetchOutcome, Fetcher, PageResponse, Validators};
use crate::repositories::{Store, StoreError};

use self::domain::{host_key, is_strict_subdomain, origin_root, registered_domain_of};

/// Receives every article candidate a pass extracts.
#[async_trait]
pub trait CandidateSink: Send + Sync {
    async fn ingest(
        &self,
        site: &Site,
        candidate: ArticleCandidate,
    ) -> Result<IngestOutcome, StoreError>;
}

#[derive(Clone)]
pub struct Crawler {
    fetcher: Fetcher,
    limiter: Arc<RateLimiter>,
    extractor: Extractor,
    store: Arc<dyn Store>,
    sink: Arc<dyn CandidateSink>,
    settings: CrawlSettings,
}

/// Everything a page worker needs, shared across one root's workers.
struct RootContext {
    crawler: Crawler,
    site: Site,
    host: String,
    limiter_key: String,
    budget: CrawlBudget,
    cancel: CancellationToken,
    counters: Arc<PassCounters>,
}

struct PageVisit {
    depth: u32,
    links: Vec<Url>,
}

/// How the crawl of one root ended.
enum RootEnd {
    Completed,
    Cancelled,
}

impl Crawler {
    pub fn new(
        fetcher: Fetcher,
        limiter: Arc<RateLimiter>,
        extractor: Extractor,
        store: Arc<dyn Store>,
        sink: Arc<dyn CandidateSink>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            fetcher,
            limiter,
            extractor,
            store,
            sink,
            settings,
        }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Run one pass over `site` and its subdomains.
    ///
    /// Page-level failures are recorded on the report. Only a store failure
    /// aborts the pass with an error.
    #[instrument(skip_all, fields(site_id = %site.id, url = %site.url))]
    pub async fn crawl_site(
        &self,
        site: Site,
        budget: &CrawlBudget,
        cancel: CancellationToken,
    ) -> Result<PassReport, StoreError> {
        let counters = Arc::new(PassCounters::default());
        let pass = self.run_pass(site, *budget, cancel.clone(), counters.clone());

        let report = match tokio::time::timeout(self.settings.pass_deadline, pass).await {
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                error!(
                    deadline_secs = self.settings.pass_deadline.as_secs(),
                    "pass deadline exceeded"
                );
                counters.report(
                    JobStatus::Failed,
                    Some(PipelineError::DeadlineExceeded.to_string()),
                )
            }
        };

        info!(
            status = ?report.status,
            pages = report.pages_scraped,
            new = report.articles_found,
            updated = report.articles_updated,
            duplicates = report.duplicates_skipped,
            subdomains = report.subdomains_found,
            page_errors = report.page_errors.len(),
            "pass finished"
        );
        Ok(report)
    }

    async fn run_pass(
        &self,
        site: Site,
        budget: CrawlBudget,
        cancel: CancellationToken,
        counters: Arc<PassCounters>,
    ) -> Result<PassReport, StoreError> {
        let mut state = PassState::Pending;
        let root_url = match Url::parse(&site.url) {
            Ok(url) => url,
            Err(err) => {
                transition(&mut state, PassState::Failed);
                return Ok(counters.report(
                    JobStatus::Failed,
                    Some(format!("invalid site url: {err}")),
                ));
            }
        };

        transition(&mut state, PassState::Discovering);
        let validators = site.validators();
        let root_fetch = self
            .fetch_root(&root_url, &validators, &budget, &cancel, &counters)
            .await;

        let (page, new_validators) = match root_fetch {
            RootFetch::Fresh(page, validators) => (page, validators),
            RootFetch::NotModified(validators) => {
                info!("root not modified, skipping pass");
                if cancel.is_cancelled() {
                    return Ok(counters.report(JobStatus::Partial, Some("cancelled".to_string())));
                }
                self.store
                    .record_scrape(site.id, &validators, Utc::now())
                    .await?;
                if self.settings.subdomain_policy == SubdomainPolicy::RevalidateIndependently {
                    transition(&mut state, PassState::Crawling);
                    self.crawl_subdomains(&site, &budget, &cancel, &counters)
                        .await?;
                }
                transition(&mut state, PassState::Done);
                return Ok(counters.report(pass_status(&cancel), None));
            }
            RootFetch::Cancelled => {
                return Ok(counters.report(JobStatus::Partial, Some("cancelled".to_string())));
            }
            RootFetch::Failed(err) => {
                transition(&mut state, PassState::Failed);
                error!(error = %err, "root fetch failed");
                return Ok(counters.report(
                    JobStatus::Failed,
                    Some(format!("root fetch failed: {}", PipelineError::from(&err))),
                ));
            }
        };

        let ctx = self.root_context(&site, &page.url_final, &budget, &cancel, &counters);
        let links = process_page(&ctx, &page).await?;
        self.discover_subdomains(&site, &root_url, &links, &counters)
            .await?;

        transition(&mut state, PassState::Crawling);
        let end = self.crawl_frontier(ctx, &root_url, &page.url_final, links).await?;
        self.crawl_subdomains(&site, &budget, &cancel, &counters)
            .await?;

        if matches!(end, RootEnd::Completed) && !cancel.is_cancelled() {
            self.store
                .record_scrape(site.id, &new_validators, Utc::now())
                .await?;
        }
        transition(&mut state, PassState::Done);
        Ok(counters.report(pass_status(&cancel), None))
    }

    fn root_context(
        &self,
        site: &Site,
        url: &Url,
        budget: &CrawlBudget,
        cancel: &CancellationToken,
        counters: &Arc<PassCounters>,
    ) -> Arc<RootContext> {
        Arc::new(RootContext {
            crawler: self.clone(),
            site: site.clone(),
            host: host_key(url).unwrap_or_default(),
            limiter_key: registered_domain_of(url).unwrap_or_default(),
            budget: *budget,
            cancel: cancel.clone(),
            counters: counters.clone(),
        })
    }

    async fn fetch_root(
        &self,
        url: &Url,
        validators: &Validators,
        budget: &CrawlBudget,
        cancel: &CancellationToken,
        counters: &PassCounters,
    ) -> RootFetch {
        let key = registered_domain_of(url).unwrap_or_default();
        self.limiter
            .acquire_with_delay(&key, budget.per_host_delay)
            .await;
        if cancel.is_cancelled() {
            return RootFetch::Cancelled;
        }

        match self.fetcher.fetch(url, validators).await {
            FetchOutcome::Fresh { page, validators } => {
                counters.page_scraped();
                RootFetch::Fresh(page, validators)
            }
            FetchOutcome::NotModified { validators } => RootFetch::NotModified(validators),
            FetchOutcome::Failed(err) => RootFetch::Failed(err),
        }
    }

    /// Record links pointing at strict subdomains of the site's registered
    /// domain as child sites. Re-discovery is a no-op.
    async fn discover_subdomains(
        &self,
        site: &Site,
        root_url: &Url,
        links: &[Url],
        counters: &PassCounters,
    ) -> Result<(), StoreError> {
        let Some(domain) = registered_domain_of(root_url) else {
            return Ok(());
        };
        let root_host = host_key(root_url);

        for link in links {
            let Some(host) = host_key(link) else { continue };
            if Some(&host) == root_host.as_ref() || !is_strict_subdomain(&host, &domain) {
                continue;
            }
            let Some(origin) = origin_root(link) else { continue };

            let write = self.store.save_subdomain(site, origin.as_str(), &host).await?;
            if write.is_created() {
                info!(subdomain = %host, "subdomain discovered");
                counters.subdomain_found();
            }
        }
        Ok(())
    }

    /// Each active subdomain is crawled as its own root with its own budget
    /// and validators. Its failures never fail the parent pass.
    async fn crawl_subdomains(
        &self,
        parent: &Site,
        budget: &CrawlBudget,
        cancel: &CancellationToken,
        counters: &Arc<PassCounters>,
    ) -> Result<(), StoreError> {
        for sub in self.store.list_subdomains(parent.id).await? {
            if cancel.is_cancelled() {
                break;
            }
            if !sub.is_active {
                continue;
            }
            let Ok(sub_url) = Url::parse(&sub.url) else {
                counters.page_failed(&sub.url, "invalid subdomain url");
                continue;
            };

            let validators = sub.validators();
            let (page, new_validators) = match self
                .fetch_root(&sub_url, &validators, budget, cancel, counters)
                .await
            {
                RootFetch::Fresh(page, validators) => (page, validators),
                RootFetch::NotModified(validators) => {
                    debug!(subdomain = %sub.domain, "subdomain not modified");
                    if cancel.is_cancelled() {
                        break;
                    }
                    self.store
                        .record_scrape(sub.id, &validators, Utc::now())
                        .await?;
                    continue;
                }
                RootFetch::Cancelled => break,
                RootFetch::Failed(err) => {
                    warn!(subdomain = %sub.domain, error = %err, "subdomain root fetch failed");
                    counters.fetch_failed(sub_url.as_str(), &err);
                    continue;
                }
            };

            let ctx = self.root_context(&sub, &page.url_final, budget, cancel, counters);
            let links = process_page(&ctx, &page).await?;
            let end = self.crawl_frontier(ctx, &sub_url, &page.url_final, links).await?;

            if matches!(end, RootEnd::Completed) && !cancel.is_cancelled() {
                self.store
                    .record_scrape(sub.id, &new_validators, Utc::now())
                    .await?;
            }
        }
        Ok(())
    }

    /// Breadth-first traversal of one root with at most `concurrency` pages
    /// in flight. The root page itself has already been processed.
    async fn crawl_frontier(
        &self,
        ctx: Arc<RootContext>,
        root_url: &Url,
        final_url: &Url,
        root_links: Vec<Url>,
    ) -> Result<RootEnd, StoreError> {
        let mut frontier = Frontier::new(
            ctx.budget.max_depth,
            ctx.budget.max_pages_per_domain,
        );
        frontier.mark_dispatched(root_url);
        frontier.mark_visited(final_url);
        enqueue_links(&mut frontier, &ctx.host, root_links, 0);

        let concurrency = self.settings.concurrency.max(1);
        let mut workers = JoinSet::new();

        loop {
            while workers.len() < concurrency && !ctx.cancel.is_cancelled() {
                let Some(entry) = frontier.pop() else { break };
                workers.spawn(visit_page(ctx.clone(), entry));
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            match joined {
                Ok(Ok(Some(visit))) => {
                    enqueue_links(&mut frontier, &ctx.host, visit.links, visit.depth)
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    workers.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    error!(error = %join_err, "page worker crashed");
                    ctx.counters
                        .page_failed(&ctx.site.url, format!("worker crashed: {join_err}"));
                }
            }
        }

        debug!(
            host = %ctx.host,
            dispatched = frontier.dispatched(),
            left_over = frontier.pending(),
            "frontier drained"
        );

        if ctx.cancel.is_cancelled() {
            Ok(RootEnd::Cancelled)
        } else {
            Ok(RootEnd::Completed)
        }
    }
}

enum RootFetch {
    Fresh(PageResponse, Validators),
    NotModified(Validators),
    Cancelled,
    Failed(FetchError),
}

fn transition(state: &mut PassState, next: PassState) {
    debug!(from = ?*state, to = ?next, "pass state");
    *state = next;
}

fn pass_status(cancel: &CancellationToken) -> JobStatus {
    if cancel.is_cancelled() {
        JobStatus::Partial
    } else {
        JobStatus::Done
    }
}

/// Queue same-host links found on a page at `depth`.
fn enqueue_links(frontier: &mut Frontier, host: &str, links: Vec<Url>, depth: u32) {
    if !frontier.follows_links_at(depth) {
        return;
    }
    for link in links {
        if host_key(&link).as_deref() == Some(host) {
            frontier.push(link, depth + 1);
        }
    }
}

async fn visit_page(
    ctx: Arc<RootContext>,
    entry: FrontierEntry,
) -> Result<Option<PageVisit>, StoreError> {
    ctx.crawler
        .limiter
        .acquire_with_delay(&ctx.limiter_key, ctx.budget.per_host_delay)
        .await;
    if ctx.cancel.is_cancelled() {
        debug!(url = %entry.url, "cancelled before fetch");
        return Ok(None);
    }

    match ctx
        .crawler
        .fetcher
        .fetch(&entry.url, &Validators::default())
        .await
    {
        FetchOutcome::Fresh { page, .. } => {
            ctx.counters.page_scraped();
            let links = process_page(&ctx, &page).await?;
            Ok(Some(PageVisit {
                depth: entry.depth,
                links,
            }))
        }
        FetchOutcome::NotModified { .. } => Ok(None),
        FetchOutcome::Failed(err) => {
            warn!(url = %entry.url, error = %err, "page skipped");
            ctx.counters.fetch_failed(entry.url.as_str(), &err);
            Ok(None)
        }
    }
}

/// Extract a fetched page and hand its candidates to the sink. Returns the
/// page's in-scope links.
#[instrument(skip_all, fields(url = %page.url_final))]
async fn process_page(ctx: &RootContext, page: &PageResponse) -> Result<Vec<Url>, StoreError> {
    let extraction = match ctx
        .crawler
        .extractor
        .extract(&page.body_utf8, &page.url_final)
    {
        Ok(extraction) => extraction,
        Err(err) => {
            warn!(error = %err, "page not parseable");
            ctx.counters
                .page_failed(page.url_final.as_str(), format!("parse: {err}"));
            return Ok(Vec::new());
        }
    };

    for candidate in extraction.candidates {
        let outcome = ctx.crawler.sink.ingest(&ctx.site, candidate).await?;
        ctx.counters.ingested(outcome);
    }
    Ok(extraction.links)
}
