#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsdesk::config::{Config, CrawlBudget};
use newsdesk::dedup::Fingerprint;
use newsdesk::entities::{
    Article, ArticleFilter, CrawlJob, Criterion, Enrichment, NewArticle, Site, Stats,
};
use newsdesk::fetcher::{FetchError, PageBody, RawResponse, Transport, Validators};
use newsdesk::pipeline::Pipeline;
use newsdesk::repositories::{ArticleWrite, MemoryStore, Store, StoreError, SubdomainWrite};
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

/// How the scripted transport answers one URL.
#[derive(Debug, Clone)]
pub enum Route {
    /// 200 with this HTML; 304 when the request carries the same ETag.
    Page { html: String, etag: Option<String> },
    /// Like `Page`, after sleeping.
    Slow { html: String, delay: Duration },
    Status(u16),
    Timeout,
}

/// In-memory [`Transport`] that serves canned routes and records every
/// request it sees. Unknown URLs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<Request>>,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub validators: Validators,
    pub at: Instant,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }

    pub fn page(&self, url: &str, html: impl Into<String>) {
        self.route(
            url,
            Route::Page {
                html: html.into(),
                etag: None,
            },
        );
    }

    pub fn page_with_etag(&self, url: &str, html: impl Into<String>, etag: &str) {
        self.route(
            url,
            Route::Page {
                html: html.into(),
                etag: Some(etag.to_string()),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    /// When each request reached the transport, in arrival order.
    pub fn request_times(&self) -> Vec<Instant> {
        self.requests.lock().unwrap().iter().map(|r| r.at).collect()
    }

    pub fn requests_for(&self, url: &str) -> Vec<Validators> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .map(|r| r.validators.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn respond(url: &Url, status: StatusCode, etag: Option<String>, body: Option<String>) -> RawResponse {
    RawResponse {
        url_final: url.clone(),
        status,
        validators: Validators {
            etag,
            last_modified: None,
        },
        body: body.map(PageBody::utf8),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url, validators: &Validators) -> Result<RawResponse, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push(Request {
                url: url.to_string(),
                validators: validators.clone(),
                at: Instant::now(),
            });
        let route = self.routes.lock().unwrap().get(url.as_str()).cloned();

        match route {
            Some(Route::Page { html, etag }) => {
                if etag.is_some() && validators.etag == etag {
                    return Ok(respond(url, StatusCode::NOT_MODIFIED, etag, None));
                }
                Ok(respond(url, StatusCode::OK, etag, Some(html)))
            }
            Some(Route::Slow { html, delay }) => {
                tokio::time::sleep(delay).await;
                Ok(respond(url, StatusCode::OK, None, Some(html)))
            }
            Some(Route::Status(code)) => {
                let status = StatusCode::from_u16(code).unwrap();
                Ok(respond(url, status, None, None))
            }
            Some(Route::Timeout) => Err(FetchError::RequestTimeout),
            None => Ok(respond(url, StatusCode::NOT_FOUND, None, None)),
        }
    }
}

/// An article-like page: a heading and enough prose, plus links.
pub fn article_html(title: &str, topic: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<li><a href="{href}">{href}</a></li>"#))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body>\
         <nav><ul>{anchors}</ul></nav>\
         <article><h1>{title}</h1>\
         <p>This report covers {topic} in depth. Engineers shared how {topic} changed \
         their daily work, which tools they adopted and what they would do differently.</p>\
         <p>Readers interested in {topic} will find links to further material below.</p>\
         </article></body></html>"
    )
}

/// A page with links but no article content.
pub fn index_html(links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{href}">{href}</a>"#))
        .collect();
    format!("<html><head><title>Index</title></head><body>{anchors}</body></html>")
}

/// Budget with no per-host delay so tests do not wait on the limiter.
pub fn budget(max_depth: u32, max_pages: usize) -> CrawlBudget {
    CrawlBudget {
        max_depth,
        max_pages_per_domain: max_pages,
        per_host_delay: Duration::ZERO,
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.budget = budget(3, 50);
    config.crawl.concurrency = 2;
    config
}

pub fn pipeline(store: &Arc<MemoryStore>, transport: &Arc<ScriptedTransport>) -> Pipeline {
    pipeline_with(test_config(), store, transport)
}

pub fn pipeline_with(
    config: Config,
    store: &Arc<MemoryStore>,
    transport: &Arc<ScriptedTransport>,
) -> Pipeline {
    Pipeline::builder(config, store.clone(), transport.clone()).build()
}

pub fn pipeline_on(store: Arc<dyn Store>, transport: &Arc<ScriptedTransport>) -> Pipeline {
    Pipeline::builder(test_config(), store, transport.clone()).build()
}

/// [`MemoryStore`] whose next `n` relevance score writes fail.
pub struct FlakyScoreStore {
    pub inner: Arc<MemoryStore>,
    failures_left: AtomicUsize,
}

impl FlakyScoreStore {
    pub fn new(inner: Arc<MemoryStore>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures_left: AtomicUsize::new(failures),
        })
    }

    fn maybe_fail(&self) -> Result<(), StoreError> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Corrupt("score write failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyScoreStore {
    async fn save_site(&self, site: &Site) -> Result<(), StoreError> {
        self.inner.save_site(site).await
    }

    async fn load_site(&self, id: Uuid) -> Result<Option<Site>, StoreError> {
        self.inner.load_site(id).await
    }

    async fn record_scrape(
        &self,
        site_id: Uuid,
        validators: &Validators,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.record_scrape(site_id, validators, at).await
    }

    async fn load_site_by_domain(&self, domain: &str) -> Result<Option<Site>, StoreError> {
        self.inner.load_site_by_domain(domain).await
    }

    async fn list_active_sites(&self) -> Result<Vec<Site>, StoreError> {
        self.inner.list_active_sites().await
    }

    async fn list_subdomains(&self, parent_id: Uuid) -> Result<Vec<Site>, StoreError> {
        self.inner.list_subdomains(parent_id).await
    }

    async fn save_subdomain(
        &self,
        parent: &Site,
        url: &str,
        host: &str,
    ) -> Result<SubdomainWrite, StoreError> {
        self.inner.save_subdomain(parent, url, host).await
    }

    async fn is_fingerprint_known(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        self.inner.is_fingerprint_known(fingerprint).await
    }

    async fn register_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        article_id: Uuid,
    ) -> Result<bool, StoreError> {
        self.inner.register_fingerprint(fingerprint, article_id).await
    }

    async fn save_article(&self, article: NewArticle) -> Result<ArticleWrite, StoreError> {
        self.inner.save_article(article).await
    }

    async fn load_article(&self, id: Uuid) -> Result<Option<Article>, StoreError> {
        self.inner.load_article(id).await
    }

    async fn load_active_criteria(&self) -> Result<Vec<Criterion>, StoreError> {
        self.inner.load_active_criteria().await
    }

    async fn load_criterion(&self, id: Uuid) -> Result<Option<Criterion>, StoreError> {
        self.inner.load_criterion(id).await
    }

    async fn list_articles_for_scoring(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        self.inner.list_articles_for_scoring(after, limit).await
    }

    async fn save_relevance_score(
        &self,
        article_id: Uuid,
        criterion_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError> {
        self.maybe_fail()?;
        self.inner
            .save_relevance_score(article_id, criterion_id, score)
            .await
    }

    async fn save_relevance_scores(
        &self,
        article_id: Uuid,
        scores: &BTreeMap<Uuid, f64>,
    ) -> Result<(), StoreError> {
        self.maybe_fail()?;
        self.inner.save_relevance_scores(article_id, scores).await
    }

    async fn save_enrichment(
        &self,
        article_id: Uuid,
        enrichment: &Enrichment,
    ) -> Result<(), StoreError> {
        self.inner.save_enrichment(article_id, enrichment).await
    }

    async fn record_crawl_job(&self, job: &CrawlJob) -> Result<(), StoreError> {
        self.inner.record_crawl_job(job).await
    }

    async fn load_crawl_job(&self, id: Uuid) -> Result<Option<CrawlJob>, StoreError> {
        self.inner.load_crawl_job(id).await
    }

    async fn search_articles(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Article>, StoreError> {
        self.inner.search_articles(query, limit, offset).await
    }

    async fn article_stats(&self) -> Result<Stats, StoreError> {
        self.inner.article_stats().await
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError> {
        self.inner.list_articles(filter).await
    }

    async fn mark_seen(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        self.inner.mark_seen(ids).await
    }
}
