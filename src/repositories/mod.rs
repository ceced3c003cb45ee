//! Persistence collaborator of the pipeline.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::dedup::Fingerprint;
use crate::entities::{
    Article, ArticleFilter, CrawlJob, Criterion, Enrichment, NewArticle, Site, Stats,
};
use crate::fetcher::Validators;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Result of writing an extracted article.
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleWrite {
    /// New fingerprint at a new URL.
    Inserted(Article),
    /// Known URL re-scraped with changed content. Not a new article.
    Updated(Article),
    /// Fingerprint already belongs to `existing_id`; nothing was written.
    Duplicate { existing_id: Uuid },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubdomainWrite {
    Created(Site),
    Existing(Site),
}

impl SubdomainWrite {
    pub fn site(&self) -> &Site {
        match self {
            Self::Created(site) | Self::Existing(site) => site,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace a site by id.
    async fn save_site(&self, site: &Site) -> Result<(), StoreError>;

    async fn load_site(&self, id: Uuid) -> Result<Option<Site>, StoreError>;

    /// Record a finished crawl of `site_id`. Touches only the validators and
    /// the scrape timestamps; empty `validators` keep the stored ones.
    async fn record_scrape(
        &self,
        site_id: Uuid,
        validators: &Validators,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Top-level site tracked for `domain`.
    async fn load_site_by_domain(&self, domain: &str) -> Result<Option<Site>, StoreError>;

    /// Active top-level sites, oldest first.
    async fn list_active_sites(&self) -> Result<Vec<Site>, StoreError>;

    async fn list_subdomains(&self, parent_id: Uuid) -> Result<Vec<Site>, StoreError>;

    /// Create a subdomain of `parent` once; later calls return the existing row.
    async fn save_subdomain(
        &self,
        parent: &Site,
        url: &str,
        host: &str,
    ) -> Result<SubdomainWrite, StoreError>;

    async fn is_fingerprint_known(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError>;

    /// Claim `fingerprint` for `article_id`. False if another article holds it.
    async fn register_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        article_id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Write an article and its fingerprint as one step.
    async fn save_article(&self, article: NewArticle) -> Result<ArticleWrite, StoreError>;

    async fn load_article(&self, id: Uuid) -> Result<Option<Article>, StoreError>;

    async fn load_active_criteria(&self) -> Result<Vec<Criterion>, StoreError>;

    async fn load_criterion(&self, id: Uuid) -> Result<Option<Criterion>, StoreError>;

    /// Active articles with id greater than `after`, ordered by id.
    async fn list_articles_for_scoring(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError>;

    async fn save_relevance_score(
        &self,
        article_id: Uuid,
        criterion_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError>;

    async fn save_relevance_scores(
        &self,
        article_id: Uuid,
        scores: &BTreeMap<Uuid, f64>,
    ) -> Result<(), StoreError> {
        for (criterion_id, score) in scores {
            self.save_relevance_score(article_id, *criterion_id, *score)
                .await?;
        }
        Ok(())
    }

    async fn save_enrichment(
        &self,
        article_id: Uuid,
        enrichment: &Enrichment,
    ) -> Result<(), StoreError>;

    /// Insert or update a job record by id.
    async fn record_crawl_job(&self, job: &CrawlJob) -> Result<(), StoreError>;

    async fn load_crawl_job(&self, id: Uuid) -> Result<Option<CrawlJob>, StoreError>;

    /// Case-insensitive substring search over title, summary and content of
    /// active articles, newest first.
    async fn search_articles(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Article>, StoreError>;

    async fn article_stats(&self) -> Result<Stats, StoreError>;

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError>;

    /// Returns how many articles changed state.
    async fn mark_seen(&self, ids: &[Uuid]) -> Result<u64, StoreError>;
}
