use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::dedup::Fingerprint;
use crate::fetcher::Validators;

/// --- PostgreSQL Enums ---
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Partial,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Partial)
    }
}

/// --- Tables ---

/// A tracked root URL. Subdomains discovered during a crawl are Sites with
/// a `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Site {
    pub id: Uuid,
    pub url: String,
    pub domain: String,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn new(url: impl Into<String>, domain: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            domain: domain.into(),
            parent_id: None,
            is_active: true,
            last_scraped_at: None,
            etag: None,
            last_modified: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn subdomain_of(parent: &Site, url: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent.id),
            ..Self::new(url, domain)
        }
    }

    pub fn is_subdomain(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn validators(&self) -> Validators {
        Validators {
            etag: self.etag.clone(),
            last_modified: self.last_modified.clone(),
        }
    }

    /// Record a completed pass. Only called after a definitive 200/304.
    pub fn mark_scraped(&mut self, validators: Validators, at: DateTime<Utc>) {
        // A 304 often omits validators; keep the ones we sent.
        if validators.etag.is_some() || validators.last_modified.is_some() {
            self.etag = validators.etag;
            self.last_modified = validators.last_modified;
        }
        self.last_scraped_at = Some(at);
        self.updated_at = at;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: Uuid,
    pub site_id: Uuid,
    pub url: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub fingerprint: String,
    pub language: Option<String>,
    pub categories: Json<Vec<String>>,
    pub tags: Json<Vec<String>>,
    pub relevance_scores: Json<BTreeMap<Uuid, f64>>,
    pub is_seen: bool,
    pub is_active: bool,
    pub scraped_at: DateTime<Utc>,
}

impl Article {
    pub fn relevance_for(&self, criterion_id: Uuid) -> f64 {
        self.relevance_scores.get(&criterion_id).copied().unwrap_or(0.0)
    }
}

/// An article candidate that survived extraction and is about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub site_id: Uuid,
    pub url: String,
    pub title: String,
    pub content: String,
    pub fingerprint: Fingerprint,
    pub language: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl NewArticle {
    pub fn into_article(self, id: Uuid) -> Article {
        Article {
            id,
            site_id: self.site_id,
            url: self.url,
            title: self.title,
            content: self.content,
            summary: None,
            fingerprint: self.fingerprint.to_string(),
            language: self.language,
            categories: Json(Vec::new()),
            tags: Json(Vec::new()),
            relevance_scores: Json(BTreeMap::new()),
            is_seen: false,
            is_active: true,
            scraped_at: self.scraped_at,
        }
    }
}

/// A named interest filter. Owned by the external API; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Criterion {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Json<Vec<String>>,
    pub sentence: Option<String>,
    pub is_active: bool,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Criterion {
    pub fn new(name: impl Into<String>, keywords: Vec<String>, sentence: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            keywords: Json(keywords),
            sentence,
            is_active: true,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A page that failed inside an otherwise healthy pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    pub url: String,
    pub reason: String,
    /// A later pass may succeed where this one failed.
    #[serde(default)]
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CrawlJob {
    pub id: Uuid,
    /// `None` for the aggregate job recorded by `crawl_all`.
    pub site_id: Option<Uuid>,
    pub status: JobStatus,
    pub pages_scraped: i64,
    pub articles_found: i64,
    pub articles_updated: i64,
    pub subdomains_found: i64,
    pub duplicates_skipped: i64,
    pub page_errors: Json<Vec<PageError>>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlJob {
    pub fn start(site_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            site_id,
            status: JobStatus::Running,
            pages_scraped: 0,
            articles_found: 0,
            articles_updated: 0,
            subdomains_found: 0,
            duplicates_skipped: 0,
            page_errors: Json(Vec::new()),
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn finish(&mut self, status: JobStatus, error_message: Option<String>) {
        self.status = status;
        self.error_message = error_message;
        self.completed_at = Some(Utc::now());
    }
}

/// Aggregate counters served by `get_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_sites: i64,
    pub total_articles: i64,
    pub total_criteria: i64,
    pub unseen_articles: i64,
    pub active_jobs: i64,
}

/// Filter for `get_articles`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleFilter {
    pub criterion_id: Option<Uuid>,
    pub min_relevance: f64,
    pub unseen_only: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ArticleFilter {
    fn default() -> Self {
        Self {
            criterion_id: None,
            min_relevance: 0.0,
            unseen_only: false,
            limit: 100,
            offset: 0,
        }
    }
}

/// Output of the external enrichment collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}
