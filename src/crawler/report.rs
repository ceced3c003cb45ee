use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entities::{CrawlJob, JobStatus, PageError};
use crate::error::PipelineError;
use crate::fetcher::FetchError;

/// Per-site pass lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassState {
    Pending,
    Discovering,
    Crawling,
    Done,
    Failed,
}

/// What a single ingested candidate turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated,
    Duplicate,
}

/// Counters shared by every worker of one pass. They live outside the
/// pass future so a deadline does not lose what was already done.
#[derive(Debug, Default)]
pub struct PassCounters {
    pages_scraped: AtomicU64,
    articles_found: AtomicU64,
    articles_updated: AtomicU64,
    subdomains_found: AtomicU64,
    duplicates_skipped: AtomicU64,
    page_errors: Mutex<Vec<PageError>>,
}

impl PassCounters {
    pub fn page_scraped(&self) {
        self.pages_scraped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subdomain_found(&self) {
        self.subdomains_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingested(&self, outcome: IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Inserted => &self.articles_found,
            IngestOutcome::Updated => &self.articles_updated,
            IngestOutcome::Duplicate => &self.duplicates_skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_failed(&self, url: &str, reason: impl Into<String>) {
        self.push_error(PageError {
            url: url.to_string(),
            reason: reason.into(),
            transient: false,
        });
    }

    pub fn fetch_failed(&self, url: &str, err: &FetchError) {
        self.push_error(PageError {
            url: url.to_string(),
            reason: PipelineError::from(err).to_string(),
            transient: err.is_transient(),
        });
    }

    fn push_error(&self, error: PageError) {
        self.page_errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(error);
    }

    pub fn report(&self, status: JobStatus, error: Option<String>) -> PassReport {
        let mut page_errors = self
            .page_errors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        page_errors.sort_by(|a, b| a.url.cmp(&b.url));

        PassReport {
            status,
            pages_scraped: self.pages_scraped.load(Ordering::Relaxed),
            articles_found: self.articles_found.load(Ordering::Relaxed),
            articles_updated: self.articles_updated.load(Ordering::Relaxed),
            subdomains_found: self.subdomains_found.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            page_errors,
            error,
        }
    }
}

/// Outcome of one site pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    pub status: JobStatus,
    pub pages_scraped: u64,
    pub articles_found: u64,
    pub articles_updated: u64,
    pub subdomains_found: u64,
    pub duplicates_skipped: u64,
    pub page_errors: Vec<PageError>,
    pub error: Option<String>,
}

impl PassReport {
    /// Copy counters and terminal status onto a job record.
    pub fn apply_to(&self, job: &mut CrawlJob) {
        job.pages_scraped += self.pages_scraped as i64;
        job.articles_found += self.articles_found as i64;
        job.articles_updated += self.articles_updated as i64;
        job.subdomains_found += self.subdomains_found as i64;
        job.duplicates_skipped += self.duplicates_skipped as i64;
        job.page_errors.0.extend(self.page_errors.iter().cloned());
    }
}
