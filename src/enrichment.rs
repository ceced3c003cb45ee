//! Best-effort post-ingestion enrichment (summary, categories, tags).
//!
//! Enrichment runs detached from the crawl. A slow or failing enricher
//! only produces log lines.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::entities::{Article, Enrichment};
use crate::repositories::Store;

pub const DEFAULT_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("enrichment service unavailable: {0}")]
    Unavailable(String),

    #[error("enrichment response rejected: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, article: &Article) -> Result<Enrichment, EnrichmentError>;
}

/// Used when no enrichment service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, _article: &Article) -> Result<Enrichment, EnrichmentError> {
        Ok(Enrichment::default())
    }
}

impl Enrichment {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.categories.is_empty() && self.tags.is_empty()
    }
}

/// Spawns one tracked task per article.
#[derive(Clone)]
pub struct EnrichmentDispatcher {
    enricher: Arc<dyn Enricher>,
    store: Arc<dyn Store>,
    timeout: Duration,
    tasks: TaskTracker,
}

impl EnrichmentDispatcher {
    pub fn new(enricher: Arc<dyn Enricher>, store: Arc<dyn Store>) -> Self {
        Self {
            enricher,
            store,
            timeout: DEFAULT_ENRICHMENT_TIMEOUT,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fire and forget.
    pub fn dispatch(&self, article: Article) {
        let enricher = self.enricher.clone();
        let store = self.store.clone();
        let timeout = self.timeout;
        self.tasks
            .spawn(async move { enrich_one(enricher, store, timeout, article).await });
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every dispatched task to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

#[instrument(skip_all, fields(article_id = %article.id))]
async fn enrich_one(
    enricher: Arc<dyn Enricher>,
    store: Arc<dyn Store>,
    timeout: Duration,
    article: Article,
) {
    let article_id: Uuid = article.id;
    let enrichment = match tokio::time::timeout(timeout, enricher.enrich(&article)).await {
        Ok(Ok(enrichment)) => enrichment,
        Ok(Err(err)) => {
            warn!(error = %err, "enrichment failed");
            return;
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "enrichment timed out");
            return;
        }
    };

    if enrichment.is_empty() {
        debug!("nothing to enrich");
        return;
    }

    if let Err(err) = store.save_enrichment(article_id, &enrichment).await {
        warn!(error = %err, "failed to save enrichment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::Fingerprint;
    use crate::entities::NewArticle;
    use crate::repositories::{ArticleWrite, MemoryStore};
    use chrono::Utc;

    struct Tagger;

    #[async_trait]
    impl Enricher for Tagger {
        async fn enrich(&self, article: &Article) -> Result<Enrichment, EnrichmentError> {
            Ok(Enrichment {
                summary: Some(format!("About {}", article.title)),
                categories: vec!["tech".into()],
                tags: vec!["rust".into()],
            })
        }
    }

    struct Hangs;

    #[async_trait]
    impl Enricher for Hangs {
        async fn enrich(&self, _article: &Article) -> Result<Enrichment, EnrichmentError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Enrichment::default())
        }
    }

    struct Down;

    #[async_trait]
    impl Enricher for Down {
        async fn enrich(&self, _article: &Article) -> Result<Enrichment, EnrichmentError> {
            Err(EnrichmentError::Unavailable("503".into()))
        }
    }

    async fn stored_article(store: &MemoryStore) -> Article {
        let new = NewArticle {
            site_id: Uuid::new_v4(),
            url: "https://example.com/a".into(),
            title: "Rust".into(),
            content: "Body".into(),
            fingerprint: Fingerprint::compute("Rust", "Body"),
            language: None,
            scraped_at: Utc::now(),
        };
        match store.save_article(new).await.unwrap() {
            ArticleWrite::Inserted(article) => article,
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_enrichment_is_saved() {
        let store = Arc::new(MemoryStore::new());
        let article = stored_article(&store).await;
        let dispatcher = EnrichmentDispatcher::new(Arc::new(Tagger), store.clone());

        dispatcher.dispatch(article.clone());
        dispatcher.drain().await;

        let saved = store.article_by_url(&article.url).unwrap();
        assert_eq!(saved.summary.as_deref(), Some("About Rust"));
        assert_eq!(saved.tags.0, vec!["rust".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_enricher_times_out() {
        let store = Arc::new(MemoryStore::new());
        let article = stored_article(&store).await;
        let dispatcher = EnrichmentDispatcher::new(Arc::new(Hangs), store.clone())
            .with_timeout(Duration::from_secs(60));

        dispatcher.dispatch(article.clone());
        dispatcher.drain().await;

        assert_eq!(dispatcher.in_flight(), 0);
        assert!(store.article_by_url(&article.url).unwrap().summary.is_none());
    }

    #[tokio::test]
    async fn test_failing_enricher_leaves_article_untouched() {
        let store = Arc::new(MemoryStore::new());
        let article = stored_article(&store).await;
        let dispatcher = EnrichmentDispatcher::new(Arc::new(Down), store.clone());

        dispatcher.dispatch(article.clone());
        dispatcher.drain().await;

        assert_eq!(store.article_by_url(&article.url).unwrap(), article);
    }
}
