use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::cache::{ARTICLES_TAG, Cache};
use crate::crawler::{CandidateSink, IngestOutcome};
use crate::dedup::{DedupIndex, Fingerprint};
use crate::enrichment::EnrichmentDispatcher;
use crate::entities::{Article, Criterion, NewArticle, Site};
use crate::extractor::ArticleCandidate;
use crate::relevance::RelevanceScorer;
use crate::repositories::{ArticleWrite, Store, StoreError};

/// Dedup, score and persist extracted candidates.
pub struct Ingestor {
    store: Arc<dyn Store>,
    dedup: DedupIndex,
    scorer: RelevanceScorer,
    cache: Cache,
    enrichment: EnrichmentDispatcher,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        scorer: RelevanceScorer,
        cache: Cache,
        enrichment: EnrichmentDispatcher,
    ) -> Self {
        Self {
            dedup: DedupIndex::new(store.clone()),
            store,
            scorer,
            cache,
            enrichment,
        }
    }

    /// Score against every active criterion. Criteria are read per article
    /// so edits made during a pass apply to the rest of it.
    async fn score(&self, article: &Article) -> Result<(), StoreError> {
        let criteria = self.store.load_active_criteria().await?;
        if criteria.is_empty() {
            return Ok(());
        }
        let scores = self
            .scorer
            .score_all(&article.title, &article.content, &criteria);
        self.store.save_relevance_scores(article.id, &scores).await
    }

    /// Fill in scores a stored article lacks for active criteria, e.g. after
    /// an earlier pass failed between writing the article and scoring it.
    /// Returns whether anything was written.
    async fn score_missing(&self, article_id: Uuid) -> Result<bool, StoreError> {
        let Some(article) = self.store.load_article(article_id).await? else {
            return Ok(false);
        };
        let missing: Vec<Criterion> = self
            .store
            .load_active_criteria()
            .await?
            .into_iter()
            .filter(|c| !article.relevance_scores.contains_key(&c.id))
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }
        let scores = self
            .scorer
            .score_all(&article.title, &article.content, &missing);
        self.store.save_relevance_scores(article.id, &scores).await?;
        Ok(true)
    }
}

#[async_trait]
impl CandidateSink for Ingestor {
    #[instrument(skip_all, fields(site_id = %site.id, url = %candidate.url))]
    async fn ingest(
        &self,
        site: &Site,
        candidate: ArticleCandidate,
    ) -> Result<IngestOutcome, StoreError> {
        let article = NewArticle {
            site_id: site.id,
            url: candidate.url.to_string(),
            fingerprint: Fingerprint::compute(&candidate.title, &candidate.body),
            title: candidate.title,
            content: candidate.body,
            language: candidate.language,
            scraped_at: candidate.extracted_at,
        };

        match self.dedup.admit(article).await? {
            ArticleWrite::Inserted(article) => {
                self.score(&article).await?;
                self.cache.invalidate(ARTICLES_TAG).await;
                debug!(article_id = %article.id, "article stored");
                self.enrichment.dispatch(article);
                Ok(IngestOutcome::Inserted)
            }
            ArticleWrite::Updated(article) => {
                self.score(&article).await?;
                self.cache.invalidate(ARTICLES_TAG).await;
                debug!(article_id = %article.id, "article updated");
                Ok(IngestOutcome::Updated)
            }
            ArticleWrite::Duplicate { existing_id } => {
                if self.score_missing(existing_id).await? {
                    self.cache.invalidate(ARTICLES_TAG).await;
                    debug!(article_id = %existing_id, "backfilled relevance scores");
                }
                Ok(IngestOutcome::Duplicate)
            }
        }
    }
}
