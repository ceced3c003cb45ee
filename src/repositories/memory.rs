//! In-memory store for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{ArticleWrite, Store, StoreError, SubdomainWrite};
use crate::dedup::Fingerprint;
use crate::entities::{
    Article, ArticleFilter, CrawlJob, Criterion, Enrichment, JobStatus, NewArticle, Site, Stats,
};
use crate::fetcher::Validators;

#[derive(Default)]
struct State {
    sites: HashMap<Uuid, Site>,
    articles: BTreeMap<Uuid, Article>,
    by_url: HashMap<String, Uuid>,
    fingerprints: HashMap<Fingerprint, Uuid>,
    criteria: HashMap<Uuid, Criterion>,
    jobs: HashMap<Uuid, CrawlJob>,
}

/// Every operation takes one lock, so each call is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Criteria are owned by the API side; this stands in for it.
    pub fn upsert_criterion(&self, criterion: Criterion) {
        self.state().criteria.insert(criterion.id, criterion);
    }

    pub fn article_count(&self) -> usize {
        self.state().articles.len()
    }

    pub fn articles(&self) -> Vec<Article> {
        self.state().articles.values().cloned().collect()
    }

    pub fn article_by_url(&self, url: &str) -> Option<Article> {
        let state = self.state();
        let id = state.by_url.get(url)?;
        state.articles.get(id).cloned()
    }

    pub fn jobs(&self) -> Vec<CrawlJob> {
        let mut jobs: Vec<CrawlJob> = self.state().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.started_at);
        jobs
    }

    pub fn sites(&self) -> Vec<Site> {
        let mut sites: Vec<Site> = self.state().sites.values().cloned().collect();
        sites.sort_by_key(|s| s.created_at);
        sites
    }
}

fn newest_first(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at).then(a.id.cmp(&b.id)));
}

fn page(articles: Vec<Article>, limit: i64, offset: i64) -> Vec<Article> {
    articles
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_site(&self, site: &Site) -> Result<(), StoreError> {
        self.state().sites.insert(site.id, site.clone());
        Ok(())
    }

    async fn load_site(&self, id: Uuid) -> Result<Option<Site>, StoreError> {
        Ok(self.state().sites.get(&id).cloned())
    }

    async fn record_scrape(
        &self,
        site_id: Uuid,
        validators: &Validators,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let site = state.sites.get_mut(&site_id).ok_or(StoreError::NotFound {
            entity: "site",
            id: site_id,
        })?;
        site.mark_scraped(validators.clone(), at);
        Ok(())
    }

    async fn load_site_by_domain(&self, domain: &str) -> Result<Option<Site>, StoreError> {
        Ok(self
            .state()
            .sites
            .values()
            .find(|s| s.parent_id.is_none() && s.domain == domain)
            .cloned())
    }

    async fn list_active_sites(&self) -> Result<Vec<Site>, StoreError> {
        let mut sites: Vec<Site> = self
            .state()
            .sites
            .values()
            .filter(|s| s.is_active && s.parent_id.is_none())
            .cloned()
            .collect();
        sites.sort_by_key(|s| s.created_at);
        Ok(sites)
    }

    async fn list_subdomains(&self, parent_id: Uuid) -> Result<Vec<Site>, StoreError> {
        let mut sites: Vec<Site> = self
            .state()
            .sites
            .values()
            .filter(|s| s.parent_id == Some(parent_id))
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(sites)
    }

    async fn save_subdomain(
        &self,
        parent: &Site,
        url: &str,
        host: &str,
    ) -> Result<SubdomainWrite, StoreError> {
        let mut state = self.state();
        if let Some(existing) = state
            .sites
            .values()
            .find(|s| s.parent_id == Some(parent.id) && s.domain == host)
        {
            return Ok(SubdomainWrite::Existing(existing.clone()));
        }

        let site = Site::subdomain_of(parent, url, host);
        state.sites.insert(site.id, site.clone());
        Ok(SubdomainWrite::Created(site))
    }

    async fn is_fingerprint_known(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.state().fingerprints.contains_key(fingerprint))
    }

    async fn register_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        article_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        if state.fingerprints.contains_key(fingerprint) {
            return Ok(false);
        }
        state.fingerprints.insert(*fingerprint, article_id);
        Ok(true)
    }

    async fn save_article(&self, article: NewArticle) -> Result<ArticleWrite, StoreError> {
        let mut state = self.state();
        let state = &mut *state;

        if let Some(&holder) = state.fingerprints.get(&article.fingerprint) {
            let existing = state
                .articles
                .get_mut(&holder)
                .ok_or_else(|| StoreError::Corrupt(format!("fingerprint points at missing article {holder}")))?;

            let changed = existing.title != article.title || existing.content != article.content;
            if existing.url == article.url && changed {
                existing.title = article.title;
                existing.content = article.content;
                existing.language = article.language;
                existing.scraped_at = article.scraped_at;
                return Ok(ArticleWrite::Updated(existing.clone()));
            }
            return Ok(ArticleWrite::Duplicate { existing_id: holder });
        }

        if let Some(&id) = state.by_url.get(&article.url) {
            let existing = state
                .articles
                .get_mut(&id)
                .ok_or_else(|| StoreError::Corrupt(format!("url index points at missing article {id}")))?;

            if let Ok(old) = existing.fingerprint.parse::<Fingerprint>() {
                state.fingerprints.remove(&old);
            }
            state.fingerprints.insert(article.fingerprint, id);

            existing.title = article.title;
            existing.content = article.content;
            existing.fingerprint = article.fingerprint.to_string();
            existing.language = article.language;
            existing.scraped_at = article.scraped_at;
            return Ok(ArticleWrite::Updated(existing.clone()));
        }

        let id = Uuid::new_v4();
        state.fingerprints.insert(article.fingerprint, id);
        state.by_url.insert(article.url.clone(), id);
        let stored = article.into_article(id);
        state.articles.insert(id, stored.clone());
        Ok(ArticleWrite::Inserted(stored))
    }

    async fn load_article(&self, id: Uuid) -> Result<Option<Article>, StoreError> {
        Ok(self.state().articles.get(&id).cloned())
    }

    async fn load_active_criteria(&self) -> Result<Vec<Criterion>, StoreError> {
        let mut criteria: Vec<Criterion> = self
            .state()
            .criteria
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        criteria.sort_by_key(|c| c.created_at);
        Ok(criteria)
    }

    async fn load_criterion(&self, id: Uuid) -> Result<Option<Criterion>, StoreError> {
        Ok(self.state().criteria.get(&id).cloned())
    }

    async fn list_articles_for_scoring(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let state = self.state();
        let range = match after {
            Some(after) => state
                .articles
                .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded)),
            None => state.articles.range(..),
        };
        Ok(range
            .map(|(_, a)| a)
            .filter(|a| a.is_active)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn save_relevance_score(
        &self,
        article_id: Uuid,
        criterion_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let article = state.articles.get_mut(&article_id).ok_or(StoreError::NotFound {
            entity: "article",
            id: article_id,
        })?;
        article.relevance_scores.0.insert(criterion_id, score);
        Ok(())
    }

    async fn save_enrichment(
        &self,
        article_id: Uuid,
        enrichment: &Enrichment,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        let article = state.articles.get_mut(&article_id).ok_or(StoreError::NotFound {
            entity: "article",
            id: article_id,
        })?;
        if enrichment.summary.is_some() {
            article.summary = enrichment.summary.clone();
        }
        article.categories = Json(enrichment.categories.clone());
        article.tags = Json(enrichment.tags.clone());
        Ok(())
    }

    async fn record_crawl_job(&self, job: &CrawlJob) -> Result<(), StoreError> {
        self.state().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_crawl_job(&self, id: Uuid) -> Result<Option<CrawlJob>, StoreError> {
        Ok(self.state().jobs.get(&id).cloned())
    }

    async fn search_articles(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let needle = query.to_lowercase();
        let mut hits: Vec<Article> = self
            .state()
            .articles
            .values()
            .filter(|a| a.is_active)
            .filter(|a| {
                a.title.to_lowercase().contains(&needle)
                    || a.content.to_lowercase().contains(&needle)
                    || a.summary
                        .as_deref()
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        newest_first(&mut hits);
        Ok(page(hits, limit, offset))
    }

    async fn article_stats(&self) -> Result<Stats, StoreError> {
        let state = self.state();
        let active_articles = state.articles.values().filter(|a| a.is_active);
        Ok(Stats {
            total_sites: state.sites.values().filter(|s| s.is_active).count() as i64,
            total_articles: active_articles.clone().count() as i64,
            total_criteria: state.criteria.values().filter(|c| c.is_active).count() as i64,
            unseen_articles: active_articles.filter(|a| !a.is_seen).count() as i64,
            active_jobs: state
                .jobs
                .values()
                .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Running))
                .count() as i64,
        })
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError> {
        let mut hits: Vec<Article> = self
            .state()
            .articles
            .values()
            .filter(|a| a.is_active)
            .filter(|a| !filter.unseen_only || !a.is_seen)
            .filter(|a| match filter.criterion_id {
                Some(id) => a.relevance_scores.contains_key(&id) && a.relevance_for(id) >= filter.min_relevance,
                None => true,
            })
            .cloned()
            .collect();

        newest_first(&mut hits);
        if let Some(id) = filter.criterion_id {
            // stable sort keeps newest-first among equal scores
            hits.sort_by(|a, b| b.relevance_for(id).total_cmp(&a.relevance_for(id)));
        }
        Ok(page(hits, filter.limit, filter.offset))
    }

    async fn mark_seen(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut state = self.state();
        let mut changed = 0;
        for id in ids {
            if let Some(article) = state.articles.get_mut(id)
                && !article.is_seen
            {
                article.is_seen = true;
                changed += 1;
            }
        }
        Ok(changed)
    }
}
