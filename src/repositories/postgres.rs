//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ArticleWrite, Store, StoreError, SubdomainWrite};
use crate::dedup::Fingerprint;
use crate::entities::{
    Article, ArticleFilter, CrawlJob, Criterion, Enrichment, NewArticle, Site, Stats,
};
use crate::fetcher::Validators;

const SITE_COLUMNS: &str = "id, url, domain, parent_id, is_active, last_scraped_at, etag, \
                            last_modified, created_at, updated_at";

const ARTICLE_COLUMNS: &str = "id, site_id, url, title, content, summary, fingerprint, language, \
                               categories, tags, relevance_scores, is_seen, is_active, scraped_at";

const CRITERION_COLUMNS: &str = "id, name, description, keywords, sentence, is_active, \
                                 usage_count, created_at, updated_at";

const JOB_COLUMNS: &str = "id, site_id, status, pages_scraped, articles_found, articles_updated, \
                           subdomains_found, duplicates_skipped, page_errors, error_message, \
                           started_at, completed_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply pending migrations; no-op when up to date.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Criteria are written by the API; this mirrors its upsert.
    pub async fn upsert_criterion(&self, criterion: &Criterion) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO criteria
                  (id, name, description, keywords, sentence, is_active, usage_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE
              SET name        = EXCLUDED.name,
                  description = EXCLUDED.description,
                  keywords    = EXCLUDED.keywords,
                  sentence    = EXCLUDED.sentence,
                  is_active   = EXCLUDED.is_active,
                  updated_at  = EXCLUDED.updated_at
            "#,
        )
        .bind(criterion.id)
        .bind(&criterion.name)
        .bind(&criterion.description)
        .bind(&criterion.keywords)
        .bind(&criterion.sentence)
        .bind(criterion.is_active)
        .bind(criterion.usage_count)
        .bind(criterion.created_at)
        .bind(criterion.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Escape `%`, `_` and `\` for use inside an ILIKE pattern.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl Store for PgStore {
    async fn save_site(&self, site: &Site) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sites
                  (id, url, domain, parent_id, is_active, last_scraped_at, etag, last_modified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE
              SET url             = EXCLUDED.url,
                  domain          = EXCLUDED.domain,
                  is_active       = EXCLUDED.is_active,
                  last_scraped_at = EXCLUDED.last_scraped_at,
                  etag            = EXCLUDED.etag,
                  last_modified   = EXCLUDED.last_modified,
                  updated_at      = EXCLUDED.updated_at
            "#,
        )
        .bind(site.id)
        .bind(&site.url)
        .bind(&site.domain)
        .bind(site.parent_id)
        .bind(site.is_active)
        .bind(site.last_scraped_at)
        .bind(&site.etag)
        .bind(&site.last_modified)
        .bind(site.created_at)
        .bind(site.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_site(&self, id: Uuid) -> Result<Option<Site>, StoreError> {
        let site = sqlx::query_as::<_, Site>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    async fn record_scrape(
        &self,
        site_id: Uuid,
        validators: &Validators,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sites
               SET etag            = CASE WHEN $2::text IS NULL AND $3::text IS NULL THEN etag ELSE $2 END,
                   last_modified   = CASE WHEN $2::text IS NULL AND $3::text IS NULL THEN last_modified ELSE $3 END,
                   last_scraped_at = $4,
                   updated_at      = $4
             WHERE id = $1
            "#,
        )
        .bind(site_id)
        .bind(&validators.etag)
        .bind(&validators.last_modified)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "site",
                id: site_id,
            });
        }
        Ok(())
    }

    async fn load_site_by_domain(&self, domain: &str) -> Result<Option<Site>, StoreError> {
        let site = sqlx::query_as::<_, Site>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE domain = $1 AND parent_id IS NULL"
        ))
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    async fn list_active_sites(&self) -> Result<Vec<Site>, StoreError> {
        let sites = sqlx::query_as::<_, Site>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites
             WHERE is_active AND parent_id IS NULL
             ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sites)
    }

    async fn list_subdomains(&self, parent_id: Uuid) -> Result<Vec<Site>, StoreError> {
        let sites = sqlx::query_as::<_, Site>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE parent_id = $1 ORDER BY domain"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sites)
    }

    async fn save_subdomain(
        &self,
        parent: &Site,
        url: &str,
        host: &str,
    ) -> Result<SubdomainWrite, StoreError> {
        let candidate = Site::subdomain_of(parent, url, host);
        let created = sqlx::query_as::<_, Site>(&format!(
            r#"
            INSERT INTO sites (id, url, domain, parent_id, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            ON CONFLICT (parent_id, domain) WHERE parent_id IS NOT NULL DO NOTHING
            RETURNING {SITE_COLUMNS}
            "#
        ))
        .bind(candidate.id)
        .bind(&candidate.url)
        .bind(&candidate.domain)
        .bind(parent.id)
        .bind(candidate.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(site) = created {
            return Ok(SubdomainWrite::Created(site));
        }

        let existing = sqlx::query_as::<_, Site>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE parent_id = $1 AND domain = $2"
        ))
        .bind(parent.id)
        .bind(host)
        .fetch_one(&self.pool)
        .await?;
        Ok(SubdomainWrite::Existing(existing))
    }

    async fn is_fingerprint_known(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let known: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM article_fingerprints WHERE fingerprint = $1)",
        )
        .bind(fingerprint.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(known)
    }

    async fn register_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        article_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO article_fingerprints (fingerprint, article_id) VALUES ($1, $2)
             ON CONFLICT (fingerprint) DO NOTHING",
        )
        .bind(fingerprint.to_string())
        .bind(article_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_article(&self, article: NewArticle) -> Result<ArticleWrite, StoreError> {
        let fingerprint = article.fingerprint.to_string();
        let mut tx = self.pool.begin().await?;

        let by_url = sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = $1 FOR UPDATE"
        ))
        .bind(&article.url)
        .fetch_optional(&mut *tx)
        .await?;

        let candidate_id = by_url.as_ref().map_or_else(Uuid::new_v4, |a| a.id);

        // Blocks on a concurrent claim of the same fingerprint until it commits.
        let claimed: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO article_fingerprints (fingerprint, article_id) VALUES ($1, $2)
             ON CONFLICT (fingerprint) DO NOTHING
             RETURNING article_id",
        )
        .bind(&fingerprint)
        .bind(candidate_id)
        .fetch_optional(&mut *tx)
        .await?;

        let write = match (claimed, by_url) {
            (Some(_), Some(existing)) => {
                sqlx::query(
                    "DELETE FROM article_fingerprints WHERE fingerprint = $1 AND article_id = $2",
                )
                .bind(&existing.fingerprint)
                .bind(existing.id)
                .execute(&mut *tx)
                .await?;

                let updated = sqlx::query_as::<_, Article>(&format!(
                    r#"
                    UPDATE articles
                       SET title = $2, content = $3, fingerprint = $4, language = $5, scraped_at = $6
                     WHERE id = $1
                    RETURNING {ARTICLE_COLUMNS}
                    "#
                ))
                .bind(existing.id)
                .bind(&article.title)
                .bind(&article.content)
                .bind(&fingerprint)
                .bind(&article.language)
                .bind(article.scraped_at)
                .fetch_one(&mut *tx)
                .await?;
                ArticleWrite::Updated(updated)
            }
            (Some(_), None) => {
                let inserted = sqlx::query_as::<_, Article>(&format!(
                    r#"
                    INSERT INTO articles
                          (id, site_id, url, title, content, fingerprint, language, scraped_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING {ARTICLE_COLUMNS}
                    "#
                ))
                .bind(candidate_id)
                .bind(article.site_id)
                .bind(&article.url)
                .bind(&article.title)
                .bind(&article.content)
                .bind(&fingerprint)
                .bind(&article.language)
                .bind(article.scraped_at)
                .fetch_one(&mut *tx)
                .await?;
                ArticleWrite::Inserted(inserted)
            }
            (None, by_url) => {
                let holder: Uuid = sqlx::query_scalar(
                    "SELECT article_id FROM article_fingerprints WHERE fingerprint = $1",
                )
                .bind(&fingerprint)
                .fetch_one(&mut *tx)
                .await?;

                match by_url {
                    Some(existing)
                        if existing.id == holder
                            && (existing.title != article.title
                                || existing.content != article.content) =>
                    {
                        let updated = sqlx::query_as::<_, Article>(&format!(
                            r#"
                            UPDATE articles
                               SET title = $2, content = $3, language = $4, scraped_at = $5
                             WHERE id = $1
                            RETURNING {ARTICLE_COLUMNS}
                            "#
                        ))
                        .bind(existing.id)
                        .bind(&article.title)
                        .bind(&article.content)
                        .bind(&article.language)
                        .bind(article.scraped_at)
                        .fetch_one(&mut *tx)
                        .await?;
                        ArticleWrite::Updated(updated)
                    }
                    _ => ArticleWrite::Duplicate {
                        existing_id: holder,
                    },
                }
            }
        };

        tx.commit().await?;
        debug!(url = %article.url, %fingerprint, "article write committed");
        Ok(write)
    }

    async fn load_article(&self, id: Uuid) -> Result<Option<Article>, StoreError> {
        let article = sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    async fn load_active_criteria(&self) -> Result<Vec<Criterion>, StoreError> {
        let criteria = sqlx::query_as::<_, Criterion>(&format!(
            "SELECT {CRITERION_COLUMNS} FROM criteria WHERE is_active ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(criteria)
    }

    async fn load_criterion(&self, id: Uuid) -> Result<Option<Criterion>, StoreError> {
        let criterion = sqlx::query_as::<_, Criterion>(&format!(
            "SELECT {CRITERION_COLUMNS} FROM criteria WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(criterion)
    }

    async fn list_articles_for_scoring(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let articles = sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE is_active AND ($1::uuid IS NULL OR id > $1)
             ORDER BY id
             LIMIT $2"
        ))
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    async fn save_relevance_score(
        &self,
        article_id: Uuid,
        criterion_id: Uuid,
        score: f64,
    ) -> Result<(), StoreError> {
        let scores = BTreeMap::from([(criterion_id, score)]);
        self.save_relevance_scores(article_id, &scores).await
    }

    /// Single atomic merge into the JSONB score map.
    async fn save_relevance_scores(
        &self,
        article_id: Uuid,
        scores: &BTreeMap<Uuid, f64>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE articles SET relevance_scores = relevance_scores || $2 WHERE id = $1",
        )
        .bind(article_id)
        .bind(Json(scores))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "article",
                id: article_id,
            });
        }
        Ok(())
    }

    async fn save_enrichment(
        &self,
        article_id: Uuid,
        enrichment: &Enrichment,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE articles
               SET summary    = COALESCE($2, summary),
                   categories = $3,
                   tags       = $4
             WHERE id = $1
            "#,
        )
        .bind(article_id)
        .bind(&enrichment.summary)
        .bind(Json(&enrichment.categories))
        .bind(Json(&enrichment.tags))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "article",
                id: article_id,
            });
        }
        Ok(())
    }

    async fn record_crawl_job(&self, job: &CrawlJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO crawl_jobs
                  (id, site_id, status, pages_scraped, articles_found, articles_updated,
                   subdomains_found, duplicates_skipped, page_errors, error_message,
                   started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE
              SET status             = EXCLUDED.status,
                  pages_scraped      = EXCLUDED.pages_scraped,
                  articles_found     = EXCLUDED.articles_found,
                  articles_updated   = EXCLUDED.articles_updated,
                  subdomains_found   = EXCLUDED.subdomains_found,
                  duplicates_skipped = EXCLUDED.duplicates_skipped,
                  page_errors        = EXCLUDED.page_errors,
                  error_message      = EXCLUDED.error_message,
                  completed_at       = EXCLUDED.completed_at
            "#,
        )
        .bind(job.id)
        .bind(job.site_id)
        .bind(job.status)
        .bind(job.pages_scraped)
        .bind(job.articles_found)
        .bind(job.articles_updated)
        .bind(job.subdomains_found)
        .bind(job.duplicates_skipped)
        .bind(&job.page_errors)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_crawl_job(&self, id: Uuid) -> Result<Option<CrawlJob>, StoreError> {
        let job = sqlx::query_as::<_, CrawlJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM crawl_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn search_articles(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Article>, StoreError> {
        let articles = sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS} FROM articles
             WHERE is_active
               AND (title ILIKE $1 OR summary ILIKE $1 OR content ILIKE $1)
             ORDER BY scraped_at DESC, id
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(like_pattern(query))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    async fn article_stats(&self) -> Result<Stats, StoreError> {
        let (total_sites, total_articles, total_criteria, unseen_articles, active_jobs): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM sites WHERE is_active),
                (SELECT COUNT(*) FROM articles WHERE is_active),
                (SELECT COUNT(*) FROM criteria WHERE is_active),
                (SELECT COUNT(*) FROM articles WHERE is_active AND NOT is_seen),
                (SELECT COUNT(*) FROM crawl_jobs WHERE status IN ('pending', 'running'))
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Stats {
            total_sites,
            total_articles,
            total_criteria,
            unseen_articles,
            active_jobs,
        })
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError> {
        let articles = match filter.criterion_id {
            Some(criterion_id) => {
                sqlx::query_as::<_, Article>(&format!(
                    r#"
                    SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE is_active
                       AND (NOT $1 OR NOT is_seen)
                       AND relevance_scores ? $2
                       AND (relevance_scores ->> $2)::float8 >= $3
                     ORDER BY (relevance_scores ->> $2)::float8 DESC, scraped_at DESC, id
                     LIMIT $4 OFFSET $5
                    "#
                ))
                .bind(filter.unseen_only)
                .bind(criterion_id.to_string())
                .bind(filter.min_relevance)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Article>(&format!(
                    r#"
                    SELECT {ARTICLE_COLUMNS} FROM articles
                     WHERE is_active AND (NOT $1 OR NOT is_seen)
                     ORDER BY scraped_at DESC, id
                     LIMIT $2 OFFSET $3
                    "#
                ))
                .bind(filter.unseen_only)
                .bind(filter.limit)
                .bind(filter.offset)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(articles)
    }

    async fn mark_seen(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE articles SET is_seen = TRUE WHERE id = ANY($1) AND NOT is_seen")
                .bind(ids)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn setup_test_db() -> Option<PgStore> {
        // Skip tests if TEST_DATABASE_URL is not set
        let database_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("Skipping database tests: TEST_DATABASE_URL not set");
                return None;
            }
        };

        let store = PgStore::connect(&database_url, 5)
            .await
            .expect("Failed to connect to test database");
        store.migrate().await.expect("Failed to run migrations");
        Some(store)
    }

    async fn insert_test_site(store: &PgStore) -> Site {
        let domain = format!("{}.example.com", Uuid::new_v4().simple());
        let site = Site::new(format!("https://{domain}/"), domain);
        store.save_site(&site).await.expect("Failed to insert site");
        site
    }

    fn new_article(site: &Site, path: &str, title: &str, body: &str) -> NewArticle {
        NewArticle {
            site_id: site.id,
            url: format!("{}{path}", site.url),
            title: title.to_string(),
            content: body.to_string(),
            fingerprint: Fingerprint::compute(&format!("{}{title}", site.id), body),
            language: None,
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_sure\\"), "%100\\%\\_sure\\\\%");
    }

    #[tokio::test]
    async fn test_save_article_paths() {
        let Some(store) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let site = insert_test_site(&store).await;

        let first = store
            .save_article(new_article(&site, "a", "Story", "Body"))
            .await
            .expect("Failed to save article");
        let ArticleWrite::Inserted(first) = first else {
            panic!("expected insert, got {first:?}");
        };

        let mirror = store
            .save_article(new_article(&site, "mirror", "Story", "Body"))
            .await
            .expect("Failed to save mirror");
        assert_eq!(mirror, ArticleWrite::Duplicate { existing_id: first.id });

        let edited = store
            .save_article(new_article(&site, "a", "Story", "Edited body"))
            .await
            .expect("Failed to save edit");
        assert!(matches!(edited, ArticleWrite::Updated(ref a) if a.id == first.id));

        let old_fp: Fingerprint = first.fingerprint.parse().unwrap();
        assert!(!store.is_fingerprint_known(&old_fp).await.unwrap());
    }

    #[tokio::test]
    async fn test_relevance_scores_merge() {
        let Some(store) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let site = insert_test_site(&store).await;
        let ArticleWrite::Inserted(article) = store
            .save_article(new_article(&site, "scored", "Scored", "Body"))
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.save_relevance_score(article.id, a, 0.5).await.unwrap();
        store.save_relevance_score(article.id, b, 0.25).await.unwrap();
        store.save_relevance_score(article.id, a, 0.75).await.unwrap();

        let filter = ArticleFilter {
            criterion_id: Some(a),
            min_relevance: 0.7,
            limit: 500,
            ..ArticleFilter::default()
        };
        let hits = store.list_articles(&filter).await.unwrap();
        let hit = hits.iter().find(|h| h.id == article.id).expect("article listed");
        assert_eq!(hit.relevance_for(a), 0.75);
        assert_eq!(hit.relevance_for(b), 0.25);
    }

    #[tokio::test]
    async fn test_record_scrape_leaves_site_flags_alone() {
        let Some(store) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let mut site = insert_test_site(&store).await;
        site.is_active = false;
        store.save_site(&site).await.unwrap();

        let validators = Validators {
            etag: Some("\"v2\"".to_string()),
            last_modified: None,
        };
        store.record_scrape(site.id, &validators, Utc::now()).await.unwrap();
        store.record_scrape(site.id, &Validators::default(), Utc::now()).await.unwrap();

        let stored = store.load_site(site.id).await.unwrap().expect("site exists");
        assert!(!stored.is_active);
        assert_eq!(stored.etag.as_deref(), Some("\"v2\""));
        assert!(stored.last_scraped_at.is_some());
    }

    #[tokio::test]
    async fn test_subdomain_is_created_once() {
        let Some(store) = setup_test_db().await else {
            return; // Skip test if database not available
        };
        let parent = insert_test_site(&store).await;
        let host = format!("blog.{}", parent.domain);
        let url = format!("https://{host}/");

        let first = store.save_subdomain(&parent, &url, &host).await.unwrap();
        let second = store.save_subdomain(&parent, &url, &host).await.unwrap();
        assert!(first.is_created());
        assert_eq!(second, SubdomainWrite::Existing(first.site().clone()));
    }
}
