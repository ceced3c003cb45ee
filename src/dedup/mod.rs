//! Content fingerprints and the dedup gate in front of article persistence.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::entities::NewArticle;
use crate::repositories::{ArticleWrite, Store, StoreError};

/// Number of body characters that take part in a fingerprint.
pub const FINGERPRINT_BODY_PREFIX: usize = 500;

/// SHA-256 over the normalized title and a bounded body prefix. Two
/// candidates with equal fingerprints are the same article.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn compute(title: &str, body: &str) -> Self {
        Self::compute_with_prefix(title, body, FINGERPRINT_BODY_PREFIX)
    }

    pub fn compute_with_prefix(title: &str, body: &str, prefix_chars: usize) -> Self {
        let title = title.trim().to_lowercase();
        let body: String = body.trim().chars().take(prefix_chars).collect();
        let body = body.to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        // Separator keeps ("ab", "c") apart from ("a", "bc")
        hasher.update([0u8]);
        hasher.update(body.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid fingerprint: {0:?}")]
pub struct InvalidFingerprint(String);

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 || !s.is_ascii() {
            return Err(InvalidFingerprint(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| InvalidFingerprint(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Serializes writes per fingerprint in front of the store.
///
/// The store already makes fingerprint registration and the article write a
/// single atomic step; the lock table additionally keeps concurrent workers
/// of this process from racing on near-identical pages, so only one of them
/// talks to the store for a given fingerprint at a time.
#[derive(Clone)]
pub struct DedupIndex {
    store: Arc<dyn Store>,
    locks: Arc<DashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl DedupIndex {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn is_duplicate(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        self.store.is_fingerprint_known(fingerprint).await
    }

    /// Write an article unless its fingerprint is already known.
    pub async fn admit(&self, article: NewArticle) -> Result<ArticleWrite, StoreError> {
        let fingerprint = article.fingerprint;
        let lock = self.locks.entry(fingerprint).or_default().clone();

        let outcome = {
            let _guard = lock.lock().await;
            self.store.save_article(article).await
        };

        // Drop the lock entry once nobody else holds or waits on it.
        self.locks
            .remove_if(&fingerprint, |_, l| Arc::strong_count(l) <= 2);
        drop(lock);

        if let Ok(ArticleWrite::Duplicate { existing_id }) = &outcome {
            debug!(%fingerprint, %existing_id, "duplicate article skipped");
        }
        outcome
    }

    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}
