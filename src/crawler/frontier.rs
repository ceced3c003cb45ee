use std::collections::{HashSet, VecDeque};
use url::Url;

use crate::crawler::domain::normalize_url;

/// A URL waiting to be fetched, with its distance from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
}

/// Breadth-first frontier for a single root within one pass.
///
/// Every URL is admitted at most once (keyed by its normalized form), so
/// cyclic link graphs terminate. The page budget counts URLs handed out for
/// fetching, not successful fetches.
#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    max_depth: u32,
    max_pages: usize,
    dispatched: usize,
}

impl Frontier {
    pub fn new(max_depth: u32, max_pages: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            max_depth,
            max_pages,
            dispatched: 0,
        }
    }

    /// Mark a URL as seen without queueing it (e.g. a root fetched up front).
    pub fn mark_dispatched(&mut self, url: &Url) -> bool {
        if self.seen.insert(normalize_url(url)) {
            self.dispatched += 1;
            true
        } else {
            false
        }
    }

    /// Record a URL as visited without spending page budget, e.g. the
    /// final URL a redirected root resolved to.
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.seen.insert(normalize_url(url))
    }

    /// Queue a URL unless it is too deep or already seen this pass.
    pub fn push(&mut self, url: Url, depth: u32) -> bool {
        if depth > self.max_depth {
            return false;
        }
        if !self.seen.insert(normalize_url(&url)) {
            return false;
        }
        self.queue.push_back(FrontierEntry { url, depth });
        true
    }

    /// Next URL to fetch, if the page budget allows another fetch.
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        if self.budget_exhausted() {
            return None;
        }
        let entry = self.queue.pop_front()?;
        self.dispatched += 1;
        Some(entry)
    }

    pub fn budget_exhausted(&self) -> bool {
        self.dispatched >= self.max_pages
    }

    /// Whether links found at `depth` may still be followed.
    pub fn follows_links_at(&self, depth: u32) -> bool {
        depth < self.max_depth
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
