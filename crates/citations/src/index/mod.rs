//! Corpus index contract
//!
//! The resolver only sees the corpus through [`CorpusIndex`]:
//! - phrase search on a normalized "volume reporter page" string
//! - nearby-page search for pin-cite-only citations
//!
//! Both accept status, court and year filters plus self-exclusion.
//! Backends:
//! - [`SearchIndexClient`]: HTTP search index
//! - [`InMemoryIndex`]: built from the database or from fixtures

pub mod memory;
pub mod search;

pub use memory::{IndexedDocument, InMemoryIndex};
pub use search::SearchIndexClient;

use crate::citation::CitationKey;
use async_trait::async_trait;
use citator_common::config::IndexConfig;
use citator_common::errors::{AppError, Result};
use citator_common::Repository;
use std::sync::Arc;

/// Filters for one corpus lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusQuery {
    /// Citation to match
    pub citation: CitationKey,
    pub precedential_status: String,
    /// Citing opinion, never returned as a hit
    pub exclude_opinion_id: Option<i64>,
    /// Cluster of the citing opinion, never returned as a hit
    pub exclude_cluster_id: Option<i64>,
    /// Inclusive filing-year window
    pub year_range: Option<(i32, i32)>,
    pub court_id: Option<String>,
}

impl CorpusQuery {
    /// Normalized phrase for the citation field
    pub fn phrase(&self) -> String {
        self.citation.to_string()
    }
}

/// One matching document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusHit {
    /// Representative opinion of the cluster
    pub opinion_id: i64,
    pub cluster_id: i64,
    pub case_name: String,
    /// Citations the document is known by
    pub citations: Vec<CitationKey>,
    /// First page of the document when found by nearby-page search
    pub start_page: Option<u32>,
}

#[async_trait]
pub trait CorpusIndex: Send + Sync {
    /// Documents carrying exactly the queried citation
    async fn phrase_search(&self, query: &CorpusQuery) -> Result<Vec<CorpusHit>>;

    /// Documents in the same volume and reporter starting at most `window`
    /// pages before the cited page. Only the closest preceding start page is
    /// returned; several hits mean several documents start there.
    async fn nearby_page_search(&self, query: &CorpusQuery, window: u32) -> Result<Vec<CorpusHit>>;
}

/// Keep the hits whose start page is the greatest one at or below the cited page
pub(crate) fn closest_preceding(
    hits: impl IntoIterator<Item = CorpusHit>,
    cited: &CitationKey,
    window: u32,
) -> Vec<CorpusHit> {
    let lowest = cited.page.saturating_sub(window);
    let mut best: Option<u32> = None;
    let mut kept: Vec<CorpusHit> = Vec::new();

    for mut hit in hits {
        let start = hit
            .citations
            .iter()
            .filter(|key| key.volume == cited.volume && key.reporter == cited.reporter)
            .map(|key| key.page)
            .filter(|page| (lowest..=cited.page).contains(page))
            .max();
        let Some(start) = start else {
            continue;
        };

        hit.start_page = Some(start);
        match best {
            Some(current) if start < current => {}
            Some(current) if start == current => kept.push(hit),
            _ => {
                best = Some(start);
                kept.clear();
                kept.push(hit);
            }
        }
    }

    kept
}

/// Build the configured corpus index
pub async fn build_index(
    config: &IndexConfig,
    repository: &Repository,
    page_size: u64,
) -> Result<Arc<dyn CorpusIndex>> {
    match config.backend.as_str() {
        "search" => Ok(Arc::new(SearchIndexClient::new(config)?)),
        "memory" => Ok(Arc::new(InMemoryIndex::load(repository, page_size).await?)),
        other => Err(AppError::Configuration {
            message: format!("Unknown index backend: {}", other),
        }),
    }
}
