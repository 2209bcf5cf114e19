//! In-memory corpus index
//!
//! Holds one document per cluster, keyed by every citation the cluster
//! carries. Suitable for small corpora and tests.

use super::{closest_preceding, CorpusHit, CorpusIndex, CorpusQuery};
use crate::citation::CitationKey;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use citator_common::db::CorpusEntry;
use citator_common::errors::Result;
use citator_common::Repository;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// A cluster as the index sees it
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    /// Opinion ids of the cluster; the first one represents it
    pub opinion_ids: Vec<i64>,
    pub cluster_id: i64,
    pub case_name: String,
    pub court_id: String,
    pub date_filed: Option<NaiveDate>,
    pub precedential_status: String,
    pub citations: Vec<CitationKey>,
}

impl IndexedDocument {
    /// Clusters without opinions cannot be cited and are skipped
    pub fn from_corpus_entry(entry: &CorpusEntry) -> Option<Self> {
        if entry.opinion_ids.is_empty() {
            return None;
        }
        let cluster = &entry.cluster;
        Some(Self {
            opinion_ids: entry.opinion_ids.clone(),
            cluster_id: cluster.id,
            case_name: cluster.case_name.clone(),
            court_id: cluster.court_id.clone(),
            date_filed: cluster.date_filed,
            precedential_status: cluster.precedential_status.clone(),
            citations: cluster
                .citation_strings()
                .into_iter()
                .filter_map(CitationKey::parse)
                .collect(),
        })
    }

    fn matches(&self, query: &CorpusQuery) -> bool {
        if self.precedential_status != query.precedential_status {
            return false;
        }
        if let Some(excluded) = query.exclude_opinion_id {
            if self.opinion_ids.contains(&excluded) {
                return false;
            }
        }
        if query.exclude_cluster_id == Some(self.cluster_id) {
            return false;
        }
        if let Some((start, end)) = query.year_range {
            match self.date_filed {
                Some(date) if (start..=end).contains(&date.year()) => {}
                _ => return false,
            }
        }
        if let Some(court) = &query.court_id {
            if &self.court_id != court {
                return false;
            }
        }
        true
    }

    fn hit(&self) -> Option<CorpusHit> {
        Some(CorpusHit {
            opinion_id: *self.opinion_ids.first()?,
            cluster_id: self.cluster_id,
            case_name: self.case_name.clone(),
            citations: self.citations.clone(),
            start_page: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIndex {
    documents: Vec<IndexedDocument>,
    by_citation: HashMap<CitationKey, Vec<usize>>,
    by_volume: HashMap<(u32, String), Vec<usize>>,
}

impl InMemoryIndex {
    pub fn from_documents(documents: Vec<IndexedDocument>) -> Self {
        let mut by_citation: HashMap<CitationKey, Vec<usize>> = HashMap::new();
        let mut by_volume: HashMap<(u32, String), Vec<usize>> = HashMap::new();

        for (position, document) in documents.iter().enumerate() {
            for key in &document.citations {
                let entries = by_citation.entry(key.clone()).or_default();
                if !entries.contains(&position) {
                    entries.push(position);
                }
                let entries = by_volume
                    .entry((key.volume, key.reporter.clone()))
                    .or_default();
                if !entries.contains(&position) {
                    entries.push(position);
                }
            }
        }

        Self {
            documents,
            by_citation,
            by_volume,
        }
    }

    /// Stream every cluster from the database
    pub async fn load(repository: &Repository, page_size: u64) -> Result<Self> {
        let started = Instant::now();
        let mut documents = Vec::new();
        let mut after = 0_i64;

        loop {
            let page = repository.corpus_page(after, page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.cluster.id;
            documents.extend(page.iter().filter_map(IndexedDocument::from_corpus_entry));
            debug!(loaded = documents.len(), "Loading corpus");
        }

        info!(
            documents = documents.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "In-memory corpus index built"
        );
        Ok(Self::from_documents(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn collect(&self, positions: Option<&Vec<usize>>, query: &CorpusQuery) -> Vec<CorpusHit> {
        positions
            .into_iter()
            .flatten()
            .filter_map(|&position| self.documents.get(position))
            .filter(|document| document.matches(query))
            .filter_map(IndexedDocument::hit)
            .collect()
    }
}

#[async_trait]
impl CorpusIndex for InMemoryIndex {
    async fn phrase_search(&self, query: &CorpusQuery) -> Result<Vec<CorpusHit>> {
        Ok(self.collect(self.by_citation.get(&query.citation), query))
    }

    async fn nearby_page_search(&self, query: &CorpusQuery, window: u32) -> Result<Vec<CorpusHit>> {
        let volume_key = (query.citation.volume, query.citation.reporter.clone());
        let hits = self.collect(self.by_volume.get(&volume_key), query);
        Ok(closest_preceding(hits, &query.citation, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(opinion_id: i64, case_name: &str, year: i32, citations: &[&str]) -> IndexedDocument {
        IndexedDocument {
            opinion_ids: vec![opinion_id],
            cluster_id: opinion_id * 10,
            case_name: case_name.to_string(),
            court_id: "scotus".to_string(),
            date_filed: NaiveDate::from_ymd_opt(year, 1, 22),
            precedential_status: "Published".to_string(),
            citations: citations.iter().filter_map(|c| CitationKey::parse(c)).collect(),
        }
    }

    fn query(citation: &str) -> CorpusQuery {
        CorpusQuery {
            citation: CitationKey::parse(citation).unwrap(),
            precedential_status: "Published".to_string(),
            exclude_opinion_id: None,
            exclude_cluster_id: None,
            year_range: None,
            court_id: None,
        }
    }

    fn index() -> InMemoryIndex {
        InMemoryIndex::from_documents(vec![
            document(1, "Roe v. Wade", 1973, &["410 U.S. 113", "93 S. Ct. 705"]),
            document(2, "Doe v. Bolton", 1973, &["410 U.S. 179"]),
        ])
    }

    #[tokio::test]
    async fn test_phrase_search() {
        let hits = index().phrase_search(&query("410 U.S. 113")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].opinion_id, 1);
        assert_eq!(hits[0].cluster_id, 10);

        let hits = index().phrase_search(&query("93 S. Ct. 705")).await.unwrap();
        assert_eq!(hits[0].opinion_id, 1);
    }

    #[tokio::test]
    async fn test_self_exclusion() {
        let mut q = query("410 U.S. 113");
        q.exclude_opinion_id = Some(1);
        assert!(index().phrase_search(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_citing_cluster_exclusion() {
        let mut q = query("410 U.S. 113");
        q.exclude_cluster_id = Some(10);
        assert!(index().phrase_search(&q).await.unwrap().is_empty());
        assert!(index().nearby_page_search(&q, 100).await.unwrap().is_empty());

        q.exclude_cluster_id = Some(20);
        assert_eq!(index().phrase_search(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_filters() {
        let mut q = query("410 U.S. 113");
        q.year_range = Some((1974, 1980));
        assert!(index().phrase_search(&q).await.unwrap().is_empty());

        let mut q = query("410 U.S. 113");
        q.court_id = Some("ca2".to_string());
        assert!(index().phrase_search(&q).await.unwrap().is_empty());

        let mut q = query("410 U.S. 113");
        q.precedential_status = "Unpublished".to_string();
        assert!(index().phrase_search(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearby_page_search() {
        let hits = index()
            .nearby_page_search(&query("410 U.S. 153"), 100)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].opinion_id, 1);
        assert_eq!(hits[0].start_page, Some(113));

        let hits = index()
            .nearby_page_search(&query("410 U.S. 190"), 100)
            .await
            .unwrap();
        assert_eq!(hits[0].opinion_id, 2);
    }
}
