//! HTTP search-index backend
//!
//! Queries an Elasticsearch-compatible `_search` endpoint. Each opinion is
//! one document with `id`, `cluster_id`, `case_name`, `court_id`, `status`,
//! `date_filed`, a `citation` text array and a nested `citation_parts`
//! (volume, reporter, page) array for nearby-page lookups.
//!
//! Requests pass through a token-bucket rate limiter and transient failures
//! are retried with exponential backoff.

use super::{closest_preceding, CorpusHit, CorpusIndex, CorpusQuery};
use crate::citation::CitationKey;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use citator_common::config::IndexConfig;
use citator_common::errors::{AppError, Result};
use citator_common::metrics;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Rate limiter shared by all queries of one client
pub type IndexRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Create the query rate limiter
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> Result<Arc<IndexRateLimiter>> {
    let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| AppError::Configuration {
        message: "index.requests_per_second must be positive".to_string(),
    })?;
    let burst = NonZeroU32::new(burst).unwrap_or(rate);
    let quota = Quota::per_second(rate).allow_burst(burst);

    Ok(Arc::new(RateLimiter::direct(quota)))
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<HitEnvelope>,
}

#[derive(Deserialize)]
struct HitEnvelope {
    #[serde(rename = "_source")]
    source: SearchDocument,
}

#[derive(Deserialize)]
struct SearchDocument {
    id: i64,
    cluster_id: i64,
    #[serde(default)]
    case_name: String,
    #[serde(default)]
    citation: Vec<String>,
}

/// Search-index client
pub struct SearchIndexClient {
    client: reqwest::Client,
    search_url: String,
    limiter: Arc<IndexRateLimiter>,
    max_hits: usize,
    max_retries: u32,
    max_retry_elapsed: Duration,
    timeout: Duration,
}

impl SearchIndexClient {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            search_url: format!(
                "{}/{}/_search",
                config.base_url.trim_end_matches('/'),
                config.index_name
            ),
            limiter: create_rate_limiter(config.requests_per_second, config.burst)?,
            max_hits: config.max_hits,
            max_retries: config.max_retries,
            max_retry_elapsed: Duration::from_secs(config.max_retry_elapsed_secs),
            timeout: config.timeout(),
        })
    }

    /// Filters shared by both query kinds
    fn filters(query: &CorpusQuery) -> (Vec<Value>, Vec<Value>) {
        let mut filter = vec![json!({ "term": { "status": query.precedential_status } })];

        if let Some((start, end)) = query.year_range {
            filter.push(json!({
                "range": {
                    "date_filed": {
                        "gte": format!("{:04}-01-01", start),
                        "lte": format!("{:04}-12-31", end),
                    }
                }
            }));
        }
        if let Some(court) = &query.court_id {
            filter.push(json!({ "term": { "court_id": court } }));
        }

        let mut must_not = Vec::new();
        if let Some(id) = query.exclude_opinion_id {
            must_not.push(json!({ "term": { "id": id } }));
        }
        if let Some(cluster_id) = query.exclude_cluster_id {
            must_not.push(json!({ "term": { "cluster_id": cluster_id } }));
        }

        (filter, must_not)
    }

    fn body(&self, filter: Vec<Value>, must_not: Vec<Value>) -> Value {
        json!({
            "size": self.max_hits,
            "sort": [{ "id": "asc" }],
            "_source": ["id", "cluster_id", "case_name", "citation"],
            "query": { "bool": { "filter": filter, "must_not": must_not } }
        })
    }

    pub(crate) fn phrase_body(&self, query: &CorpusQuery) -> Value {
        let (mut filter, must_not) = Self::filters(query);
        filter.push(json!({ "match_phrase": { "citation": query.phrase() } }));
        self.body(filter, must_not)
    }

    pub(crate) fn nearby_body(&self, query: &CorpusQuery, window: u32) -> Value {
        let (mut filter, must_not) = Self::filters(query);
        let cited = &query.citation;
        filter.push(json!({
            "nested": {
                "path": "citation_parts",
                "query": { "bool": { "filter": [
                    { "term": { "citation_parts.volume": cited.volume } },
                    { "term": { "citation_parts.reporter": cited.reporter } },
                    { "range": { "citation_parts.page": {
                        "gte": cited.page.saturating_sub(window),
                        "lte": cited.page,
                    } } }
                ] } }
            }
        }));
        self.body(filter, must_not)
    }

    async fn search(&self, body: &Value, kind: &'static str) -> Result<Vec<CorpusHit>> {
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..Default::default()
        };

        let attempts = &attempts;
        let result = retry(policy, || async move {
            self.limiter.until_ready().await;
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;

            self.execute(body).await.map_err(|e| {
                if e.is_retryable() && attempt <= self.max_retries {
                    warn!(attempt, kind, error = %e, "Index query failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await;

        metrics::record_index_query(started.elapsed().as_secs_f64(), kind, result.is_ok());
        result
    }

    async fn execute(&self, body: &Value) -> Result<Vec<CorpusHit>> {
        let response = self
            .client
            .post(&self.search_url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::IndexTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::HttpClient(e)
                }
            })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = format!("Search index returned {}: {}", status, truncate(&text, 200));
            // 4xx: the query itself is malformed
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AppError::IndexError { message }
            } else {
                AppError::Internal { message }
            });
        }

        parse_hits(&text)
    }
}

/// Decode a search response, one hit per cluster
pub(crate) fn parse_hits(text: &str) -> Result<Vec<CorpusHit>> {
    let response: SearchResponse = serde_json::from_str(text)?;

    let mut seen = HashSet::new();
    let hits: Vec<CorpusHit> = response
        .hits
        .hits
        .into_iter()
        .map(|hit| hit.source)
        .filter(|doc| seen.insert(doc.cluster_id))
        .map(|doc| CorpusHit {
            opinion_id: doc.id,
            cluster_id: doc.cluster_id,
            case_name: doc.case_name,
            citations: doc
                .citation
                .iter()
                .filter_map(|c| CitationKey::parse(c))
                .collect(),
            start_page: None,
        })
        .collect();

    debug!(hits = hits.len(), "Search index response decoded");
    Ok(hits)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl CorpusIndex for SearchIndexClient {
    async fn phrase_search(&self, query: &CorpusQuery) -> Result<Vec<CorpusHit>> {
        let body = self.phrase_body(query);
        self.search(&body, "phrase").await
    }

    async fn nearby_page_search(&self, query: &CorpusQuery, window: u32) -> Result<Vec<CorpusHit>> {
        let body = self.nearby_body(query, window);
        let hits = self.search(&body, "nearby_page").await?;
        Ok(closest_preceding(hits, &query.citation, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn client() -> SearchIndexClient {
        SearchIndexClient::new(&IndexConfig::default()).unwrap()
    }

    fn query() -> CorpusQuery {
        CorpusQuery {
            citation: CitationKey::new(410, "U.S.", 113),
            precedential_status: "Published".to_string(),
            exclude_opinion_id: Some(42),
            exclude_cluster_id: Some(4200),
            year_range: Some((1973, 1973)),
            court_id: Some("scotus".to_string()),
        }
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = create_rate_limiter(100, 200).unwrap();
        assert_ok!(limiter.check());
        assert!(create_rate_limiter(0, 10).is_err());
    }

    #[test]
    fn test_phrase_body() {
        let body = client().phrase_body(&query());
        let filter = body["query"]["bool"]["filter"].as_array().unwrap();

        assert_eq!(body["size"], 5);
        assert!(filter.contains(&json!({ "match_phrase": { "citation": "410 U.S. 113" } })));
        assert!(filter.contains(&json!({ "term": { "court_id": "scotus" } })));
        assert!(filter.contains(&json!({
            "range": { "date_filed": { "gte": "1973-01-01", "lte": "1973-12-31" } }
        })));
        assert_eq!(body["query"]["bool"]["must_not"][0], json!({ "term": { "id": 42 } }));
    }

    #[test]
    fn test_citing_cluster_is_excluded_from_both_queries() {
        let cluster_term = json!({ "term": { "cluster_id": 4200 } });
        for body in [client().phrase_body(&query()), client().nearby_body(&query(), 100)] {
            let must_not = body["query"]["bool"]["must_not"].as_array().unwrap();
            assert!(must_not.contains(&cluster_term));
        }

        let mut detached = query();
        detached.exclude_opinion_id = None;
        detached.exclude_cluster_id = None;
        let body = client().phrase_body(&detached);
        assert!(body["query"]["bool"]["must_not"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_nearby_body_page_range() {
        let body = client().nearby_body(&query(), 100);
        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        let nested = filter.iter().find(|f| f.get("nested").is_some()).unwrap();
        let range = &nested["nested"]["query"]["bool"]["filter"][2]["range"]["citation_parts.page"];
        assert_eq!(range["gte"], 13);
        assert_eq!(range["lte"], 113);
    }

    #[test]
    fn test_parse_hits_collapses_clusters() {
        let text = r#"{"hits": {"hits": [
            {"_source": {"id": 1, "cluster_id": 7, "case_name": "Roe v. Wade", "citation": ["410 U.S. 113"]}},
            {"_source": {"id": 2, "cluster_id": 7, "case_name": "Roe v. Wade", "citation": ["410 U.S. 113"]}},
            {"_source": {"id": 3, "cluster_id": 8, "case_name": "Doe v. Bolton"}}
        ]}}"#;
        let hits = parse_hits(text).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].opinion_id, 1);
        assert_eq!(hits[0].citations, vec![CitationKey::new(410, "U.S.", 113)]);
        assert!(hits[1].citations.is_empty());
    }

    #[test]
    fn test_parse_hits_rejects_garbage() {
        let err = parse_hits("not json").unwrap_err();
        assert!(!err.is_retryable());
    }
}
