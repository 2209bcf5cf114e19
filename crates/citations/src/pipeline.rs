//! Per-opinion citation pipeline
//!
//! clean text -> extract -> resolve (full forms first) -> annotate ->
//! plan unmatched rows -> persist everything in one transaction.
//!
//! Nothing is written until the last step, so a failed run leaves the
//! opinion exactly as it was.

use crate::annotator::{AnnotatedText, Annotator};
use crate::citation::{Citation, CitationKey};
use crate::extractor::{CitationExtractor, ScanSettings, TokenExtractor};
use crate::index::CorpusIndex;
use crate::reference::ReferenceData;
use crate::resolver::{CitingContext, MatchedTarget, ResolvedCitation, Resolver, ResolverSettings};
use crate::text::SourceText;
use crate::unmatched::{UnmatchedTracker, UnresolvedCitation, UnresolvedReason};
use chrono::Datelike;
use citator_common::config::AppConfig;
use citator_common::db::models::{Opinion, OpinionCluster, UnmatchedCitation};
use citator_common::db::{CitationRunStats, CitationRunUpdate};
use citator_common::errors::{AppError, Result};
use citator_common::metrics;
use citator_common::Repository;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Everything computed for one opinion before persistence
#[derive(Debug, Clone)]
pub struct OpinionAnalysis {
    pub opinion_id: i64,
    pub resolved: Vec<ResolvedCitation>,
    pub unresolved: Vec<UnresolvedCitation>,
    pub annotated: AnnotatedText,
}

impl OpinionAnalysis {
    /// Cited opinions with the number of times each is cited
    pub fn cited(&self) -> Vec<(i64, i32)> {
        let mut depth: BTreeMap<i64, i32> = BTreeMap::new();
        for citation in &self.resolved {
            if let MatchedTarget::Document(document) = &citation.target {
                if document.opinion_id != self.opinion_id {
                    *depth.entry(document.opinion_id).or_insert(0) += 1;
                }
            }
        }
        depth.into_iter().collect()
    }

    /// Base strings of the full citations that resolved
    pub fn resolved_strings(&self) -> HashSet<String> {
        self.resolved
            .iter()
            .filter(|r| r.target.is_match())
            .filter_map(|r| r.citation.as_full())
            .map(|full| full.base_citation())
            .collect()
    }

    pub fn matched_count(&self) -> usize {
        self.resolved.iter().filter(|r| r.target.is_match()).count()
    }
}

/// Summary of one persisted run
#[derive(Debug, Clone, Serialize)]
pub struct OpinionRunReport {
    pub opinion_id: i64,
    pub citations: usize,
    pub matched: usize,
    pub unresolved: usize,
    pub annotations_skipped: usize,
    pub stats: CitationRunStats,
}

pub struct CitationPipeline {
    extractor: Arc<dyn CitationExtractor>,
    resolver: Arc<Resolver>,
    annotator: Annotator,
    tracker: UnmatchedTracker,
}

impl CitationPipeline {
    pub fn new(
        extractor: Arc<dyn CitationExtractor>,
        resolver: Arc<Resolver>,
        annotator: Annotator,
        tracker: UnmatchedTracker,
    ) -> Self {
        Self {
            extractor,
            resolver,
            annotator,
            tracker,
        }
    }

    /// Wire up the default components from configuration
    pub fn from_config(
        config: &AppConfig,
        reference: Arc<ReferenceData>,
        index: Arc<dyn CorpusIndex>,
    ) -> Result<Self> {
        let extractor = TokenExtractor::new(
            reference.clone(),
            ScanSettings::from_config(&config.citations),
        )?;
        let resolver = Resolver::new(
            index,
            reference,
            ResolverSettings::from_config(&config.citations, &config.index),
        );

        Ok(Self::new(
            Arc::new(extractor),
            Arc::new(resolver),
            Annotator::new(&config.annotation),
            UnmatchedTracker::from_config(&config.citations),
        ))
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn extractor(&self) -> &Arc<dyn CitationExtractor> {
        &self.extractor
    }

    /// Text the pipeline reads for an opinion: markup when present
    pub fn source_text(opinion: &Opinion) -> SourceText {
        match opinion.markup() {
            Some(markup) => SourceText::markup(markup),
            None => SourceText::plain(&opinion.plain_text),
        }
    }

    /// Extract, resolve and annotate without touching the database
    pub async fn analyze(
        &self,
        opinion: &Opinion,
        cluster: &OpinionCluster,
    ) -> Result<OpinionAnalysis> {
        let source = Self::source_text(opinion);
        let extraction = self.extractor.extract(&source.text);
        let context = CitingContext::new(opinion.id, cluster.date_filed.map(|d| d.year()))
            .in_cluster(cluster.id);

        let resolved = self
            .resolver
            .resolve_all(&extraction.citations, &context)
            .await?;

        let mut unresolved: Vec<UnresolvedCitation> = resolved
            .iter()
            .filter(|r| !r.target.is_match())
            .filter_map(|r| match &r.citation {
                Citation::Full(full) => Some(UnresolvedCitation {
                    citation: full.clone(),
                    reason: UnresolvedReason::from_candidates(r.candidates),
                }),
                _ => None,
            })
            .collect();
        unresolved.extend(extraction.ambiguous.into_iter().map(|citation| UnresolvedCitation {
            citation,
            reason: UnresolvedReason::AmbiguousReporter,
        }));

        let annotated = self.annotator.annotate(&source, &resolved);
        if annotated.skipped > 0 {
            warn!(
                opinion_id = opinion.id,
                skipped = annotated.skipped,
                "Some citations could not be annotated"
            );
        }

        Ok(OpinionAnalysis {
            opinion_id: opinion.id,
            resolved,
            unresolved,
            annotated,
        })
    }

    /// Turn an analysis into the rows to write
    pub fn plan_update(
        &self,
        analysis: &OpinionAnalysis,
        cluster: &OpinionCluster,
        existing: &[UnmatchedCitation],
    ) -> CitationRunUpdate {
        let own_citations: Vec<CitationKey> = cluster
            .citation_strings()
            .into_iter()
            .filter_map(CitationKey::parse)
            .collect();

        let plan = self.tracker.plan(
            existing,
            &analysis.resolved_strings(),
            &analysis.unresolved,
            &own_citations,
        );

        CitationRunUpdate {
            citing_opinion_id: analysis.opinion_id,
            html_with_citations: Some(analysis.annotated.html.clone()),
            cited: analysis.cited(),
            status_updates: plan.status_updates,
            new_unmatched: plan.new_rows,
        }
    }

    /// Run the whole pipeline for one opinion and persist the result
    #[instrument(skip(self, repository), fields(opinion_id = opinion_id))]
    pub async fn run_opinion(
        &self,
        repository: &Repository,
        opinion_id: i64,
    ) -> Result<OpinionRunReport> {
        let started = Instant::now();
        let result = self.run_opinion_inner(repository, opinion_id).await;
        metrics::record_opinion_run(started.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    async fn run_opinion_inner(
        &self,
        repository: &Repository,
        opinion_id: i64,
    ) -> Result<OpinionRunReport> {
        let (opinion, cluster) = repository
            .find_opinion_with_cluster(opinion_id)
            .await?
            .ok_or(AppError::OpinionNotFound { id: opinion_id })?;

        let existing = repository.unmatched_for_opinion(opinion_id).await?;
        let analysis = self.analyze(&opinion, &cluster).await?;
        let update = self.plan_update(&analysis, &cluster, &existing);

        debug!(
            cited = update.cited.len(),
            status_updates = update.status_updates.len(),
            new_unmatched = update.new_unmatched.len(),
            "Citation run planned"
        );

        let stats = repository.save_citation_run(update).await?;

        let matched = analysis.matched_count();
        let ambiguous = analysis
            .unresolved
            .iter()
            .filter(|u| u.reason == UnresolvedReason::AmbiguousReporter)
            .count();
        metrics::record_citations("matched", matched);
        metrics::record_citations("unmatched", analysis.resolved.len() - matched);
        metrics::record_citations("ambiguous_reporter", ambiguous);

        let report = OpinionRunReport {
            opinion_id,
            citations: analysis.resolved.len(),
            matched,
            unresolved: analysis.unresolved.len(),
            annotations_skipped: analysis.annotated.skipped,
            stats,
        };
        info!(
            citations = report.citations,
            matched = report.matched,
            unresolved = report.unresolved,
            newly_cited = stats.newly_cited_clusters,
            "Opinion citations updated"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexedDocument, InMemoryIndex};
    use chrono::{NaiveDate, Utc};
    use citator_common::db::models::UnmatchedStatus;
    use citator_common::db::NewUnmatchedCitation;

    fn indexed(opinion_id: i64, case_name: &str, year: i32, citations: &[&str]) -> IndexedDocument {
        IndexedDocument {
            opinion_ids: vec![opinion_id],
            cluster_id: opinion_id + 100,
            case_name: case_name.to_string(),
            court_id: "scotus".to_string(),
            date_filed: NaiveDate::from_ymd_opt(year, 1, 1),
            precedential_status: "Published".to_string(),
            citations: citations.iter().filter_map(|c| CitationKey::parse(c)).collect(),
        }
    }

    fn pipeline(documents: Vec<IndexedDocument>) -> CitationPipeline {
        let reference = Arc::new(ReferenceData::bundled().unwrap());
        let index = Arc::new(InMemoryIndex::from_documents(documents));
        CitationPipeline::from_config(&AppConfig::default(), reference, index).unwrap()
    }

    fn opinion(id: i64, plain_text: &str, html: Option<&str>) -> Opinion {
        Opinion {
            id,
            cluster_id: id + 100,
            plain_text: plain_text.to_string(),
            html: html.map(str::to_string),
            html_with_citations: None,
            date_modified: Utc::now().into(),
        }
    }

    fn cluster(id: i64, year: i32, federal_cite_one: Option<&str>) -> OpinionCluster {
        OpinionCluster {
            id,
            case_name: "Citing v. Opinion".to_string(),
            date_filed: NaiveDate::from_ymd_opt(year, 1, 1),
            court_id: "ca2".to_string(),
            precedential_status: "Published".to_string(),
            citation_count: 0,
            federal_cite_one: federal_cite_one.map(str::to_string),
            federal_cite_two: None,
            federal_cite_three: None,
            state_cite_one: None,
            state_cite_two: None,
            state_cite_three: None,
            state_cite_regional: None,
            specialty_cite_one: None,
            scotus_early_cite: None,
            lexis_cite: None,
            westlaw_cite: None,
            neutral_cite: None,
        }
    }

    const TEXT: &str = "See Roe v. Wade, 410 U.S. 113 (1973). Id., at 120. \
                        Compare Smith v. Jones, 123 F.2d 456 (2d Cir. 1990), \
                        and 2 How. 202.";

    #[tokio::test]
    async fn test_analyze_partitions_citations() {
        let pipeline = pipeline(vec![indexed(1, "Roe v. Wade", 1973, &["410 U.S. 113"])]);
        let analysis = pipeline
            .analyze(&opinion(50, TEXT, None), &cluster(150, 2001, None))
            .await
            .unwrap();

        assert_eq!(analysis.cited(), vec![(1, 2)]);
        assert_eq!(analysis.resolved_strings(), HashSet::from(["410 U.S. 113".to_string()]));

        let reasons: Vec<_> = analysis
            .unresolved
            .iter()
            .map(|u| (u.citation.base_citation(), u.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("123 F.2d 456".to_string(), UnresolvedReason::NoCandidates),
                ("2 How. 202".to_string(), UnresolvedReason::AmbiguousReporter),
            ]
        );

        assert!(analysis.annotated.html.starts_with(r#"<pre class="inline">"#));
        assert!(analysis.annotated.html.contains(r#"data-id="1""#));
        assert!(analysis
            .annotated
            .html
            .contains(r#"<span class="citation no-link">123 F.2d 456</span>"#));
    }

    #[tokio::test]
    async fn test_plan_update_tracks_unmatched() {
        let pipeline = pipeline(vec![indexed(1, "Roe v. Wade", 1973, &["410 U.S. 113"])]);
        let citing = cluster(150, 2001, None);
        let analysis = pipeline
            .analyze(&opinion(50, TEXT, None), &citing)
            .await
            .unwrap();

        let update = pipeline.plan_update(&analysis, &citing, &[]);
        assert_eq!(update.citing_opinion_id, 50);
        assert_eq!(update.cited, vec![(1, 2)]);
        let statuses: Vec<_> = update
            .new_unmatched
            .iter()
            .map(|row| (row.citation_string.as_str(), row.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("123 F.2d 456", UnmatchedStatus::Found),
                ("2 How. 202", UnmatchedStatus::FailedAmbiguous),
            ]
        );
    }

    fn stored(id: i64, citing_opinion_id: i64, row: &NewUnmatchedCitation) -> UnmatchedCitation {
        let now = Utc::now().into();
        UnmatchedCitation {
            id,
            citing_opinion_id,
            status: row.status.into(),
            citation_string: row.citation_string.clone(),
            volume: row.volume,
            reporter: row.reporter.clone(),
            page: row.page.clone(),
            court_id: row.court_id.clone(),
            year: row.year,
            date_created: now,
            date_modified: now,
        }
    }

    #[tokio::test]
    async fn test_found_citation_resolves_on_rerun() {
        let text = "Compare Smith v. Jones, 123 F.2d 456 (2d Cir. 1990).";
        let citing = cluster(150, 2001, None);
        let mut smith = indexed(3, "Smith v. Jones", 1990, &["123 F.2d 456"]);
        smith.court_id = "ca2".to_string();

        // Target not yet in the corpus
        let before = pipeline(Vec::new());
        let analysis = before.analyze(&opinion(50, text, None), &citing).await.unwrap();
        let first = before.plan_update(&analysis, &citing, &[]);
        assert!(first.cited.is_empty());
        assert_eq!(first.new_unmatched.len(), 1);
        assert_eq!(first.new_unmatched[0].status, UnmatchedStatus::Found);
        let mut existing = vec![stored(900, 50, &first.new_unmatched[0])];

        // Target added, index rebuilt
        let after = pipeline(vec![smith]);
        let analysis = after.analyze(&opinion(50, text, None), &citing).await.unwrap();
        let second = after.plan_update(&analysis, &citing, &existing);
        assert_eq!(second.status_updates, vec![(900, UnmatchedStatus::Resolved)]);
        assert!(second.new_unmatched.is_empty());
        assert_eq!(second.cited, vec![(3, 1)]);
        existing[0].status = UnmatchedStatus::Resolved.into();

        // Nothing left to do once resolved
        let analysis = after.analyze(&opinion(50, text, None), &citing).await.unwrap();
        let third = after.plan_update(&analysis, &citing, &existing);
        assert!(third.status_updates.is_empty());
        assert!(third.new_unmatched.is_empty());
        assert_eq!(third.cited, second.cited);
    }

    #[tokio::test]
    async fn test_self_citation_not_tracked() {
        let pipeline = pipeline(Vec::new());
        let citing = cluster(150, 1990, Some("123 F.2d 456"));
        let analysis = pipeline
            .analyze(&opinion(50, "As we held in 123 F.2d 456 (2d Cir. 1990).", None), &citing)
            .await
            .unwrap();

        let update = pipeline.plan_update(&analysis, &citing, &[]);
        assert!(update.new_unmatched.is_empty());
        assert!(update.cited.is_empty());
    }

    #[tokio::test]
    async fn test_markup_source_preferred() {
        let pipeline = pipeline(vec![indexed(1, "Roe v. Wade", 1973, &["410 U.S. 113"])]);
        let html = "<p>See <i>Roe</i>, 410 U.S. 113 (1973).</p>";
        let analysis = pipeline
            .analyze(&opinion(50, "ignored", Some(html)), &cluster(150, 2001, None))
            .await
            .unwrap();

        assert!(analysis.annotated.html.starts_with("<p>See <i>Roe</i>, <span"));
        assert_eq!(analysis.cited(), vec![(1, 1)]);
    }
}
