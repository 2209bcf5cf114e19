//! Citation resolution
//!
//! Full citations are matched against the corpus index. Short, supra and id
//! citations are matched against the documents that full citations of the
//! same opinion already resolved to, so every full citation is resolved
//! before any of them.

use crate::citation::{Citation, CitationKey, FullCitation};
use crate::extractor::strip_punct;
use crate::index::{CorpusHit, CorpusIndex, CorpusQuery};
use crate::reference::ReferenceData;
use chrono::{Datelike, Utc};
use citator_common::config::{CitationsConfig, IndexConfig};
use citator_common::errors::Result;
use std::sync::Arc;
use tracing::{debug, trace};

/// A corpus document a citation points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDocument {
    pub opinion_id: i64,
    pub cluster_id: i64,
    pub case_name: String,
    pub citations: Vec<CitationKey>,
}

impl From<CorpusHit> for ResolvedDocument {
    fn from(hit: CorpusHit) -> Self {
        Self {
            opinion_id: hit.opinion_id,
            cluster_id: hit.cluster_id,
            case_name: hit.case_name,
            citations: hit.citations,
        }
    }
}

/// Outcome of matching one citation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchedTarget {
    Document(ResolvedDocument),
    NoMatch,
}

impl MatchedTarget {
    pub fn document(&self) -> Option<&ResolvedDocument> {
        match self {
            MatchedTarget::Document(document) => Some(document),
            MatchedTarget::NoMatch => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchedTarget::Document(_))
    }
}

/// Full-citation lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullResolution {
    pub target: MatchedTarget,
    /// Hits behind the outcome: 0 is a miss, more than 1 is ambiguous
    pub candidates: usize,
    /// Cited page when the match came from the nearby-page search
    pub pin_hint: Option<u32>,
}

/// A citation paired with its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCitation {
    pub citation: Citation,
    pub target: MatchedTarget,
    /// Corpus hits for full citations; 0 or 1 for the other forms
    pub candidates: usize,
    /// Page to anchor the link at
    pub pin_page: Option<u32>,
}

/// The opinion doing the citing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CitingContext {
    pub opinion_id: Option<i64>,
    pub cluster_id: Option<i64>,
    pub filed_year: Option<i32>,
}

impl CitingContext {
    pub fn new(opinion_id: i64, filed_year: Option<i32>) -> Self {
        Self {
            opinion_id: Some(opinion_id),
            cluster_id: None,
            filed_year,
        }
    }

    /// Also skip every opinion of the citing cluster
    pub fn in_cluster(mut self, cluster_id: i64) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }

    /// Lookups made outside any citing opinion
    pub fn detached() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub precedential_status: String,
    pub nearby_page_window: u32,
    /// Earliest year used when an edition has no start date
    pub min_year: i32,
}

impl ResolverSettings {
    pub fn from_config(citations: &CitationsConfig, index: &IndexConfig) -> Self {
        Self {
            precedential_status: citations.precedential_status.clone(),
            nearby_page_window: index.nearby_page_window,
            min_year: citations.min_year,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&CitationsConfig::default(), &IndexConfig::default())
    }
}

pub struct Resolver {
    index: Arc<dyn CorpusIndex>,
    reference: Arc<ReferenceData>,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        index: Arc<dyn CorpusIndex>,
        reference: Arc<ReferenceData>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            index,
            reference,
            settings,
        }
    }

    /// Filing-year window: the citation's own year, otherwise the edition's
    /// range capped by the citing opinion's filing year
    fn year_range(&self, citation: &FullCitation, context: &CitingContext) -> Option<(i32, i32)> {
        if let Some(year) = citation.year {
            return Some((year, year));
        }

        let range = citation
            .edition
            .as_ref()
            .and_then(|edition| self.reference.edition_range(edition))?;
        let start = range.start_year().max(self.settings.min_year);
        let mut end = range.end_year().unwrap_or_else(|| Utc::now().year());
        if let Some(filed) = context.filed_year {
            end = end.min(filed);
        }
        Some((start, end))
    }

    fn query(&self, citation: &FullCitation, context: &CitingContext) -> CorpusQuery {
        CorpusQuery {
            citation: citation.key(),
            precedential_status: self.settings.precedential_status.clone(),
            exclude_opinion_id: context.opinion_id,
            exclude_cluster_id: context.cluster_id,
            year_range: self.year_range(citation, context),
            court_id: citation.court.clone(),
        }
    }

    /// Match one full citation against the corpus
    pub async fn resolve_full(
        &self,
        citation: &FullCitation,
        context: &CitingContext,
    ) -> Result<FullResolution> {
        let query = self.query(citation, context);
        let not_self = |hit: &CorpusHit| {
            Some(hit.opinion_id) != context.opinion_id && Some(hit.cluster_id) != context.cluster_id
        };

        let mut hits: Vec<CorpusHit> = self
            .index
            .phrase_search(&query)
            .await?
            .into_iter()
            .filter(not_self)
            .collect();

        let mut pin_hint = None;
        if hits.is_empty() {
            hits = self
                .index
                .nearby_page_search(&query, self.settings.nearby_page_window)
                .await?
                .into_iter()
                .filter(not_self)
                .collect();
            if hits.len() == 1 {
                pin_hint = Some(citation.page);
            }
        }

        let candidates = hits.len();
        let target = match (hits.pop(), candidates) {
            (Some(hit), 1) => MatchedTarget::Document(hit.into()),
            _ => MatchedTarget::NoMatch,
        };

        trace!(
            citation = %query.phrase(),
            candidates,
            matched = target.is_match(),
            "Full citation looked up"
        );

        Ok(FullResolution {
            target,
            candidates,
            pin_hint,
        })
    }

    /// Resolve every citation of one opinion, in document order
    pub async fn resolve_all(
        &self,
        citations: &[Citation],
        context: &CitingContext,
    ) -> Result<Vec<ResolvedCitation>> {
        let mut resolved: Vec<Option<ResolvedCitation>> = vec![None; citations.len()];

        for (position, citation) in citations.iter().enumerate() {
            if let Citation::Full(full) = citation {
                let resolution = self.resolve_full(full, context).await?;
                resolved[position] = Some(ResolvedCitation {
                    citation: citation.clone(),
                    target: resolution.target,
                    candidates: resolution.candidates,
                    pin_page: full.pin_cite.map(|p| p.page).or(resolution.pin_hint),
                });
            }
        }

        let full_targets: Vec<(CitationKey, ResolvedDocument)> = resolved
            .iter()
            .flatten()
            .filter_map(|r| {
                let full = r.citation.as_full()?;
                Some((full.key(), r.target.document()?.clone()))
            })
            .collect();

        for (position, citation) in citations.iter().enumerate() {
            if resolved[position].is_some() {
                continue;
            }

            let target = match citation {
                Citation::Full(_) => continue,
                Citation::Short(short) => {
                    let matching: Vec<&ResolvedDocument> = full_targets
                        .iter()
                        .filter(|(key, document)| {
                            let same_volume = |k: &CitationKey| {
                                k.volume == short.volume && k.reporter == short.reporter
                            };
                            same_volume(key) || document.citations.iter().any(same_volume)
                        })
                        .map(|(_, document)| document)
                        .collect();
                    let candidates = distinct(matching);
                    if candidates.len() == 1 {
                        MatchedTarget::Document(candidates[0].clone())
                    } else {
                        by_antecedent(candidates, short.antecedent_guess.as_deref())
                    }
                }
                Citation::Supra(supra) => by_antecedent(
                    distinct(full_targets.iter().map(|(_, document)| document).collect()),
                    Some(&supra.antecedent_guess),
                ),
                Citation::Id(_) => position
                    .checked_sub(1)
                    .and_then(|previous| resolved[previous].as_ref())
                    .map_or(MatchedTarget::NoMatch, |previous| previous.target.clone()),
                Citation::NonOpinion(_) => MatchedTarget::NoMatch,
            };

            let candidates = usize::from(target.is_match());
            resolved[position] = Some(ResolvedCitation {
                pin_page: citation.pin_page(),
                citation: citation.clone(),
                target,
                candidates,
            });
        }

        let resolved: Vec<ResolvedCitation> = resolved.into_iter().flatten().collect();
        debug!(
            citations = resolved.len(),
            matched = resolved.iter().filter(|r| r.target.is_match()).count(),
            "Citations resolved"
        );
        Ok(resolved)
    }
}

/// Drop repeated documents, keeping first-seen order
fn distinct(documents: Vec<&ResolvedDocument>) -> Vec<&ResolvedDocument> {
    let mut seen = Vec::new();
    documents
        .into_iter()
        .filter(|document| {
            if seen.contains(&document.opinion_id) {
                false
            } else {
                seen.push(document.opinion_id);
                true
            }
        })
        .collect()
}

/// Keep the single candidate whose case name contains the antecedent
fn by_antecedent(candidates: Vec<&ResolvedDocument>, antecedent: Option<&str>) -> MatchedTarget {
    let Some(antecedent) = antecedent.map(strip_punct).filter(|a| !a.is_empty()) else {
        return MatchedTarget::NoMatch;
    };

    let mut matching = candidates
        .into_iter()
        .filter(|document| document.case_name.contains(&antecedent));

    match (matching.next(), matching.next()) {
        (Some(document), None) => MatchedTarget::Document(document.clone()),
        _ => MatchedTarget::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{CitationExtractor, ScanSettings, TokenExtractor};
    use crate::index::{IndexedDocument, InMemoryIndex};
    use chrono::NaiveDate;

    fn document(opinion_id: i64, case_name: &str, year: i32, court: &str, citations: &[&str]) -> IndexedDocument {
        IndexedDocument {
            opinion_ids: vec![opinion_id],
            cluster_id: opinion_id + 1000,
            case_name: case_name.to_string(),
            court_id: court.to_string(),
            date_filed: NaiveDate::from_ymd_opt(year, 6, 1),
            precedential_status: "Published".to_string(),
            citations: citations.iter().filter_map(|c| CitationKey::parse(c)).collect(),
        }
    }

    fn corpus() -> Vec<IndexedDocument> {
        vec![
            document(1, "Roe v. Wade", 1973, "scotus", &["410 U.S. 113"]),
            document(2, "Adarand Constructors, Inc. v. Pena", 1995, "scotus", &["515 U.S. 200"]),
            document(3, "Smith v. Jones", 1990, "ca2", &["123 F.2d 456"]),
            document(4, "Twin One v. State", 1980, "ca2", &["600 F.2d 10"]),
            document(5, "Twin Two v. State", 1980, "ca2", &["600 F.2d 10"]),
        ]
    }

    struct Fixture {
        extractor: TokenExtractor,
        resolver: Resolver,
    }

    fn fixture(documents: Vec<IndexedDocument>) -> Fixture {
        let reference = Arc::new(ReferenceData::bundled().unwrap());
        let extractor = TokenExtractor::new(reference.clone(), ScanSettings::default()).unwrap();
        let index = Arc::new(InMemoryIndex::from_documents(documents));
        let resolver = Resolver::new(index, reference, ResolverSettings::default());
        Fixture { extractor, resolver }
    }

    async fn resolve(fixture: &Fixture, text: &str, context: CitingContext) -> Vec<ResolvedCitation> {
        let extraction = fixture.extractor.extract(text);
        fixture
            .resolver
            .resolve_all(&extraction.citations, &context)
            .await
            .unwrap()
    }

    fn target_id(resolved: &ResolvedCitation) -> Option<i64> {
        resolved.target.document().map(|d| d.opinion_id)
    }

    #[tokio::test]
    async fn test_full_citation_resolves() {
        let f = fixture(corpus());
        let resolved = resolve(&f, "See Roe v. Wade, 410 U.S. 113 (1973).", CitingContext::new(99, Some(2000))).await;
        assert_eq!(resolved.len(), 1);
        assert_eq!(target_id(&resolved[0]), Some(1));
        assert_eq!(resolved[0].candidates, 1);
    }

    #[tokio::test]
    async fn test_never_resolves_to_itself() {
        let f = fixture(corpus());
        let resolved = resolve(&f, "See Roe v. Wade, 410 U.S. 113 (1973).", CitingContext::new(1, Some(1973))).await;
        assert_eq!(resolved[0].target, MatchedTarget::NoMatch);
        assert_eq!(resolved[0].candidates, 0);
    }

    #[tokio::test]
    async fn test_never_resolves_to_a_sibling_opinion() {
        let f = fixture(corpus());
        // A concurrence in Roe's cluster citing the majority
        let context = CitingContext::new(77, Some(1973)).in_cluster(1001);
        let resolved = resolve(&f, "See Roe v. Wade, 410 U.S. 113 (1973).", context).await;
        assert_eq!(resolved[0].target, MatchedTarget::NoMatch);
        assert_eq!(resolved[0].candidates, 0);
    }

    #[tokio::test]
    async fn test_ambiguous_full_citation() {
        let f = fixture(corpus());
        let resolved = resolve(&f, "cited in 600 F.2d 10 (2d Cir. 1980).", CitingContext::new(99, None)).await;
        assert_eq!(resolved[0].target, MatchedTarget::NoMatch);
        assert_eq!(resolved[0].candidates, 2);
    }

    #[tokio::test]
    async fn test_year_window_capped_by_filing_date() {
        let f = fixture(corpus());
        // No year in the text; the citing opinion predates the cited one
        let resolved = resolve(&f, "cited in 515 U.S. 200 here", CitingContext::new(99, Some(1990))).await;
        assert_eq!(resolved[0].target, MatchedTarget::NoMatch);

        let resolved = resolve(&f, "cited in 515 U.S. 200 here", CitingContext::new(99, Some(2001))).await;
        assert_eq!(target_id(&resolved[0]), Some(2));
    }

    #[tokio::test]
    async fn test_pin_cite_only_uses_nearby_page() {
        let f = fixture(corpus());
        let resolved = resolve(&f, "cited in 410 U.S. 153 (1973).", CitingContext::new(99, None)).await;
        assert_eq!(target_id(&resolved[0]), Some(1));
        assert_eq!(resolved[0].pin_page, Some(153));
    }

    #[tokio::test]
    async fn test_short_form_follows_full_citation() {
        let f = fixture(corpus());
        let text = "See Adarand Constructors, Inc. v. Pena, 515 U.S. 200 (1995). Later, Adarand, 515 U.S., at 241.";
        let resolved = resolve(&f, text, CitingContext::new(99, Some(2001))).await;
        assert_eq!(resolved.len(), 2);
        assert!(matches!(resolved[1].citation, Citation::Short(_)));
        assert_eq!(target_id(&resolved[1]), Some(2));
        assert_eq!(resolved[1].pin_page, Some(241));
    }

    #[tokio::test]
    async fn test_short_form_without_antecedent_target() {
        let f = fixture(corpus());
        let resolved = resolve(&f, "We said in Adarand, 515 U.S., at 241.", CitingContext::new(99, Some(2001))).await;
        assert_eq!(resolved[0].target, MatchedTarget::NoMatch);
    }

    #[tokio::test]
    async fn test_supra_and_id() {
        let f = fixture(corpus());
        let text = "See Roe v. Wade, 410 U.S. 113 (1973); Smith v. Jones, 123 F.2d 456 (2d Cir. 1990). \
                    As Wade, supra, at 120 held. Id., at 121.";
        let resolved = resolve(&f, text, CitingContext::new(99, Some(2001))).await;
        assert_eq!(resolved.len(), 4);
        assert!(matches!(resolved[2].citation, Citation::Supra(_)));
        assert_eq!(target_id(&resolved[2]), Some(1));
        assert!(matches!(resolved[3].citation, Citation::Id(_)));
        assert_eq!(target_id(&resolved[3]), Some(1));
        assert_eq!(resolved[3].pin_page, Some(121));
    }

    #[tokio::test]
    async fn test_id_after_statute_does_not_link() {
        let f = fixture(corpus());
        let text = "See Roe v. Wade, 410 U.S. 113 (1973). But see 42 U.S.C. § 1983. Id., at 3.";
        let resolved = resolve(&f, text, CitingContext::new(99, Some(2001))).await;
        let id = resolved.iter().find(|r| matches!(r.citation, Citation::Id(_))).unwrap();
        assert_eq!(id.target, MatchedTarget::NoMatch);
    }

    #[tokio::test]
    async fn test_court_filter() {
        let f = fixture(corpus());
        let resolved = resolve(&f, "see 123 F.2d 456 (3d Cir. 1990).", CitingContext::new(99, None)).await;
        assert_eq!(resolved[0].target, MatchedTarget::NoMatch);
    }
}
