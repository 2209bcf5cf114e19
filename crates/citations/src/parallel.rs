//! Parallel citation graph
//!
//! Full citations sitting next to each other in an opinion
//! ("410 U.S. 113, 93 S. Ct. 705") usually name the same case in two
//! reporters. Every opinion contributes its adjacent pairs as edges; once
//! the whole corpus has been seen, edges observed often enough are used to
//! fill empty citation slots on the clusters they resolve to.
//!
//! Promotion never creates clusters; it only writes to existing ones.

use crate::citation::{CitationKey, FullCitation};
use crate::reference::{CiteType, ReferenceData};
use crate::resolver::{CitingContext, Resolver};
use async_trait::async_trait;
use citator_common::config::CitationsConfig;
use citator_common::db::models::{CitationSlot, OpinionCluster};
use citator_common::errors::Result;
use citator_common::metrics;
use citator_common::Repository;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Unordered pair of citations, stored smallest first
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Edge(CitationKey, CitationKey);

impl Edge {
    pub fn new(a: CitationKey, b: CitationKey) -> Self {
        if a <= b {
            Edge(a, b)
        } else {
            Edge(b, a)
        }
    }

    pub fn endpoints(&self) -> (&CitationKey, &CitationKey) {
        (&self.0, &self.1)
    }
}

/// Grouping rules for one opinion
#[derive(Debug, Clone)]
pub struct GroupingSettings {
    /// Maximum token distance between neighbouring group members
    pub distance: usize,
    /// Reporters whose presence discards a whole group
    pub blacklist: Vec<String>,
}

impl GroupingSettings {
    pub fn from_config(config: &CitationsConfig) -> Self {
        Self {
            distance: config.parallel_distance,
            blacklist: config.graph_reporter_blacklist.clone(),
        }
    }
}

impl Default for GroupingSettings {
    fn default() -> Self {
        Self::from_config(&CitationsConfig::default())
    }
}

/// Split an opinion's full citations into runs of neighbours
pub fn parallel_groups<'a>(
    citations: &[&'a FullCitation],
    settings: &GroupingSettings,
) -> Vec<Vec<&'a FullCitation>> {
    let mut sorted = citations.to_vec();
    sorted.sort_by_key(|c| c.token_index);

    let mut groups: Vec<Vec<&FullCitation>> = Vec::new();
    let mut current: Vec<&FullCitation> = Vec::new();

    for citation in sorted {
        let adjacent = current
            .last()
            .is_some_and(|last| last.token_index + settings.distance > citation.token_index);
        if !adjacent && !current.is_empty() {
            groups.push(std::mem::take(&mut current));
        }
        current.push(citation);
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
        .into_iter()
        .filter(|group| group.len() > 1)
        .filter(|group| {
            !group.iter().any(|c| {
                settings
                    .blacklist
                    .iter()
                    .any(|b| *b == c.reporter || *b == c.reporter_found)
            })
        })
        .collect()
}

/// Edges contributed by one opinion, each pair once
pub fn opinion_edges<'a>(
    citations: impl IntoIterator<Item = &'a FullCitation>,
    settings: &GroupingSettings,
) -> Vec<(Edge, &'a FullCitation, &'a FullCitation)> {
    let citations: Vec<&FullCitation> = citations.into_iter().collect();
    let mut seen = HashSet::new();
    let mut edges = Vec::new();

    for group in parallel_groups(&citations, settings) {
        for pair in group.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.key() == b.key() {
                continue;
            }
            let edge = Edge::new(a.key(), b.key());
            if seen.insert(edge.clone()) {
                edges.push((edge, a, b));
            }
        }
    }

    edges
}

/// Where a node representative was seen: (opinion id, token index)
type NodeRank = (i64, usize);

/// Corpus-wide edge weights
#[derive(Debug, Clone, Default)]
pub struct ParallelCitationGraph {
    weights: HashMap<Edge, u32>,
    /// Earliest occurrence of each endpoint, used to resolve it later.
    /// Earliest is by opinion id then token, so merge order does not matter.
    nodes: HashMap<CitationKey, (NodeRank, FullCitation)>,
    opinions: usize,
}

impl ParallelCitationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one opinion's full citations
    pub fn add_opinion<'a>(
        &mut self,
        opinion_id: i64,
        citations: impl IntoIterator<Item = &'a FullCitation>,
        settings: &GroupingSettings,
    ) {
        for (edge, a, b) in opinion_edges(citations, settings) {
            *self.weights.entry(edge).or_insert(0) += 1;
            for citation in [a, b] {
                let rank = (opinion_id, citation.token_index);
                self.keep_node(citation.key(), rank, citation);
            }
        }
        self.opinions += 1;
    }

    /// Fold a partial graph built by another task into this one
    pub fn merge(&mut self, other: ParallelCitationGraph) {
        for (edge, weight) in other.weights {
            *self.weights.entry(edge).or_insert(0) += weight;
        }
        for (key, (rank, citation)) in other.nodes {
            self.keep_node(key, rank, &citation);
        }
        self.opinions += other.opinions;
    }

    fn keep_node(&mut self, key: CitationKey, rank: NodeRank, citation: &FullCitation) {
        match self.nodes.get_mut(&key) {
            Some(existing) if existing.0 <= rank => {}
            Some(existing) => *existing = (rank, citation.clone()),
            None => {
                self.nodes.insert(key, (rank, citation.clone()));
            }
        }
    }

    pub fn weight(&self, edge: &Edge) -> u32 {
        self.weights.get(edge).copied().unwrap_or(0)
    }

    pub fn node(&self, key: &CitationKey) -> Option<&FullCitation> {
        self.nodes.get(key).map(|(_, citation)| citation)
    }

    /// Edges by descending weight, ties in key order
    pub fn edges(&self) -> Vec<(&Edge, u32)> {
        let mut edges: Vec<(&Edge, u32)> = self.weights.iter().map(|(e, w)| (e, *w)).collect();
        edges.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        edges
    }

    pub fn edge_count(&self) -> usize {
        self.weights.len()
    }

    pub fn opinions(&self) -> usize {
        self.opinions
    }
}

/// Slots a reporter classification may fill, in preference order
pub fn slot_family(cite_type: CiteType) -> &'static [CitationSlot] {
    match cite_type {
        CiteType::Federal => &[
            CitationSlot::FederalCiteOne,
            CitationSlot::FederalCiteTwo,
            CitationSlot::FederalCiteThree,
        ],
        CiteType::State => &[
            CitationSlot::StateCiteOne,
            CitationSlot::StateCiteTwo,
            CitationSlot::StateCiteThree,
        ],
        CiteType::StateRegional => &[CitationSlot::StateCiteRegional],
        CiteType::Specialty | CiteType::Journal => &[CitationSlot::SpecialtyCiteOne],
        CiteType::ScotusEarly => &[CitationSlot::ScotusEarlyCite],
        CiteType::Lexis => &[CitationSlot::LexisCite],
        CiteType::Westlaw => &[CitationSlot::WestlawCite],
        CiteType::Neutral => &[CitationSlot::NeutralCite],
        CiteType::Other => &[],
    }
}

/// Cluster reads and slot writes used by promotion
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn load_cluster(&self, cluster_id: i64) -> Result<Option<OpinionCluster>>;

    async fn write_slot(&self, cluster_id: i64, slot: CitationSlot, value: &str) -> Result<()>;
}

#[async_trait]
impl ClusterStore for Repository {
    async fn load_cluster(&self, cluster_id: i64) -> Result<Option<OpinionCluster>> {
        self.find_cluster(cluster_id).await
    }

    async fn write_slot(&self, cluster_id: i64, slot: CitationSlot, value: &str) -> Result<()> {
        self.set_citation_slot(cluster_id, slot, value).await
    }
}

/// What happened to one edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionOutcome {
    BelowThreshold,
    NeitherResolved,
    BothResolved,
    /// Endpoint never seen as a citation (merged graphs only)
    MissingNode,
    /// The unresolved endpoint matched several documents
    AmbiguousEndpoint,
    /// The unresolved reporter has no slot family
    UnknownReporter,
    ClusterMissing,
    AlreadyPresent,
    NoEmptySlot,
    /// Dry run: the slot would have been written
    WouldPromote,
    Promoted,
    Failed,
}

impl PromotionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            PromotionOutcome::BelowThreshold => "below_threshold",
            PromotionOutcome::NeitherResolved => "neither_resolved",
            PromotionOutcome::BothResolved => "both_resolved",
            PromotionOutcome::MissingNode => "missing_node",
            PromotionOutcome::AmbiguousEndpoint => "ambiguous_endpoint",
            PromotionOutcome::UnknownReporter => "unknown_reporter",
            PromotionOutcome::ClusterMissing => "cluster_missing",
            PromotionOutcome::AlreadyPresent => "already_present",
            PromotionOutcome::NoEmptySlot => "no_empty_slot",
            PromotionOutcome::WouldPromote => "would_promote",
            PromotionOutcome::Promoted => "promoted",
            PromotionOutcome::Failed => "failed",
        }
    }
}

/// Counts per outcome
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromotionReport {
    pub outcomes: BTreeMap<PromotionOutcome, usize>,
}

impl PromotionReport {
    pub fn count(&self, outcome: PromotionOutcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }

    fn record(&mut self, outcome: PromotionOutcome) {
        *self.outcomes.entry(outcome).or_insert(0) += 1;
        metrics::record_promotion(outcome.as_str());
    }
}

pub struct ParallelPromoter {
    resolver: Arc<Resolver>,
    reference: Arc<ReferenceData>,
    store: Arc<dyn ClusterStore>,
    threshold: u32,
    dry_run: bool,
}

impl ParallelPromoter {
    pub fn new(
        resolver: Arc<Resolver>,
        reference: Arc<ReferenceData>,
        store: Arc<dyn ClusterStore>,
        threshold: u32,
        dry_run: bool,
    ) -> Self {
        Self {
            resolver,
            reference,
            store,
            threshold,
            dry_run,
        }
    }

    /// Process one accumulated edge
    pub async fn promote_edge(
        &self,
        graph: &ParallelCitationGraph,
        edge: &Edge,
        weight: u32,
    ) -> Result<PromotionOutcome> {
        if weight < self.threshold {
            return Ok(PromotionOutcome::BelowThreshold);
        }

        let (a, b) = edge.endpoints();
        let (Some(a), Some(b)) = (graph.node(a), graph.node(b)) else {
            return Ok(PromotionOutcome::MissingNode);
        };

        let context = CitingContext::detached();
        let left = self.resolver.resolve_full(a, &context).await?;
        let right = self.resolver.resolve_full(b, &context).await?;

        let (document, unresolved, misses) = match (left.target.document(), right.target.document())
        {
            (None, None) => return Ok(PromotionOutcome::NeitherResolved),
            (Some(_), Some(_)) => return Ok(PromotionOutcome::BothResolved),
            (Some(document), None) => (document, b, &right),
            (None, Some(document)) => (document, a, &left),
        };
        // Only a citation the corpus has never seen may be added elsewhere
        if misses.candidates > 0 {
            return Ok(PromotionOutcome::AmbiguousEndpoint);
        }

        let Some(cite_type) = unresolved
            .edition
            .as_ref()
            .and_then(|edition| self.reference.cite_type(edition))
        else {
            return Ok(PromotionOutcome::UnknownReporter);
        };
        let family = slot_family(cite_type);
        if family.is_empty() {
            return Ok(PromotionOutcome::UnknownReporter);
        }

        let Some(cluster) = self.store.load_cluster(document.cluster_id).await? else {
            return Ok(PromotionOutcome::ClusterMissing);
        };

        let key = unresolved.key();
        let present = cluster
            .citation_strings()
            .into_iter()
            .filter_map(CitationKey::parse)
            .any(|existing| existing == key);
        if present {
            return Ok(PromotionOutcome::AlreadyPresent);
        }

        let Some(slot) = family.iter().copied().find(|slot| cluster.slot(*slot).is_none()) else {
            return Ok(PromotionOutcome::NoEmptySlot);
        };

        let value = unresolved.base_citation();
        if self.dry_run {
            info!(cluster_id = cluster.id, ?slot, citation = %value, weight, "Would add parallel citation");
            return Ok(PromotionOutcome::WouldPromote);
        }

        self.store.write_slot(cluster.id, slot, &value).await?;
        info!(cluster_id = cluster.id, ?slot, citation = %value, weight, "Parallel citation added");
        Ok(PromotionOutcome::Promoted)
    }

    /// Process every edge once. A failed edge is counted and skipped.
    #[instrument(skip(self, graph), fields(edges = graph.edge_count(), dry_run = self.dry_run))]
    pub async fn promote_all(&self, graph: &ParallelCitationGraph) -> PromotionReport {
        let mut report = PromotionReport::default();

        for (edge, weight) in graph.edges() {
            let outcome = match self.promote_edge(graph, edge, weight).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(edge = ?edge, error = %e, "Parallel citation edge failed");
                    PromotionOutcome::Failed
                }
            };
            debug!(edge = ?edge, weight, outcome = outcome.as_str(), "Edge processed");
            report.record(outcome);
        }

        info!(outcomes = ?report.outcomes, "Parallel citation promotion finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{CitationExtractor, ScanSettings, TokenExtractor};
    use crate::index::{IndexedDocument, InMemoryIndex};
    use crate::resolver::ResolverSettings;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn extractor(reference: &Arc<ReferenceData>) -> TokenExtractor {
        TokenExtractor::new(reference.clone(), ScanSettings::default()).unwrap()
    }

    fn settings() -> GroupingSettings {
        GroupingSettings {
            distance: 4,
            blacklist: vec!["Cr.".to_string()],
        }
    }

    fn graph_of(texts: &[&str]) -> ParallelCitationGraph {
        let reference = Arc::new(ReferenceData::bundled().unwrap());
        let extractor = extractor(&reference);
        let mut graph = ParallelCitationGraph::new();
        for (id, text) in texts.iter().enumerate() {
            let extraction = extractor.extract(text);
            graph.add_opinion(id as i64 + 1, extraction.full_citations(), &settings());
        }
        graph
    }

    fn roe_edge() -> Edge {
        Edge::new(
            CitationKey::new(410, "U.S.", 113),
            CitationKey::new(93, "S. Ct.", 705),
        )
    }

    #[test]
    fn test_adjacent_citations_form_an_edge() {
        let graph = graph_of(&["Roe v. Wade, 410 U.S. 113, 93 S. Ct. 705 (1973)."]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.weight(&roe_edge()), 1);
    }

    #[test]
    fn test_pair_counted_once_per_opinion() {
        let graph = graph_of(&[
            "Roe, 410 U.S. 113, 93 S. Ct. 705 (1973). Later Roe, 410 U.S. 113, 93 S. Ct. 705 (1973).",
            "Roe, 93 S. Ct. 705, 410 U.S. 113 (1973).",
        ]);
        assert_eq!(graph.weight(&roe_edge()), 2);
        assert_eq!(graph.opinions(), 2);
    }

    #[test]
    fn test_distant_citations_do_not_group() {
        let graph = graph_of(&[
            "Roe, 410 U.S. 113 (1973), was decided the same day as a case reported much later at 93 S. Ct. 705.",
        ]);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_merge_adds_weights() {
        let mut left = graph_of(&["Roe, 410 U.S. 113, 93 S. Ct. 705 (1973)."]);
        let right = graph_of(&["Roe, 410 U.S. 113, 93 S. Ct. 705 (1973)."]);
        left.merge(right);
        assert_eq!(left.weight(&roe_edge()), 2);
        assert_eq!(left.opinions(), 2);
    }

    #[test]
    fn test_slot_family() {
        assert_eq!(slot_family(CiteType::Federal)[0], CitationSlot::FederalCiteOne);
        assert_eq!(slot_family(CiteType::StateRegional), &[CitationSlot::StateCiteRegional]);
        assert!(slot_family(CiteType::Other).is_empty());
    }

    fn cluster(id: i64, federal: &[&str]) -> OpinionCluster {
        let slot = |i: usize| federal.get(i).map(|s| s.to_string());
        OpinionCluster {
            id,
            case_name: "Roe v. Wade".to_string(),
            date_filed: NaiveDate::from_ymd_opt(1973, 1, 22),
            court_id: "scotus".to_string(),
            precedential_status: "Published".to_string(),
            citation_count: 0,
            federal_cite_one: slot(0),
            federal_cite_two: slot(1),
            federal_cite_three: slot(2),
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

    #[derive(Default)]
    struct MemoryStore {
        clusters: Mutex<HashMap<i64, OpinionCluster>>,
        writes: Mutex<Vec<(i64, CitationSlot, String)>>,
    }

    #[async_trait]
    impl ClusterStore for MemoryStore {
        async fn load_cluster(&self, cluster_id: i64) -> Result<Option<OpinionCluster>> {
            Ok(self.clusters.lock().unwrap().get(&cluster_id).cloned())
        }

        async fn write_slot(&self, cluster_id: i64, slot: CitationSlot, value: &str) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((cluster_id, slot, value.to_string()));
            Ok(())
        }
    }

    fn indexed(cluster_id: i64, case_name: &str, federal: &[&str]) -> IndexedDocument {
        IndexedDocument {
            opinion_ids: vec![cluster_id / 100],
            cluster_id,
            case_name: case_name.to_string(),
            court_id: "scotus".to_string(),
            date_filed: NaiveDate::from_ymd_opt(1973, 1, 22),
            precedential_status: "Published".to_string(),
            citations: federal.iter().filter_map(|c| CitationKey::parse(c)).collect(),
        }
    }

    fn promoter(
        store: Arc<MemoryStore>,
        federal: &[&str],
        threshold: u32,
        dry_run: bool,
    ) -> ParallelPromoter {
        store.clusters.lock().unwrap().insert(1010, cluster(1010, federal));
        promoter_over(store, vec![indexed(1010, "Roe v. Wade", federal)], threshold, dry_run)
    }

    fn promoter_over(
        store: Arc<MemoryStore>,
        documents: Vec<IndexedDocument>,
        threshold: u32,
        dry_run: bool,
    ) -> ParallelPromoter {
        let reference = Arc::new(ReferenceData::bundled().unwrap());
        let index = Arc::new(InMemoryIndex::from_documents(documents));
        let resolver = Arc::new(Resolver::new(
            index,
            reference.clone(),
            ResolverSettings::default(),
        ));
        ParallelPromoter::new(resolver, reference, store, threshold, dry_run)
    }

    fn weighted_graph(times: usize) -> ParallelCitationGraph {
        let text = "Roe v. Wade, 410 U.S. 113, 93 S. Ct. 705 (1973).";
        graph_of(&vec![text; times])
    }

    #[tokio::test]
    async fn test_promotes_unresolved_endpoint() {
        let store = Arc::new(MemoryStore::default());
        let promoter = promoter(store.clone(), &["410 U.S. 113"], 3, false);

        let report = promoter.promote_all(&weighted_graph(3)).await;
        assert_eq!(report.count(PromotionOutcome::Promoted), 1);
        assert_eq!(
            store.writes.lock().unwrap().as_slice(),
            &[(1010, CitationSlot::FederalCiteTwo, "93 S. Ct. 705".to_string())]
        );
    }

    #[tokio::test]
    async fn test_edge_below_threshold_never_promoted() {
        let store = Arc::new(MemoryStore::default());
        let promoter = promoter(store.clone(), &["410 U.S. 113"], 3, false);

        let report = promoter.promote_all(&weighted_graph(2)).await;
        assert_eq!(report.count(PromotionOutcome::BelowThreshold), 1);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_both_resolved_is_skipped() {
        let store = Arc::new(MemoryStore::default());
        let promoter = promoter(store.clone(), &["410 U.S. 113", "93 S. Ct. 705"], 1, false);

        let report = promoter.promote_all(&weighted_graph(1)).await;
        assert_eq!(report.count(PromotionOutcome::BothResolved), 1);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_neither_resolved_is_skipped() {
        let store = Arc::new(MemoryStore::default());
        let promoter = promoter(store.clone(), &["999 U.S. 1"], 1, false);

        let report = promoter.promote_all(&weighted_graph(1)).await;
        assert_eq!(report.count(PromotionOutcome::NeitherResolved), 1);
    }

    #[tokio::test]
    async fn test_full_slot_family() {
        let store = Arc::new(MemoryStore::default());
        let promoter = promoter(store.clone(), &["410 U.S. 113", "1 L. Ed. 1", "2 L. Ed. 2"], 1, false);

        let report = promoter.promote_all(&weighted_graph(1)).await;
        assert_eq!(report.count(PromotionOutcome::NoEmptySlot), 1);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let promoter = promoter(store.clone(), &["410 U.S. 113"], 1, true);

        let report = promoter.promote_all(&weighted_graph(1)).await;
        assert_eq!(report.count(PromotionOutcome::WouldPromote), 1);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_endpoint_is_not_promoted() {
        let store = Arc::new(MemoryStore::default());
        for (id, federal) in [(1010, "410 U.S. 113"), (2020, "93 S. Ct. 705"), (3030, "93 S. Ct. 705")] {
            store.clusters.lock().unwrap().insert(id, cluster(id, &[federal]));
        }
        let documents = vec![
            indexed(1010, "Roe v. Wade", &["410 U.S. 113"]),
            indexed(2020, "Doe v. Bolton", &["93 S. Ct. 705"]),
            indexed(3030, "United States v. Vuitch", &["93 S. Ct. 705"]),
        ];
        let promoter = promoter_over(store.clone(), documents, 1, false);

        let report = promoter.promote_all(&weighted_graph(1)).await;
        assert_eq!(report.count(PromotionOutcome::AmbiguousEndpoint), 1);
        assert_eq!(report.count(PromotionOutcome::Promoted), 0);
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_merge_order_does_not_change_node() {
        let early = "Roe v. Wade, 410 U.S. 113, 93 S. Ct. 705 (1973).";
        let late = "As held in Roe, 410 U.S. 113, 93 S. Ct. 705 (1973).";
        let key = CitationKey::new(410, "U.S.", 113);

        let reference = Arc::new(ReferenceData::bundled().unwrap());
        let extractor = extractor(&reference);
        let partial = |opinion_id: i64, text: &str| {
            let mut graph = ParallelCitationGraph::new();
            graph.add_opinion(opinion_id, extractor.extract(text).full_citations(), &settings());
            graph
        };

        let mut forward = partial(1, early);
        forward.merge(partial(2, late));
        let mut backward = partial(2, late);
        backward.merge(partial(1, early));

        let expected = partial(1, early).node(&key).cloned().unwrap();
        assert_eq!(forward.node(&key), Some(&expected));
        assert_eq!(backward.node(&key), Some(&expected));
        assert_eq!(forward.weight(&roe_edge()), backward.weight(&roe_edge()));
    }
}
