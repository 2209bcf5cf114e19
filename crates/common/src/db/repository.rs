//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use chrono::NaiveDate;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Which opinions a batch run covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpinionSelection {
    /// Explicit opinion ids
    Ids(Vec<i64>),
    /// Inclusive opinion id range; either end may be open
    IdRange { start: Option<i64>, end: Option<i64> },
    /// Inclusive filing date range; either end may be open
    FiledRange {
        after: Option<NaiveDate>,
        before: Option<NaiveDate>,
    },
    /// Opinions from the given courts
    Courts(Vec<String>),
    /// Every opinion
    All,
}

/// A new unmatched citation row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnmatchedCitation {
    pub citation_string: String,
    pub volume: i16,
    pub reporter: String,
    pub page: String,
    pub court_id: Option<String>,
    pub year: Option<i32>,
    pub status: UnmatchedStatus,
}

/// Everything one successful citation run writes for a citing opinion
#[derive(Debug, Clone, Default)]
pub struct CitationRunUpdate {
    pub citing_opinion_id: i64,
    /// Annotated text; `None` leaves the stored annotation untouched
    pub html_with_citations: Option<String>,
    /// Cited opinion id and occurrence count
    pub cited: Vec<(i64, i32)>,
    /// Status changes for existing unmatched rows
    pub status_updates: Vec<(i64, UnmatchedStatus)>,
    /// Unmatched rows first seen this run
    pub new_unmatched: Vec<NewUnmatchedCitation>,
}

/// Counts written by a citation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRunStats {
    pub relationships: usize,
    pub newly_cited_clusters: usize,
    pub status_updates: usize,
    pub unmatched_inserted: u64,
}

/// A cluster and the ids of its opinions, for in-memory corpus loading
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub cluster: OpinionCluster,
    pub opinion_ids: Vec<i64>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Opinion Operations
    // ========================================================================

    /// Find an opinion together with its cluster
    pub async fn find_opinion_with_cluster(
        &self,
        id: i64,
    ) -> Result<Option<(Opinion, OpinionCluster)>> {
        let found = OpinionEntity::find_by_id(id)
            .find_also_related(OpinionClusterEntity)
            .one(self.read_conn())
            .await?;

        Ok(found.and_then(|(opinion, cluster)| cluster.map(|c| (opinion, c))))
    }

    fn selection_condition(selection: &OpinionSelection) -> Condition {
        match selection {
            OpinionSelection::Ids(ids) => {
                Condition::all().add(OpinionColumn::Id.is_in(ids.iter().copied()))
            }
            OpinionSelection::IdRange { start, end } => {
                let mut cond = Condition::all();
                if let Some(start) = start {
                    cond = cond.add(OpinionColumn::Id.gte(*start));
                }
                if let Some(end) = end {
                    cond = cond.add(OpinionColumn::Id.lte(*end));
                }
                cond
            }
            OpinionSelection::FiledRange { after, before } => {
                let mut cond = Condition::all();
                if let Some(after) = after {
                    cond = cond.add(OpinionClusterColumn::DateFiled.gte(*after));
                }
                if let Some(before) = before {
                    cond = cond.add(OpinionClusterColumn::DateFiled.lte(*before));
                }
                cond
            }
            OpinionSelection::Courts(courts) => {
                Condition::all().add(OpinionClusterColumn::CourtId.is_in(courts.iter().cloned()))
            }
            OpinionSelection::All => Condition::all(),
        }
    }

    /// Count opinions matching a selection
    pub async fn count_opinions(&self, selection: &OpinionSelection) -> Result<u64> {
        OpinionEntity::find()
            .inner_join(OpinionClusterEntity)
            .filter(Self::selection_condition(selection))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Next page of opinion ids after `after_id`, in id order
    pub async fn opinion_ids_page(
        &self,
        selection: &OpinionSelection,
        after_id: i64,
        limit: u64,
    ) -> Result<Vec<i64>> {
        OpinionEntity::find()
            .inner_join(OpinionClusterEntity)
            .select_only()
            .column(OpinionColumn::Id)
            .filter(Self::selection_condition(selection))
            .filter(OpinionColumn::Id.gt(after_id))
            .order_by_asc(OpinionColumn::Id)
            .limit(limit)
            .into_tuple()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Load a page of selected opinions (with clusters) after `after_id`
    pub async fn opinions_page(
        &self,
        selection: &OpinionSelection,
        after_id: i64,
        limit: u64,
    ) -> Result<Vec<(Opinion, OpinionCluster)>> {
        let rows = OpinionEntity::find()
            .find_also_related(OpinionClusterEntity)
            .filter(Self::selection_condition(selection))
            .filter(OpinionColumn::Id.gt(after_id))
            .order_by_asc(OpinionColumn::Id)
            .limit(limit)
            .all(self.read_conn())
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(opinion, cluster)| cluster.map(|c| (opinion, c)))
            .collect())
    }

    /// Ids of opinions currently cited by `citing_opinion_id`
    pub async fn cited_opinion_ids(&self, citing_opinion_id: i64) -> Result<Vec<i64>> {
        OpinionCitedEntity::find()
            .select_only()
            .column(OpinionCitedColumn::CitedOpinionId)
            .filter(OpinionCitedColumn::CitingOpinionId.eq(citing_opinion_id))
            .order_by_asc(OpinionCitedColumn::CitedOpinionId)
            .into_tuple()
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Cluster Operations
    // ========================================================================

    /// Find cluster by ID
    pub async fn find_cluster(&self, id: i64) -> Result<Option<OpinionCluster>> {
        OpinionClusterEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Write a single citation slot on a cluster
    pub async fn set_citation_slot(
        &self,
        cluster_id: i64,
        slot: CitationSlot,
        value: &str,
    ) -> Result<()> {
        OpinionClusterEntity::update_many()
            .col_expr(slot.column(), Expr::value(value.to_string()))
            .filter(OpinionClusterColumn::Id.eq(cluster_id))
            .exec(self.write_conn())
            .await?;

        debug!(cluster_id, slot = ?slot, value, "Citation slot updated");
        Ok(())
    }

    /// Page through clusters with their opinion ids
    pub async fn corpus_page(&self, after_cluster_id: i64, limit: u64) -> Result<Vec<CorpusEntry>> {
        let clusters = OpinionClusterEntity::find()
            .filter(OpinionClusterColumn::Id.gt(after_cluster_id))
            .order_by_asc(OpinionClusterColumn::Id)
            .limit(limit)
            .all(self.read_conn())
            .await?;

        if clusters.is_empty() {
            return Ok(Vec::new());
        }

        let cluster_ids: Vec<i64> = clusters.iter().map(|c| c.id).collect();
        let pairs: Vec<(i64, i64)> = OpinionEntity::find()
            .select_only()
            .column(OpinionColumn::ClusterId)
            .column(OpinionColumn::Id)
            .filter(OpinionColumn::ClusterId.is_in(cluster_ids))
            .order_by_asc(OpinionColumn::Id)
            .into_tuple()
            .all(self.read_conn())
            .await?;

        let mut by_cluster: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for (cluster_id, opinion_id) in pairs {
            by_cluster.entry(cluster_id).or_default().push(opinion_id);
        }

        Ok(clusters
            .into_iter()
            .map(|cluster| {
                let opinion_ids = by_cluster.remove(&cluster.id).unwrap_or_default();
                CorpusEntry {
                    cluster,
                    opinion_ids,
                }
            })
            .collect())
    }

    // ========================================================================
    // Unmatched Citation Operations
    // ========================================================================

    /// Unmatched rows recorded for a citing opinion
    pub async fn unmatched_for_opinion(
        &self,
        citing_opinion_id: i64,
    ) -> Result<Vec<UnmatchedCitation>> {
        UnmatchedCitationEntity::find()
            .filter(UnmatchedCitationColumn::CitingOpinionId.eq(citing_opinion_id))
            .order_by_asc(UnmatchedCitationColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Delete every unmatched row (full reprocess)
    pub async fn delete_all_unmatched(&self) -> Result<u64> {
        let result = UnmatchedCitationEntity::delete_many()
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Citation Run Persistence
    // ========================================================================

    /// Persist one opinion's citation run in a single transaction.
    ///
    /// Relationship rows are replaced wholesale. Cited clusters gain one
    /// citation only for opinions that were not cited before this run.
    pub async fn save_citation_run(&self, update: CitationRunUpdate) -> Result<CitationRunStats> {
        let citing_id = update.citing_opinion_id;
        let now = chrono::Utc::now();
        let txn = self.write_conn().begin().await?;

        // Unmatched status transitions, grouped by target status
        let mut by_status: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for (row_id, status) in &update.status_updates {
            by_status.entry((*status).into()).or_default().push(*row_id);
        }
        for (status, ids) in by_status {
            UnmatchedCitationEntity::update_many()
                .col_expr(UnmatchedCitationColumn::Status, Expr::value(status))
                .col_expr(UnmatchedCitationColumn::DateModified, Expr::value(now))
                .filter(UnmatchedCitationColumn::Id.is_in(ids))
                .filter(UnmatchedCitationColumn::CitingOpinionId.eq(citing_id))
                .exec(&txn)
                .await?;
        }

        let mut unmatched_inserted = 0;
        if !update.new_unmatched.is_empty() {
            let rows = update.new_unmatched.iter().map(|row| UnmatchedCitationActiveModel {
                citing_opinion_id: Set(citing_id),
                status: Set(row.status.into()),
                citation_string: Set(row.citation_string.clone()),
                volume: Set(row.volume),
                reporter: Set(row.reporter.clone()),
                page: Set(row.page.clone()),
                court_id: Set(row.court_id.clone()),
                year: Set(row.year),
                date_created: Set(now.into()),
                date_modified: Set(now.into()),
                ..Default::default()
            });

            unmatched_inserted = UnmatchedCitationEntity::insert_many(rows)
                .on_conflict(
                    OnConflict::columns([
                        UnmatchedCitationColumn::CitingOpinionId,
                        UnmatchedCitationColumn::Volume,
                        UnmatchedCitationColumn::Reporter,
                        UnmatchedCitationColumn::Page,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        // Replace relationships wholesale
        let previous: HashSet<i64> = OpinionCitedEntity::find()
            .select_only()
            .column(OpinionCitedColumn::CitedOpinionId)
            .filter(OpinionCitedColumn::CitingOpinionId.eq(citing_id))
            .into_tuple::<i64>()
            .all(&txn)
            .await?
            .into_iter()
            .collect();

        OpinionCitedEntity::delete_many()
            .filter(OpinionCitedColumn::CitingOpinionId.eq(citing_id))
            .exec(&txn)
            .await?;

        if !update.cited.is_empty() {
            let rows = update.cited.iter().map(|(cited_id, depth)| OpinionCitedActiveModel {
                citing_opinion_id: Set(citing_id),
                cited_opinion_id: Set(*cited_id),
                depth: Set(*depth),
                ..Default::default()
            });
            OpinionCitedEntity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        // A cluster is newly cited only if none of its opinions was cited before
        let touched: Vec<i64> = previous
            .iter()
            .copied()
            .chain(update.cited.iter().map(|(id, _)| *id))
            .collect();
        let cluster_of: HashMap<i64, i64> = if touched.is_empty() {
            HashMap::new()
        } else {
            OpinionEntity::find()
                .select_only()
                .column(OpinionColumn::Id)
                .column(OpinionColumn::ClusterId)
                .filter(OpinionColumn::Id.is_in(touched))
                .into_tuple::<(i64, i64)>()
                .all(&txn)
                .await?
                .into_iter()
                .collect()
        };

        let clusters = newly_cited_cluster_ids(&previous, &update.cited, &cluster_of);
        let newly_cited_clusters = clusters.len();
        if !clusters.is_empty() {
            OpinionClusterEntity::update_many()
                .col_expr(
                    OpinionClusterColumn::CitationCount,
                    Expr::col(OpinionClusterColumn::CitationCount).add(1),
                )
                .filter(OpinionClusterColumn::Id.is_in(clusters))
                .exec(&txn)
                .await?;
        }

        if let Some(html) = update.html_with_citations {
            OpinionEntity::update_many()
                .col_expr(OpinionColumn::HtmlWithCitations, Expr::value(html))
                .col_expr(OpinionColumn::DateModified, Expr::value(now))
                .filter(OpinionColumn::Id.eq(citing_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        let stats = CitationRunStats {
            relationships: update.cited.len(),
            newly_cited_clusters,
            status_updates: update.status_updates.len(),
            unmatched_inserted,
        };
        debug!(citing_opinion_id = citing_id, ?stats, "Citation run persisted");

        Ok(stats)
    }
}

/// Clusters cited now whose opinions were all absent from `previous`
fn newly_cited_cluster_ids(
    previous: &HashSet<i64>,
    cited: &[(i64, i32)],
    cluster_of: &HashMap<i64, i64>,
) -> Vec<i64> {
    let before: HashSet<i64> = previous
        .iter()
        .filter_map(|id| cluster_of.get(id).copied())
        .collect();
    let now: BTreeSet<i64> = cited
        .iter()
        .filter_map(|(id, _)| cluster_of.get(id).copied())
        .filter(|cluster| !before.contains(cluster))
        .collect();
    now.into_iter().collect()
}
