//! Unmatched citation entity for incremental re-resolution

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Tracking status of an unmatched citation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedStatus {
    /// Zero candidates the first time it was seen
    Found,
    /// Still unresolved on a later run
    Failed,
    /// More than one candidate
    FailedAmbiguous,
    /// Resolves now; terminal
    Resolved,
}

impl UnmatchedStatus {
    pub fn is_terminal(self) -> bool {
        self == UnmatchedStatus::Resolved
    }
}

impl From<String> for UnmatchedStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "found" => UnmatchedStatus::Found,
            "failed" => UnmatchedStatus::Failed,
            "failed_ambiguous" => UnmatchedStatus::FailedAmbiguous,
            "resolved" => UnmatchedStatus::Resolved,
            _ => UnmatchedStatus::Found,
        }
    }
}

impl From<UnmatchedStatus> for String {
    fn from(status: UnmatchedStatus) -> Self {
        match status {
            UnmatchedStatus::Found => "found".to_string(),
            UnmatchedStatus::Failed => "failed".to_string(),
            UnmatchedStatus::FailedAmbiguous => "failed_ambiguous".to_string(),
            UnmatchedStatus::Resolved => "resolved".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "unmatched_citations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub citing_opinion_id: i64,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Base citation string, e.g. "410 U.S. 113"
    #[sea_orm(column_type = "Text")]
    pub citation_string: String,

    pub volume: i16,

    #[sea_orm(column_type = "Text")]
    pub reporter: String,

    #[sea_orm(column_type = "Text")]
    pub page: String,

    /// Court guessed from the parenthetical
    #[sea_orm(column_type = "Text", nullable)]
    pub court_id: Option<String>,

    pub year: Option<i32>,

    pub date_created: DateTimeWithTimeZone,

    pub date_modified: DateTimeWithTimeZone,
}

impl Model {
    /// Get the tracking status as an enum
    pub fn unmatched_status(&self) -> UnmatchedStatus {
        UnmatchedStatus::from(self.status.clone())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::opinion::Entity",
        from = "Column::CitingOpinionId",
        to = "super::opinion::Column::Id",
        on_delete = "Cascade"
    )]
    CitingOpinion,
}

impl Related<super::opinion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CitingOpinion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_conversion() {
        for status in [
            UnmatchedStatus::Found,
            UnmatchedStatus::Failed,
            UnmatchedStatus::FailedAmbiguous,
            UnmatchedStatus::Resolved,
        ] {
            let s: String = status.into();
            assert_eq!(UnmatchedStatus::from(s), status);
        }
    }

    #[test]
    fn test_only_resolved_is_terminal() {
        assert!(UnmatchedStatus::Resolved.is_terminal());
        assert!(!UnmatchedStatus::Failed.is_terminal());
    }
}
