//! Opinion entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "opinions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub cluster_id: i64,

    #[sea_orm(column_type = "Text")]
    pub plain_text: String,

    /// Original markup, when the source supplied any
    #[sea_orm(column_type = "Text", nullable)]
    pub html: Option<String>,

    /// Annotated output of the last successful citation run
    #[sea_orm(column_type = "Text", nullable)]
    pub html_with_citations: Option<String>,

    pub date_modified: DateTimeWithTimeZone,
}

impl Model {
    /// Markup source if present and non-empty
    pub fn markup(&self) -> Option<&str> {
        self.html.as_deref().filter(|h| !h.trim().is_empty())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::opinion_cluster::Entity",
        from = "Column::ClusterId",
        to = "super::opinion_cluster::Column::Id",
        on_delete = "Cascade"
    )]
    Cluster,
}

impl Related<super::opinion_cluster::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cluster.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
