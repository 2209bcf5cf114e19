//! Citing/cited relationship between opinions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "opinions_cited")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Opinion that contains the citation
    pub citing_opinion_id: i64,

    /// Opinion being cited
    pub cited_opinion_id: i64,

    /// Number of times the citing opinion refers to the cited one
    pub depth: i32,
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

    #[sea_orm(
        belongs_to = "super::opinion::Entity",
        from = "Column::CitedOpinionId",
        to = "super::opinion::Column::Id",
        on_delete = "Cascade"
    )]
    CitedOpinion,
}

impl ActiveModelBehavior for ActiveModel {}
