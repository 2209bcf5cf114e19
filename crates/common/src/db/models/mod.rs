//! SeaORM entity models
//!
//! Database entities for the citation pipeline

mod opinion;
mod opinion_cited;
mod opinion_cluster;
mod unmatched_citation;

pub use opinion::{
    Entity as OpinionEntity,
    Model as Opinion,
    ActiveModel as OpinionActiveModel,
    Column as OpinionColumn,
};

pub use opinion_cluster::{
    Entity as OpinionClusterEntity,
    Model as OpinionCluster,
    ActiveModel as OpinionClusterActiveModel,
    Column as OpinionClusterColumn,
    CitationSlot,
};

pub use opinion_cited::{
    Entity as OpinionCitedEntity,
    Model as OpinionCited,
    ActiveModel as OpinionCitedActiveModel,
    Column as OpinionCitedColumn,
};

pub use unmatched_citation::{
    Entity as UnmatchedCitationEntity,
    Model as UnmatchedCitation,
    ActiveModel as UnmatchedCitationActiveModel,
    Column as UnmatchedCitationColumn,
    UnmatchedStatus,
};
