//! Opinion cluster entity: case-level metadata shared by a cluster's opinions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "opinion_clusters")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text")]
    pub case_name: String,

    pub date_filed: Option<Date>,

    #[sea_orm(column_type = "Text")]
    pub court_id: String,

    #[sea_orm(column_type = "Text")]
    pub precedential_status: String,

    /// Number of distinct citing opinions
    pub citation_count: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub federal_cite_one: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub federal_cite_two: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub federal_cite_three: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub state_cite_one: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub state_cite_two: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub state_cite_three: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub state_cite_regional: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub specialty_cite_one: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub scotus_early_cite: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub lexis_cite: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub westlaw_cite: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub neutral_cite: Option<String>,
}

/// Type-specific citation slot on a cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationSlot {
    FederalCiteOne,
    FederalCiteTwo,
    FederalCiteThree,
    StateCiteOne,
    StateCiteTwo,
    StateCiteThree,
    StateCiteRegional,
    SpecialtyCiteOne,
    ScotusEarlyCite,
    LexisCite,
    WestlawCite,
    NeutralCite,
}

impl CitationSlot {
    /// Every slot, in column order
    pub const ALL: [CitationSlot; 12] = [
        CitationSlot::FederalCiteOne,
        CitationSlot::FederalCiteTwo,
        CitationSlot::FederalCiteThree,
        CitationSlot::StateCiteOne,
        CitationSlot::StateCiteTwo,
        CitationSlot::StateCiteThree,
        CitationSlot::StateCiteRegional,
        CitationSlot::SpecialtyCiteOne,
        CitationSlot::ScotusEarlyCite,
        CitationSlot::LexisCite,
        CitationSlot::WestlawCite,
        CitationSlot::NeutralCite,
    ];

    /// Column backing this slot
    pub fn column(self) -> Column {
        match self {
            CitationSlot::FederalCiteOne => Column::FederalCiteOne,
            CitationSlot::FederalCiteTwo => Column::FederalCiteTwo,
            CitationSlot::FederalCiteThree => Column::FederalCiteThree,
            CitationSlot::StateCiteOne => Column::StateCiteOne,
            CitationSlot::StateCiteTwo => Column::StateCiteTwo,
            CitationSlot::StateCiteThree => Column::StateCiteThree,
            CitationSlot::StateCiteRegional => Column::StateCiteRegional,
            CitationSlot::SpecialtyCiteOne => Column::SpecialtyCiteOne,
            CitationSlot::ScotusEarlyCite => Column::ScotusEarlyCite,
            CitationSlot::LexisCite => Column::LexisCite,
            CitationSlot::WestlawCite => Column::WestlawCite,
            CitationSlot::NeutralCite => Column::NeutralCite,
        }
    }
}

impl Model {
    /// Current value of a citation slot
    pub fn slot(&self, slot: CitationSlot) -> Option<&str> {
        let value = match slot {
            CitationSlot::FederalCiteOne => &self.federal_cite_one,
            CitationSlot::FederalCiteTwo => &self.federal_cite_two,
            CitationSlot::FederalCiteThree => &self.federal_cite_three,
            CitationSlot::StateCiteOne => &self.state_cite_one,
            CitationSlot::StateCiteTwo => &self.state_cite_two,
            CitationSlot::StateCiteThree => &self.state_cite_three,
            CitationSlot::StateCiteRegional => &self.state_cite_regional,
            CitationSlot::SpecialtyCiteOne => &self.specialty_cite_one,
            CitationSlot::ScotusEarlyCite => &self.scotus_early_cite,
            CitationSlot::LexisCite => &self.lexis_cite,
            CitationSlot::WestlawCite => &self.westlaw_cite,
            CitationSlot::NeutralCite => &self.neutral_cite,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// All non-empty citation strings carried by this cluster
    pub fn citation_strings(&self) -> Vec<&str> {
        CitationSlot::ALL
            .iter()
            .filter_map(|slot| self.slot(*slot))
            .collect()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::opinion::Entity")]
    Opinions,
}

impl Related<super::opinion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Opinions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
