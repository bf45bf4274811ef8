//! Production link entity - promoted vulnerability <-> option association

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_links")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Vulnerability-side production record
    pub vulnerability_id: Uuid,

    /// Option-for-consideration-side production record
    pub option_id: Uuid,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::production_record::Entity",
        from = "Column::VulnerabilityId",
        to = "super::production_record::Column::Id"
    )]
    Vulnerability,

    #[sea_orm(
        belongs_to = "super::production_record::Entity",
        from = "Column::OptionId",
        to = "super::production_record::Column::Id"
    )]
    Option,
}

impl ActiveModelBehavior for ActiveModel {}
