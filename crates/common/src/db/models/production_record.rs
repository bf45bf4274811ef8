//! Production record entity - an accepted finding in the authoritative set
//!
//! Created only by the Promotion Engine; extraction never touches these rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "production_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// "vulnerability" | "option_for_consideration"
    #[sea_orm(column_type = "Text")]
    pub kind: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub body: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub source_file: Option<String>,

    pub source_page: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub source_excerpt: Option<String>,

    /// Submission record this row was promoted from (latest, after dedup)
    pub promoted_from: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
