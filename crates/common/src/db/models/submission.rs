//! Submission entity - one extraction run over one source document

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stable filename of the source document
    #[sea_orm(column_type = "Text")]
    pub source_file: String,

    /// SHA-256 of the document bytes at extraction time
    #[sea_orm(column_type = "Text", nullable)]
    pub content_hash: Option<String>,

    /// Model version the extraction ran with
    #[sea_orm(column_type = "Text")]
    pub model_tag: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::submission_record::Entity")]
    Records,

    #[sea_orm(has_many = "super::submission_link::Entity")]
    Links,
}

impl Related<super::submission_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl Related<super::submission_link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Links.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
