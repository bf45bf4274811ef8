//! Model version entity - registry of extraction model versions

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a model version
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Candidate,
    Active,
    Retired,
}

impl ModelStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "candidate" => Some(ModelStatus::Candidate),
            "active" => Some(ModelStatus::Active),
            "retired" => Some(ModelStatus::Retired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Candidate => "candidate",
            ModelStatus::Active => "active",
            ModelStatus::Retired => "retired",
        }
    }
}

impl From<ModelStatus> for String {
    fn from(status: ModelStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "model_versions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Unique version identifier, e.g. "extractor-2026-07-14"
    #[sea_orm(column_type = "Text", unique)]
    pub tag: String,

    /// Training-data snapshot this version was produced from
    #[sea_orm(column_type = "Text", nullable)]
    pub snapshot_ref: Option<String>,

    /// "candidate" | "active" | "retired"
    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Validation outcome, failure reason, operator notes
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    pub activated_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn model_status(&self) -> Option<ModelStatus> {
        ModelStatus::parse(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.model_status() == Some(ModelStatus::Active)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
