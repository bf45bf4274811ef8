//! Model feedback entity - audit decisions accumulated per model version

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Terminal audit outcome fed back to the model lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Accepted,
    Rejected,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackOutcome::Accepted => "accepted",
            FeedbackOutcome::Rejected => "rejected",
        }
    }
}

impl From<FeedbackOutcome> for String {
    fn from(outcome: FeedbackOutcome) -> Self {
        outcome.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "model_feedback")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Model version the reviewed record was extracted with
    #[sea_orm(column_type = "Text")]
    pub model_tag: String,

    /// Reviewed submission record
    pub record_id: Uuid,

    /// "accepted" | "rejected"
    #[sea_orm(column_type = "Text")]
    pub outcome: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
