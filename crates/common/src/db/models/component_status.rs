//! Component status entity - heartbeats behind the health surface

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "component_status")]
pub struct Model {
    /// Component name, e.g. "extraction-worker", "model-manager"
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub component: String,

    pub accepting_work: bool,

    pub last_seen: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
