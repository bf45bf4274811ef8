//! Schema bootstrap
//!
//! Creates all DocSift tables from the entity definitions. Production schema
//! is applied by the operator console's migrations; this bootstrap exists for
//! tests and local development against an empty database.

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, Schema};

/// Create every DocSift table if it does not already exist
pub async fn create_schema(db: &DatabaseConnection) -> Result<()> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = vec![
        schema.create_table_from_entity(SubmissionEntity),
        schema.create_table_from_entity(SubmissionRecordEntity),
        schema.create_table_from_entity(SubmissionLinkEntity),
        schema.create_table_from_entity(ProductionRecordEntity),
        schema.create_table_from_entity(ProductionLinkEntity),
        schema.create_table_from_entity(ModelVersionEntity),
        schema.create_table_from_entity(ModelFeedbackEntity),
        schema.create_table_from_entity(ComponentStatusEntity),
    ];

    for mut stmt in statements {
        db.execute(backend.build(stmt.if_not_exists())).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;

    #[tokio::test]
    async fn test_schema_bootstrap_is_idempotent() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        create_schema(&db).await.unwrap();
        // Second run must not fail on existing tables
        create_schema(&db).await.unwrap();
    }
}
