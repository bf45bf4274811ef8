//! Promotion engine
//!
//! Migrates accepted staging records into the production store. The whole
//! promotion for a submission runs in one database transaction (the only
//! multi-record transaction in the system): either all eligible records and
//! links commit, or none do. Re-promoting is a no-op, not a duplicate.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::policy::{self, AuditAction, UserRole};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// Outcome of one promote call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionReport {
    pub submission_id: Uuid,
    /// Production records newly created by this call
    pub created: Vec<Uuid>,
    /// Existing production records refreshed by dedup matching
    pub updated: Vec<Uuid>,
    /// Submission records that were already promoted (no-ops)
    pub already_promoted: Vec<Uuid>,
    pub links_created: usize,
    /// Partially-accepted links and anything else the reviewer should see
    pub warnings: Vec<String>,
}

/// Dedup key: a record matches an existing production entry on
/// (kind, source file, source page, normalized title)
fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Promotion engine over the staging and production stores
#[derive(Clone)]
pub struct PromotionEngine {
    pool: DbPool,
}

impl PromotionEngine {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Promote a submission's accepted records into production.
    ///
    /// Link handling: both endpoints accepted gets a production link;
    /// exactly one endpoint accepted gets promoted unlinked with a warning;
    /// a dangling production reference is never created.
    #[instrument(skip(self), fields(submission_id = %submission_id, role = %role))]
    pub async fn promote(
        &self,
        submission_id: Uuid,
        role: UserRole,
    ) -> Result<PromotionReport> {
        policy::require(role, AuditAction::Promote)?;

        let txn = self.pool.write().begin().await?;

        SubmissionEntity::find_by_id(submission_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::SubmissionNotFound {
                id: submission_id.to_string(),
            })?;

        let records = SubmissionRecordEntity::find()
            .filter(SubmissionRecordColumn::SubmissionId.eq(submission_id))
            .order_by_asc(SubmissionRecordColumn::CreatedAt)
            .order_by_asc(SubmissionRecordColumn::Id)
            .all(&txn)
            .await?;

        let links = SubmissionLinkEntity::find()
            .filter(SubmissionLinkColumn::SubmissionId.eq(submission_id))
            .all(&txn)
            .await?;

        let mut report = PromotionReport {
            submission_id,
            created: Vec::new(),
            updated: Vec::new(),
            already_promoted: Vec::new(),
            links_created: 0,
            warnings: Vec::new(),
        };

        // Submission record id -> production record id, for link creation
        let mut production_ids: HashMap<Uuid, Uuid> = HashMap::new();
        let now = Utc::now();

        for record in &records {
            if record.status() != AuditStatus::Accepted {
                continue;
            }

            let existing = Self::find_production_match(&txn, record).await?;

            let production_id = match existing {
                Some(production) if record.is_promoted() => {
                    report.already_promoted.push(record.id);
                    production.id
                }
                Some(production) => {
                    // Dedup hit: refresh provenance instead of duplicating
                    let production_id = production.id;
                    let mut active: ProductionRecordActiveModel = production.into();
                    active.body = Set(record.body.clone());
                    active.source_excerpt = Set(record.source_excerpt.clone());
                    active.promoted_from = Set(Some(record.id));
                    active.updated_at = Set(now.into());
                    active.update(&txn).await?;

                    Self::stamp_promoted(&txn, record, now).await?;
                    report.updated.push(production_id);
                    production_id
                }
                None if record.is_promoted() => {
                    // Promoted earlier but the production row has since been
                    // reshaped; nothing to re-create, just report the no-op.
                    report.already_promoted.push(record.id);
                    continue;
                }
                None => {
                    let production_id = Uuid::new_v4();
                    let row = ProductionRecordActiveModel {
                        id: Set(production_id),
                        kind: Set(record.kind.clone()),
                        title: Set(record.title.clone()),
                        body: Set(record.body.clone()),
                        source_file: Set(record.source_file.clone()),
                        source_page: Set(record.source_page),
                        source_excerpt: Set(record.source_excerpt.clone()),
                        promoted_from: Set(Some(record.id)),
                        created_at: Set(now.into()),
                        updated_at: Set(now.into()),
                    };
                    row.insert(&txn).await?;

                    Self::stamp_promoted(&txn, record, now).await?;
                    report.created.push(production_id);
                    production_id
                }
            };

            production_ids.insert(record.id, production_id);
        }

        let by_id: HashMap<Uuid, &SubmissionRecord> =
            records.iter().map(|r| (r.id, r)).collect();

        for link in &links {
            let vuln_promoted = production_ids.get(&link.vulnerability_id);
            let option_promoted = production_ids.get(&link.option_id);

            match (vuln_promoted, option_promoted) {
                (Some(&vuln_id), Some(&option_id)) => {
                    if Self::link_exists(&txn, vuln_id, option_id).await? {
                        continue;
                    }
                    let row = ProductionLinkActiveModel {
                        id: Set(Uuid::new_v4()),
                        vulnerability_id: Set(vuln_id),
                        option_id: Set(option_id),
                        created_at: Set(now.into()),
                    };
                    row.insert(&txn).await?;
                    report.links_created += 1;
                }
                (Some(_), None) | (None, Some(_)) => {
                    let (promoted, held_back) = if vuln_promoted.is_some() {
                        (link.vulnerability_id, link.option_id)
                    } else {
                        (link.option_id, link.vulnerability_id)
                    };
                    let status = by_id
                        .get(&held_back)
                        .map(|r| r.audit_status.clone())
                        .unwrap_or_else(|| "missing".to_string());
                    report.warnings.push(format!(
                        "Record {} promoted unlinked: linked record {} is {} and stays in staging",
                        promoted, held_back, status
                    ));
                }
                (None, None) => {}
            }
        }

        txn.commit().await?;

        info!(
            submission_id = %submission_id,
            created = report.created.len(),
            updated = report.updated.len(),
            already_promoted = report.already_promoted.len(),
            links = report.links_created,
            warnings = report.warnings.len(),
            "Promotion committed"
        );

        Ok(report)
    }

    async fn find_production_match(
        txn: &DatabaseTransaction,
        record: &SubmissionRecord,
    ) -> Result<Option<ProductionRecord>> {
        let mut query = ProductionRecordEntity::find()
            .filter(ProductionRecordColumn::Kind.eq(record.kind.clone()));

        query = match &record.source_file {
            Some(file) => query.filter(ProductionRecordColumn::SourceFile.eq(file.clone())),
            None => query.filter(ProductionRecordColumn::SourceFile.is_null()),
        };
        query = match record.source_page {
            Some(page) => query.filter(ProductionRecordColumn::SourcePage.eq(page)),
            None => query.filter(ProductionRecordColumn::SourcePage.is_null()),
        };

        let wanted = normalize_title(&record.title);
        let candidates = query.all(txn).await?;

        Ok(candidates
            .into_iter()
            .find(|candidate| normalize_title(&candidate.title) == wanted))
    }

    async fn link_exists(
        txn: &DatabaseTransaction,
        vulnerability_id: Uuid,
        option_id: Uuid,
    ) -> Result<bool> {
        let existing = ProductionLinkEntity::find()
            .filter(ProductionLinkColumn::VulnerabilityId.eq(vulnerability_id))
            .filter(ProductionLinkColumn::OptionId.eq(option_id))
            .one(txn)
            .await?;
        Ok(existing.is_some())
    }

    async fn stamp_promoted(
        txn: &DatabaseTransaction,
        record: &SubmissionRecord,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let mut active: SubmissionRecordActiveModel = record.clone().into();
        active.promoted_at = Set(Some(now.into()));
        active.updated_at = Set(now.into());
        active.update(txn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditGateway;
    use crate::db::schema::create_schema;
    use crate::db::{Repository, StagedLink, StagedRecord, StagedSubmission};
    use sea_orm::{Database, PaginatorTrait};

    struct Fixture {
        pool: DbPool,
        repo: Repository,
        gateway: AuditGateway,
        engine: PromotionEngine,
    }

    async fn fixture() -> Fixture {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        create_schema(&conn).await.unwrap();
        let pool = DbPool::from_connection(conn);
        let repo = Repository::new(pool.clone());
        Fixture {
            gateway: AuditGateway::new(repo.clone()),
            engine: PromotionEngine::new(pool.clone()),
            repo,
            pool,
        }
    }

    fn vuln(title: &str, page: i32) -> StagedRecord {
        StagedRecord {
            kind: RecordKind::Vulnerability,
            title: title.to_string(),
            body: "observed during walkthrough".to_string(),
            source_file: Some("survey.pdf".to_string()),
            source_page: Some(page),
            source_excerpt: Some("excerpt of the finding".to_string()),
        }
    }

    fn option(title: &str, page: i32) -> StagedRecord {
        StagedRecord {
            kind: RecordKind::OptionForConsideration,
            title: title.to_string(),
            body: "proposed mitigation".to_string(),
            source_file: Some("survey.pdf".to_string()),
            source_page: Some(page),
            source_excerpt: Some("excerpt of the option".to_string()),
        }
    }

    async fn stage(
        fx: &Fixture,
        records: Vec<StagedRecord>,
        links: Vec<StagedLink>,
    ) -> (Uuid, Vec<Uuid>) {
        let submission = fx
            .repo
            .stage_submission(StagedSubmission {
                source_file: "survey.pdf".to_string(),
                content_hash: None,
                model_tag: "baseline-v1".to_string(),
                records,
                links,
            })
            .await
            .unwrap();
        let ids = fx
            .repo
            .records_by_submission(submission.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        (submission.id, ids)
    }

    async fn production_count(fx: &Fixture) -> u64 {
        ProductionRecordEntity::find()
            .count(fx.pool.read())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_promotion_requires_senior_role() {
        let fx = fixture().await;
        let (submission_id, _) = stage(&fx, vec![vuln("Unlocked gate", 3)], vec![]).await;

        let err = fx
            .engine
            .promote(submission_id, UserRole::Psa)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied { .. }));
        assert_eq!(production_count(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_promotion_is_idempotent() {
        let fx = fixture().await;
        let (submission_id, ids) = stage(
            &fx,
            vec![vuln("Unlocked gate", 3), option("Badge readers", 3)],
            vec![StagedLink { vulnerability: 0, option: 1 }],
        )
        .await;

        for id in &ids {
            fx.gateway
                .set_audit_status(*id, AuditStatus::Accepted, UserRole::Spsa)
                .await
                .unwrap();
        }

        let first = fx.engine.promote(submission_id, UserRole::Spsa).await.unwrap();
        assert_eq!(first.created.len(), 2);
        assert_eq!(first.links_created, 1);
        assert!(first.warnings.is_empty());
        assert_eq!(production_count(&fx).await, 2);

        // Second call: same production set, zero newly-created records
        let second = fx.engine.promote(submission_id, UserRole::Spsa).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.already_promoted.len(), 2);
        assert_eq!(second.links_created, 0);
        assert_eq!(production_count(&fx).await, 2);
    }

    #[tokio::test]
    async fn test_partially_accepted_link_promotes_unlinked_with_warning() {
        let fx = fixture().await;
        let (submission_id, ids) = stage(
            &fx,
            vec![vuln("Unlocked gate", 3), option("Badge readers", 3)],
            vec![StagedLink { vulnerability: 0, option: 1 }],
        )
        .await;

        // Only the vulnerability is accepted; the option stays pending
        fx.gateway
            .set_audit_status(ids[0], AuditStatus::Accepted, UserRole::Spsa)
            .await
            .unwrap();

        let report = fx.engine.promote(submission_id, UserRole::Spsa).await.unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.links_created, 0);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("unlinked"));

        // No dangling production link
        let links = ProductionLinkEntity::find()
            .count(fx.pool.read())
            .await
            .unwrap();
        assert_eq!(links, 0);

        // The pending option is untouched in staging
        let pending = fx.repo.find_record_by_id(ids[1]).await.unwrap().unwrap();
        assert_eq!(pending.status(), AuditStatus::Pending);
        assert!(!pending.is_promoted());
    }

    #[tokio::test]
    async fn test_dedup_updates_existing_production_entry() {
        let fx = fixture().await;

        let (first_submission, first_ids) =
            stage(&fx, vec![vuln("Unlocked gate", 3)], vec![]).await;
        fx.gateway
            .set_audit_status(first_ids[0], AuditStatus::Accepted, UserRole::Spsa)
            .await
            .unwrap();
        fx.engine.promote(first_submission, UserRole::Spsa).await.unwrap();

        // A re-extraction proposes the same finding with different casing
        let (second_submission, second_ids) =
            stage(&fx, vec![vuln("unlocked  GATE", 3)], vec![]).await;
        fx.gateway
            .set_audit_status(second_ids[0], AuditStatus::Accepted, UserRole::Spsa)
            .await
            .unwrap();

        let report = fx.engine.promote(second_submission, UserRole::Spsa).await.unwrap();
        assert!(report.created.is_empty());
        assert_eq!(report.updated.len(), 1);
        assert_eq!(production_count(&fx).await, 1);

        // Provenance now points at the latest accepted record
        let production = ProductionRecordEntity::find()
            .one(fx.pool.read())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(production.promoted_from, Some(second_ids[0]));
    }

    #[tokio::test]
    async fn test_pending_records_are_not_promoted() {
        let fx = fixture().await;
        let (submission_id, ids) = stage(
            &fx,
            vec![vuln("Unlocked gate", 3), vuln("Blind spot at dock", 7)],
            vec![],
        )
        .await;

        fx.gateway
            .set_audit_status(ids[0], AuditStatus::Accepted, UserRole::Admin)
            .await
            .unwrap();

        let report = fx.engine.promote(submission_id, UserRole::Admin).await.unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(production_count(&fx).await, 1);
    }

    #[tokio::test]
    async fn test_promote_unknown_submission_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .engine
            .promote(Uuid::new_v4(), UserRole::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SubmissionNotFound { .. }));
    }
}
