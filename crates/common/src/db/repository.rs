//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support. Every mutation here
//! is a single-record (or single-submission) transaction; the one wider
//! transaction in the system lives in the promotion engine.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record staged as part of a new submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedRecord {
    pub kind: RecordKind,
    pub title: String,
    pub body: String,
    pub source_file: Option<String>,
    pub source_page: Option<i32>,
    pub source_excerpt: Option<String>,
}

/// A link between two staged records, by index into the record list
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StagedLink {
    pub vulnerability: usize,
    pub option: usize,
}

/// One complete extraction result, written atomically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedSubmission {
    pub source_file: String,
    pub content_hash: Option<String>,
    pub model_tag: String,
    pub records: Vec<StagedRecord>,
    pub links: Vec<StagedLink>,
}

/// Ordering for record listings; stable so paginated audit UIs
/// do not skip or duplicate records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrder {
    #[default]
    CreatedAsc,
    CreatedDesc,
}

/// Filter for record listings
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<AuditStatus>,
    pub kind: Option<RecordKind>,
    pub source_file: Option<String>,
    pub submission_id: Option<Uuid>,
    pub order: RecordOrder,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Submission Operations
    // ========================================================================

    /// Stage one extraction result: submission + records + links, atomically.
    ///
    /// Link endpoints are validated against the record list (vulnerability
    /// side must be a vulnerability, option side an option-for-consideration)
    /// so a link can never reference outside its own submission.
    pub async fn stage_submission(&self, staged: StagedSubmission) -> Result<Submission> {
        for link in &staged.links {
            let vuln = staged.records.get(link.vulnerability).ok_or_else(|| {
                AppError::Integrity {
                    message: format!("Link references record index {} out of range", link.vulnerability),
                }
            })?;
            let option = staged.records.get(link.option).ok_or_else(|| {
                AppError::Integrity {
                    message: format!("Link references record index {} out of range", link.option),
                }
            })?;
            if vuln.kind != RecordKind::Vulnerability
                || option.kind != RecordKind::OptionForConsideration
            {
                return Err(AppError::Integrity {
                    message: "Link endpoints must pair a vulnerability with an option for consideration"
                        .to_string(),
                });
            }
        }

        let now = Utc::now();
        let submission_id = Uuid::new_v4();
        let record_ids: Vec<Uuid> = staged.records.iter().map(|_| Uuid::new_v4()).collect();

        let txn = self.write_conn().begin().await?;

        let submission = SubmissionActiveModel {
            id: Set(submission_id),
            source_file: Set(staged.source_file.clone()),
            content_hash: Set(staged.content_hash.clone()),
            model_tag: Set(staged.model_tag.clone()),
            created_at: Set(now.into()),
        };
        let submission = submission.insert(&txn).await?;

        for (record, record_id) in staged.records.iter().zip(record_ids.iter()) {
            let row = SubmissionRecordActiveModel {
                id: Set(*record_id),
                submission_id: Set(submission_id),
                kind: Set(record.kind.as_str().to_string()),
                title: Set(record.title.clone()),
                body: Set(record.body.clone()),
                source_file: Set(record.source_file.clone()),
                source_page: Set(record.source_page),
                source_excerpt: Set(record.source_excerpt.clone()),
                audit_status: Set(AuditStatus::Pending.as_str().to_string()),
                promoted_at: Set(None),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            };
            row.insert(&txn).await?;
        }

        for link in &staged.links {
            let row = SubmissionLinkActiveModel {
                id: Set(Uuid::new_v4()),
                submission_id: Set(submission_id),
                vulnerability_id: Set(record_ids[link.vulnerability]),
                option_id: Set(record_ids[link.option]),
                created_at: Set(now.into()),
            };
            row.insert(&txn).await?;
        }

        txn.commit().await?;

        Ok(submission)
    }

    /// Find submission by ID
    pub async fn find_submission_by_id(&self, id: Uuid) -> Result<Option<Submission>> {
        SubmissionEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Submissions created before a cutoff, oldest first
    pub async fn submissions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Submission>> {
        SubmissionEntity::find()
            .filter(SubmissionColumn::CreatedAt.lt(cutoff))
            .order_by_asc(SubmissionColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Delete a submission with its records and links
    pub async fn delete_submission_cascade(&self, id: Uuid) -> Result<bool> {
        let txn = self.write_conn().begin().await?;

        SubmissionLinkEntity::delete_many()
            .filter(SubmissionLinkColumn::SubmissionId.eq(id))
            .exec(&txn)
            .await?;

        SubmissionRecordEntity::delete_many()
            .filter(SubmissionRecordColumn::SubmissionId.eq(id))
            .exec(&txn)
            .await?;

        let result = SubmissionEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Record Operations
    // ========================================================================

    /// Find a submission record by ID
    pub async fn find_record_by_id(&self, id: Uuid) -> Result<Option<SubmissionRecord>> {
        SubmissionRecordEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List submission records with filtering and stable ordering
    pub async fn list_records(&self, filter: RecordFilter) -> Result<Vec<SubmissionRecord>> {
        let mut query = SubmissionRecordEntity::find();

        if let Some(status) = filter.status {
            query = query.filter(SubmissionRecordColumn::AuditStatus.eq(status.as_str()));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(SubmissionRecordColumn::Kind.eq(kind.as_str()));
        }
        if let Some(ref source_file) = filter.source_file {
            query = query.filter(SubmissionRecordColumn::SourceFile.eq(source_file.clone()));
        }
        if let Some(submission_id) = filter.submission_id {
            query = query.filter(SubmissionRecordColumn::SubmissionId.eq(submission_id));
        }

        // Tie-break on id so equal timestamps still order deterministically
        query = match filter.order {
            RecordOrder::CreatedAsc => query
                .order_by_asc(SubmissionRecordColumn::CreatedAt)
                .order_by_asc(SubmissionRecordColumn::Id),
            RecordOrder::CreatedDesc => query
                .order_by_desc(SubmissionRecordColumn::CreatedAt)
                .order_by_desc(SubmissionRecordColumn::Id),
        };

        if let Some(offset) = filter.offset {
            query = query.offset(offset);
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        query.all(self.read_conn()).await.map_err(Into::into)
    }

    /// Records belonging to a submission, creation order
    pub async fn records_by_submission(
        &self,
        submission_id: Uuid,
    ) -> Result<Vec<SubmissionRecord>> {
        SubmissionRecordEntity::find()
            .filter(SubmissionRecordColumn::SubmissionId.eq(submission_id))
            .order_by_asc(SubmissionRecordColumn::CreatedAt)
            .order_by_asc(SubmissionRecordColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Links belonging to a submission
    pub async fn links_by_submission(&self, submission_id: Uuid) -> Result<Vec<SubmissionLink>> {
        SubmissionLinkEntity::find()
            .filter(SubmissionLinkColumn::SubmissionId.eq(submission_id))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Write a record's audit status. Policy and transition checks belong to
    /// the audit gateway; this is the raw single-record update.
    pub async fn update_record_status(
        &self,
        record_id: Uuid,
        new_status: AuditStatus,
    ) -> Result<SubmissionRecord> {
        let record = SubmissionRecordEntity::find_by_id(record_id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::RecordNotFound {
                id: record_id.to_string(),
            })?;

        let mut active: SubmissionRecordActiveModel = record.into();
        active.audit_status = Set(new_status.as_str().to_string());
        active.updated_at = Set(Utc::now().into());

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Model Registry Operations
    // ========================================================================

    /// Seed the registry with an active baseline if it is empty
    pub async fn ensure_baseline_model(&self, tag: &str) -> Result<ModelVersion> {
        if let Some(active) = self.active_model().await? {
            return Ok(active);
        }

        let now = Utc::now();
        let version = ModelVersionActiveModel {
            id: Set(Uuid::new_v4()),
            tag: Set(tag.to_string()),
            snapshot_ref: Set(None),
            status: Set(ModelStatus::Active.as_str().to_string()),
            notes: Set(Some("seeded baseline".to_string())),
            activated_at: Set(Some(now.into())),
            created_at: Set(now.into()),
        };

        tracing::info!(tag = %tag, "Seeding baseline model version");
        version.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// The single active model version
    pub async fn active_model(&self) -> Result<Option<ModelVersion>> {
        ModelVersionEntity::find()
            .filter(ModelVersionColumn::Status.eq(ModelStatus::Active.as_str()))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find a model version by tag
    pub async fn find_model_by_tag(&self, tag: &str) -> Result<Option<ModelVersion>> {
        ModelVersionEntity::find()
            .filter(ModelVersionColumn::Tag.eq(tag))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Register a freshly trained candidate
    pub async fn insert_candidate_model(
        &self,
        tag: &str,
        snapshot_ref: Option<String>,
    ) -> Result<ModelVersion> {
        let now = Utc::now();
        let version = ModelVersionActiveModel {
            id: Set(Uuid::new_v4()),
            tag: Set(tag.to_string()),
            snapshot_ref: Set(snapshot_ref),
            status: Set(ModelStatus::Candidate.as_str().to_string()),
            notes: Set(None),
            activated_at: Set(None),
            created_at: Set(now.into()),
        };

        version.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Activate a validated candidate and retire the previously active
    /// version, in one transaction. The candidate must still be a candidate
    /// when the transaction runs; anything else is a conflict.
    pub async fn activate_model(&self, candidate_id: Uuid) -> Result<ModelVersion> {
        let now = Utc::now();
        let txn = self.write_conn().begin().await?;

        let candidate = ModelVersionEntity::find_by_id(candidate_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ModelNotFound {
                tag: candidate_id.to_string(),
            })?;

        if candidate.model_status() != Some(ModelStatus::Candidate) {
            return Err(AppError::Conflict {
                message: format!(
                    "Model {} is {} and cannot be activated",
                    candidate.tag, candidate.status
                ),
            });
        }

        let current = ModelVersionEntity::find()
            .filter(ModelVersionColumn::Status.eq(ModelStatus::Active.as_str()))
            .one(&txn)
            .await?;

        if let Some(current) = current {
            let mut retired: ModelVersionActiveModel = current.into();
            retired.status = Set(ModelStatus::Retired.as_str().to_string());
            retired.update(&txn).await?;
        }

        let mut active: ModelVersionActiveModel = candidate.into();
        active.status = Set(ModelStatus::Active.as_str().to_string());
        active.activated_at = Set(Some(now.into()));
        let activated = active.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(tag = %activated.tag, "Model version activated");
        Ok(activated)
    }

    /// Retire a model version (failed validation, manual retirement)
    pub async fn retire_model(&self, id: Uuid, note: Option<String>) -> Result<ModelVersion> {
        let version = ModelVersionEntity::find_by_id(id)
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::ModelNotFound { tag: id.to_string() })?;

        let mut active: ModelVersionActiveModel = version.into();
        active.status = Set(ModelStatus::Retired.as_str().to_string());
        if let Some(note) = note {
            active.notes = Set(Some(note));
        }

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Feedback Operations
    // ========================================================================

    /// Append an audit decision for a model version
    pub async fn insert_feedback(
        &self,
        model_tag: &str,
        record_id: Uuid,
        outcome: FeedbackOutcome,
    ) -> Result<ModelFeedback> {
        let feedback = ModelFeedbackActiveModel {
            id: Set(Uuid::new_v4()),
            model_tag: Set(model_tag.to_string()),
            record_id: Set(record_id),
            outcome: Set(outcome.as_str().to_string()),
            created_at: Set(Utc::now().into()),
        };

        feedback.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Count feedback rows for a model version since a point in time
    pub async fn count_feedback_since(
        &self,
        model_tag: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        ModelFeedbackEntity::find()
            .filter(ModelFeedbackColumn::ModelTag.eq(model_tag))
            .filter(ModelFeedbackColumn::CreatedAt.gte(since))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Component Heartbeats
    // ========================================================================

    /// Upsert a component's accepting-work heartbeat
    pub async fn upsert_component_status(
        &self,
        component: &str,
        accepting_work: bool,
    ) -> Result<()> {
        let row = ComponentStatusActiveModel {
            component: Set(component.to_string()),
            accepting_work: Set(accepting_work),
            last_seen: Set(Utc::now().into()),
        };

        ComponentStatusEntity::insert(row)
            .on_conflict(
                OnConflict::column(ComponentStatusColumn::Component)
                    .update_columns([
                        ComponentStatusColumn::AcceptingWork,
                        ComponentStatusColumn::LastSeen,
                    ])
                    .to_owned(),
            )
            .exec(self.write_conn())
            .await?;

        Ok(())
    }

    /// All known component heartbeats
    pub async fn list_component_status(&self) -> Result<Vec<ComponentStatus>> {
        ComponentStatusEntity::find()
            .order_by_asc(ComponentStatusColumn::Component)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_schema;
    use sea_orm::Database;

    async fn test_repo() -> Repository {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        create_schema(&conn).await.unwrap();
        Repository::new(DbPool::from_connection(conn))
    }

    fn staged(records: Vec<StagedRecord>, links: Vec<StagedLink>) -> StagedSubmission {
        StagedSubmission {
            source_file: "site-survey.pdf".to_string(),
            content_hash: Some("abc123".to_string()),
            model_tag: "baseline-v1".to_string(),
            records,
            links,
        }
    }

    fn vuln(title: &str) -> StagedRecord {
        StagedRecord {
            kind: RecordKind::Vulnerability,
            title: title.to_string(),
            body: "unsecured perimeter access".to_string(),
            source_file: Some("site-survey.pdf".to_string()),
            source_page: Some(3),
            source_excerpt: Some("The perimeter gate was found unlocked".to_string()),
        }
    }

    fn option(title: &str) -> StagedRecord {
        StagedRecord {
            kind: RecordKind::OptionForConsideration,
            title: title.to_string(),
            body: "install electronic access control".to_string(),
            source_file: Some("site-survey.pdf".to_string()),
            source_page: Some(3),
            source_excerpt: Some("Consider electronic access control".to_string()),
        }
    }

    #[tokio::test]
    async fn test_stage_submission_defaults_to_pending() {
        let repo = test_repo().await;

        let submission = repo
            .stage_submission(staged(
                vec![vuln("Unlocked gate"), option("Access control")],
                vec![StagedLink { vulnerability: 0, option: 1 }],
            ))
            .await
            .unwrap();

        let records = repo.records_by_submission(submission.id).await.unwrap();
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.status(), AuditStatus::Pending);
            assert!(!record.is_promoted());
        }

        let links = repo.links_by_submission(submission.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].submission_id, submission.id);
    }

    #[tokio::test]
    async fn test_stage_submission_rejects_mismatched_link() {
        let repo = test_repo().await;

        // Link endpoints swapped: option on the vulnerability side
        let err = repo
            .stage_submission(staged(
                vec![vuln("Unlocked gate"), option("Access control")],
                vec![StagedLink { vulnerability: 1, option: 0 }],
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_list_records_stable_order_and_filters() {
        let repo = test_repo().await;

        let submission = repo
            .stage_submission(staged(
                vec![vuln("A"), vuln("B"), option("C")],
                vec![],
            ))
            .await
            .unwrap();

        let all = repo.list_records(RecordFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let vulns = repo
            .list_records(RecordFilter {
                kind: Some(RecordKind::Vulnerability),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(vulns.len(), 2);

        let by_submission = repo
            .list_records(RecordFilter {
                submission_id: Some(submission.id),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_submission.len(), 2);
    }

    #[tokio::test]
    async fn test_model_registry_single_active() {
        let repo = test_repo().await;

        let baseline = repo.ensure_baseline_model("baseline-v1").await.unwrap();
        // Idempotent: second call returns the same active version
        let again = repo.ensure_baseline_model("baseline-v1").await.unwrap();
        assert_eq!(baseline.id, again.id);

        let candidate = repo
            .insert_candidate_model("extractor-2", Some("snapshot-2".to_string()))
            .await
            .unwrap();

        let activated = repo.activate_model(candidate.id).await.unwrap();
        assert!(activated.is_active());

        let active = repo.active_model().await.unwrap().unwrap();
        assert_eq!(active.tag, "extractor-2");

        let old = repo.find_model_by_tag("baseline-v1").await.unwrap().unwrap();
        assert_eq!(old.model_status(), Some(ModelStatus::Retired));

        // A retired version cannot be re-activated
        let err = repo.activate_model(old.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_feedback_counting() {
        let repo = test_repo().await;
        let since = Utc::now() - chrono::Duration::hours(1);

        repo.insert_feedback("baseline-v1", Uuid::new_v4(), FeedbackOutcome::Accepted)
            .await
            .unwrap();
        repo.insert_feedback("baseline-v1", Uuid::new_v4(), FeedbackOutcome::Rejected)
            .await
            .unwrap();
        repo.insert_feedback("other-model", Uuid::new_v4(), FeedbackOutcome::Accepted)
            .await
            .unwrap();

        let count = repo.count_feedback_since("baseline-v1", since).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_component_heartbeat_upsert() {
        let repo = test_repo().await;

        repo.upsert_component_status("extraction-worker", true)
            .await
            .unwrap();
        repo.upsert_component_status("extraction-worker", false)
            .await
            .unwrap();

        let components = repo.list_component_status().await.unwrap();
        assert_eq!(components.len(), 1);
        assert!(!components[0].accepting_work);
    }

    #[tokio::test]
    async fn test_delete_submission_cascade() {
        let repo = test_repo().await;

        let submission = repo
            .stage_submission(staged(
                vec![vuln("A"), option("B")],
                vec![StagedLink { vulnerability: 0, option: 1 }],
            ))
            .await
            .unwrap();

        assert!(repo.delete_submission_cascade(submission.id).await.unwrap());
        assert!(repo.find_submission_by_id(submission.id).await.unwrap().is_none());
        assert!(repo.records_by_submission(submission.id).await.unwrap().is_empty());
        assert!(repo.links_by_submission(submission.id).await.unwrap().is_empty());

        // Second delete is a no-op
        assert!(!repo.delete_submission_cascade(submission.id).await.unwrap());
    }
}
