//! Audit gateway
//!
//! The control surface through which reviewers disposition staged findings.
//! Every mutation goes policy check -> transition check -> single-record
//! update, so a rejected call leaves state untouched. Terminal decisions
//! also stream to the model lifecycle as feedback rows.

use crate::db::models::{AuditStatus, FeedbackOutcome, SubmissionRecord};
use crate::db::{RecordFilter, Repository};
use crate::errors::{AppError, Result};
use crate::policy::{self, AuditAction, UserRole};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

/// Result of a cleanup pass over rejected submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub eligible: usize,
    pub deleted: usize,
    pub dry_run: bool,
}

/// Audit gateway over the staging store
#[derive(Clone)]
pub struct AuditGateway {
    repository: Repository,
}

impl AuditGateway {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Set a record's audit status on behalf of a reviewer.
    ///
    /// pending -> {accepted, rejected, review}; review -> {accepted,
    /// rejected}. Accepting requires a senior role; re-opening a terminal
    /// record goes through `reset_status` instead.
    #[instrument(skip(self), fields(record_id = %record_id, status = new_status.as_str(), role = %role))]
    pub async fn set_audit_status(
        &self,
        record_id: Uuid,
        new_status: AuditStatus,
        role: UserRole,
    ) -> Result<SubmissionRecord> {
        let action = match new_status {
            AuditStatus::Accepted => AuditAction::Accept,
            AuditStatus::Rejected => AuditAction::Reject,
            AuditStatus::Review => AuditAction::Review,
            AuditStatus::Pending => {
                return Err(AppError::Validation {
                    message: "Records cannot be set back to pending; use reset".to_string(),
                    field: Some("status".to_string()),
                });
            }
        };
        policy::require(role, action)?;

        let record = self
            .repository
            .find_record_by_id(record_id)
            .await?
            .ok_or_else(|| AppError::RecordNotFound {
                id: record_id.to_string(),
            })?;

        let current = record.status();
        if !current.can_transition_to(new_status) {
            return Err(AppError::InvalidTransition {
                from: current.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let updated = self
            .repository
            .update_record_status(record_id, new_status)
            .await?;

        if new_status.is_terminal() {
            self.record_feedback(&updated, new_status).await?;
        }

        info!(
            record_id = %record_id,
            from = current.as_str(),
            to = new_status.as_str(),
            "Audit status updated"
        );

        Ok(updated)
    }

    /// Re-open a terminal record back to pending. This is the explicit
    /// reset operation, not a normal transition.
    #[instrument(skip(self), fields(record_id = %record_id, role = %role))]
    pub async fn reset_status(
        &self,
        record_id: Uuid,
        role: UserRole,
    ) -> Result<SubmissionRecord> {
        policy::require(role, AuditAction::Reset)?;

        let record = self
            .repository
            .find_record_by_id(record_id)
            .await?
            .ok_or_else(|| AppError::RecordNotFound {
                id: record_id.to_string(),
            })?;

        if !record.status().is_terminal() {
            return Err(AppError::InvalidTransition {
                from: record.audit_status.clone(),
                to: AuditStatus::Pending.as_str().to_string(),
            });
        }

        self.repository
            .update_record_status(record_id, AuditStatus::Pending)
            .await
    }

    /// List staged records with filtering and stable ordering
    pub async fn list(&self, filter: RecordFilter) -> Result<Vec<SubmissionRecord>> {
        self.repository.list_records(filter).await
    }

    /// Delete fully-rejected submissions older than the age threshold.
    ///
    /// A submission qualifies only when it has records and every one of them
    /// is rejected. With `dry_run` the report carries the eligible count and
    /// nothing is deleted.
    #[instrument(skip(self), fields(older_than_days = older_than_days, dry_run = dry_run, role = %role))]
    pub async fn cleanup_rejected_submissions(
        &self,
        older_than_days: i64,
        dry_run: bool,
        role: UserRole,
    ) -> Result<CleanupReport> {
        policy::require(role, AuditAction::Cleanup)?;

        let cutoff = Utc::now() - Duration::days(older_than_days);
        let candidates = self.repository.submissions_created_before(cutoff).await?;

        let mut eligible = Vec::new();
        for submission in candidates {
            let records = self.repository.records_by_submission(submission.id).await?;
            if !records.is_empty()
                && records.iter().all(|r| r.status() == AuditStatus::Rejected)
            {
                eligible.push(submission.id);
            }
        }

        let mut deleted = 0;
        if !dry_run {
            for id in &eligible {
                if self.repository.delete_submission_cascade(*id).await? {
                    deleted += 1;
                }
            }
        }

        info!(
            eligible = eligible.len(),
            deleted = deleted,
            dry_run = dry_run,
            "Rejected-submission cleanup finished"
        );

        Ok(CleanupReport {
            eligible: eligible.len(),
            deleted,
            dry_run,
        })
    }

    async fn record_feedback(
        &self,
        record: &SubmissionRecord,
        status: AuditStatus,
    ) -> Result<()> {
        let outcome = match status {
            AuditStatus::Accepted => FeedbackOutcome::Accepted,
            AuditStatus::Rejected => FeedbackOutcome::Rejected,
            _ => return Ok(()),
        };

        let submission = self
            .repository
            .find_submission_by_id(record.submission_id)
            .await?
            .ok_or_else(|| AppError::SubmissionNotFound {
                id: record.submission_id.to_string(),
            })?;

        self.repository
            .insert_feedback(&submission.model_tag, record.id, outcome)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::RecordKind;
    use crate::db::schema::create_schema;
    use crate::db::{DbPool, StagedRecord, StagedSubmission};
    use sea_orm::Database;

    async fn gateway_with_records(count: usize) -> (AuditGateway, Repository, Vec<Uuid>) {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        create_schema(&conn).await.unwrap();
        let repo = Repository::new(DbPool::from_connection(conn));

        let records = (0..count)
            .map(|i| StagedRecord {
                kind: RecordKind::Vulnerability,
                title: format!("Finding {}", i),
                body: "observed during walkthrough".to_string(),
                source_file: Some("survey.pdf".to_string()),
                source_page: Some(1 + i as i32),
                source_excerpt: Some("excerpt".to_string()),
            })
            .collect();

        let submission = repo
            .stage_submission(StagedSubmission {
                source_file: "survey.pdf".to_string(),
                content_hash: None,
                model_tag: "baseline-v1".to_string(),
                records,
                links: vec![],
            })
            .await
            .unwrap();

        let ids = repo
            .records_by_submission(submission.id)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();

        (AuditGateway::new(repo.clone()), repo, ids)
    }

    #[tokio::test]
    async fn test_psa_cannot_accept_and_state_is_unchanged() {
        let (gateway, repo, ids) = gateway_with_records(1).await;

        let err = gateway
            .set_audit_status(ids[0], AuditStatus::Accepted, UserRole::Psa)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied { .. }));

        let record = repo.find_record_by_id(ids[0]).await.unwrap().unwrap();
        assert_eq!(record.status(), AuditStatus::Pending);
    }

    #[tokio::test]
    async fn test_senior_roles_accept_and_feedback_flows() {
        let (gateway, repo, ids) = gateway_with_records(2).await;

        gateway
            .set_audit_status(ids[0], AuditStatus::Accepted, UserRole::Spsa)
            .await
            .unwrap();
        gateway
            .set_audit_status(ids[1], AuditStatus::Rejected, UserRole::Admin)
            .await
            .unwrap();

        let since = Utc::now() - Duration::hours(1);
        let count = repo.count_feedback_since("baseline-v1", since).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_psa_may_reject_and_flag_for_review() {
        let (gateway, _repo, ids) = gateway_with_records(2).await;

        let flagged = gateway
            .set_audit_status(ids[0], AuditStatus::Review, UserRole::Psa)
            .await
            .unwrap();
        assert_eq!(flagged.status(), AuditStatus::Review);

        let rejected = gateway
            .set_audit_status(ids[1], AuditStatus::Rejected, UserRole::Psa)
            .await
            .unwrap();
        assert_eq!(rejected.status(), AuditStatus::Rejected);
    }

    #[tokio::test]
    async fn test_terminal_status_requires_reset() {
        let (gateway, _repo, ids) = gateway_with_records(1).await;

        gateway
            .set_audit_status(ids[0], AuditStatus::Rejected, UserRole::Spsa)
            .await
            .unwrap();

        // A terminal record does not transition normally
        let err = gateway
            .set_audit_status(ids[0], AuditStatus::Accepted, UserRole::Spsa)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        // Reset is the explicit re-open, senior-only
        let err = gateway.reset_status(ids[0], UserRole::Psa).await.unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied { .. }));

        let reopened = gateway.reset_status(ids[0], UserRole::Admin).await.unwrap();
        assert_eq!(reopened.status(), AuditStatus::Pending);
    }

    #[tokio::test]
    async fn test_cleanup_rejected_submissions() {
        let (gateway, repo, ids) = gateway_with_records(2).await;

        for id in &ids {
            gateway
                .set_audit_status(*id, AuditStatus::Rejected, UserRole::Psa)
                .await
                .unwrap();
        }

        // Too young for a 30-day threshold
        let report = gateway
            .cleanup_rejected_submissions(30, false, UserRole::Admin)
            .await
            .unwrap();
        assert_eq!(report.eligible, 0);

        // Age threshold of zero days catches it; dry run deletes nothing
        let report = gateway
            .cleanup_rejected_submissions(0, true, UserRole::Admin)
            .await
            .unwrap();
        assert_eq!(report.eligible, 1);
        assert_eq!(report.deleted, 0);

        let report = gateway
            .cleanup_rejected_submissions(0, false, UserRole::Spsa)
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);

        let remaining = repo.list_records(Default::default()).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_requires_senior_role() {
        let (gateway, _repo, _ids) = gateway_with_records(1).await;

        let err = gateway
            .cleanup_rejected_submissions(0, true, UserRole::Psa)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied { .. }));
    }
}
