//! Submission record entity - a staged finding awaiting audit

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Finding variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Vulnerability,
    OptionForConsideration,
}

impl RecordKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vulnerability" => Some(RecordKind::Vulnerability),
            "option_for_consideration" => Some(RecordKind::OptionForConsideration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Vulnerability => "vulnerability",
            RecordKind::OptionForConsideration => "option_for_consideration",
        }
    }
}

impl From<RecordKind> for String {
    fn from(kind: RecordKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Reviewer-assigned disposition of a single finding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Accepted,
    Rejected,
    Review,
}

impl AuditStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AuditStatus::Pending),
            "accepted" => Some(AuditStatus::Accepted),
            "rejected" => Some(AuditStatus::Rejected),
            "review" => Some(AuditStatus::Review),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Pending => "pending",
            AuditStatus::Accepted => "accepted",
            AuditStatus::Rejected => "rejected",
            AuditStatus::Review => "review",
        }
    }

    /// Accepted/rejected are terminal; re-opening them is a reset, not a transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditStatus::Accepted | AuditStatus::Rejected)
    }

    /// The normal audit state machine:
    /// pending -> {accepted, rejected, review}; review -> {accepted, rejected}
    pub fn can_transition_to(&self, to: AuditStatus) -> bool {
        match self {
            AuditStatus::Pending => matches!(
                to,
                AuditStatus::Accepted | AuditStatus::Rejected | AuditStatus::Review
            ),
            AuditStatus::Review => matches!(to, AuditStatus::Accepted | AuditStatus::Rejected),
            AuditStatus::Accepted | AuditStatus::Rejected => false,
        }
    }
}

impl From<String> for AuditStatus {
    fn from(s: String) -> Self {
        // Pre-existing rows with no recognizable status read as pending
        AuditStatus::parse(&s).unwrap_or(AuditStatus::Pending)
    }
}

impl From<AuditStatus> for String {
    fn from(status: AuditStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub submission_id: Uuid,

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

    /// First 300 characters of the originating chunk
    #[sea_orm(column_type = "Text", nullable)]
    pub source_excerpt: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub audit_status: String,

    /// Stamped by the Promotion Engine; promotion is a no-op once set
    pub promoted_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn status(&self) -> AuditStatus {
        AuditStatus::from(self.audit_status.clone())
    }

    pub fn record_kind(&self) -> Option<RecordKind> {
        RecordKind::parse(&self.kind)
    }

    pub fn is_promoted(&self) -> bool {
        self.promoted_at.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::submission::Entity",
        from = "Column::SubmissionId",
        to = "super::submission::Column::Id"
    )]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        assert!(AuditStatus::Pending.can_transition_to(AuditStatus::Accepted));
        assert!(AuditStatus::Pending.can_transition_to(AuditStatus::Review));
        assert!(AuditStatus::Review.can_transition_to(AuditStatus::Rejected));
        assert!(!AuditStatus::Review.can_transition_to(AuditStatus::Review));
        assert!(!AuditStatus::Accepted.can_transition_to(AuditStatus::Rejected));
        assert!(!AuditStatus::Rejected.can_transition_to(AuditStatus::Pending));
    }

    #[test]
    fn test_unknown_status_reads_as_pending() {
        assert_eq!(AuditStatus::from(String::new()), AuditStatus::Pending);
        assert_eq!(AuditStatus::from("weird".to_string()), AuditStatus::Pending);
    }

    #[test]
    fn test_kind_roundtrip() {
        let kind = RecordKind::OptionForConsideration;
        assert_eq!(RecordKind::parse(kind.as_str()), Some(kind));
        assert_eq!(RecordKind::parse("neither"), None);
    }
}
