//! SeaORM entity models
//!
//! Database entities for the DocSift staging and production stores,
//! the model-version registry, and component heartbeats.

mod component_status;
mod model_feedback;
mod model_version;
mod production_link;
mod production_record;
mod submission;
mod submission_link;
mod submission_record;

pub use submission::{
    Entity as SubmissionEntity,
    Model as Submission,
    ActiveModel as SubmissionActiveModel,
    Column as SubmissionColumn,
};

pub use submission_record::{
    Entity as SubmissionRecordEntity,
    Model as SubmissionRecord,
    ActiveModel as SubmissionRecordActiveModel,
    Column as SubmissionRecordColumn,
    AuditStatus,
    RecordKind,
};

pub use submission_link::{
    Entity as SubmissionLinkEntity,
    Model as SubmissionLink,
    ActiveModel as SubmissionLinkActiveModel,
    Column as SubmissionLinkColumn,
};

pub use production_record::{
    Entity as ProductionRecordEntity,
    Model as ProductionRecord,
    ActiveModel as ProductionRecordActiveModel,
    Column as ProductionRecordColumn,
};

pub use production_link::{
    Entity as ProductionLinkEntity,
    Model as ProductionLink,
    ActiveModel as ProductionLinkActiveModel,
    Column as ProductionLinkColumn,
};

pub use model_version::{
    Entity as ModelVersionEntity,
    Model as ModelVersion,
    ActiveModel as ModelVersionActiveModel,
    Column as ModelVersionColumn,
    ModelStatus,
};

pub use model_feedback::{
    Entity as ModelFeedbackEntity,
    Model as ModelFeedback,
    ActiveModel as ModelFeedbackActiveModel,
    Column as ModelFeedbackColumn,
    FeedbackOutcome,
};

pub use component_status::{
    Entity as ComponentStatusEntity,
    Model as ComponentStatus,
    ActiveModel as ComponentStatusActiveModel,
    Column as ComponentStatusColumn,
};
