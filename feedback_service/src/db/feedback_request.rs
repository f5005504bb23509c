use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "feedback_request")]
#[schema(as = FeedbackRequest)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub student_id: String,
    pub assignment_id: String,
    pub submission_id: String,
    #[sea_orm(column_type = "Text")]
    pub submission_content: String,
    #[sea_orm(column_type = "Double", nullable)]
    pub plagiarism_score: Option<f64>,
    /// JSON array of similar sources reported by the plagiarism service.
    #[sea_orm(column_type = "Text", nullable)]
    pub similar_sources: Option<String>,
    pub status: RequestStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub generated_feedback: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub feedback_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub template_used: String,
    pub model_used: String,
    pub processing_attempts: i32,
    /// One JSON encoded attempt error per line, oldest first.
    #[sea_orm(column_type = "Text")]
    pub error_log: String,
    pub is_archived: bool,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
