use crate::attempt_log::{self, AttemptError};
use crate::db::feedback_request::{Model, RequestStatus};
use crate::store::RequestFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct NewSubmission {
    pub student_id: String,
    pub assignment_id: String,
    pub submission_id: String,
    pub content: String,
    pub template: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RequestStatusView {
    pub request_id: i32,
    pub submission_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_attempts: i32,
    pub has_feedback: bool,
    pub has_error: bool,
    pub last_error: Option<AttemptError>,
    pub is_archived: bool,
}

impl From<&Model> for RequestStatusView {
    fn from(model: &Model) -> Self {
        RequestStatusView {
            request_id: model.id,
            submission_id: model.submission_id.clone(),
            status: model.status,
            created_at: model.created_at,
            completed_at: model.completed_at,
            processing_attempts: model.processing_attempts,
            has_feedback: model.generated_feedback.is_some(),
            has_error: !model.error_log.is_empty(),
            last_error: attempt_log::entries(&model.error_log).pop(),
            is_archived: model.is_archived,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    pub status: Option<RequestStatus>,
    pub student_id: Option<String>,
    pub assignment_id: Option<String>,
    pub submission_id: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
    /// Maximum number of records to return, oldest first.
    pub limit: Option<u64>,
}

impl From<ListQuery> for RequestFilter {
    fn from(query: ListQuery) -> Self {
        RequestFilter {
            status: query.status,
            student_id: query.student_id,
            assignment_id: query.assignment_id,
            submission_id: query.submission_id,
            include_archived: query.include_archived,
            limit: query.limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}
