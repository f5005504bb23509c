use crate::db::feedback_request::{ActiveModel, Column, Model, RequestStatus};
use crate::db::prelude::FeedbackRequest;
use chrono::{DateTime, Utc};
use log::debug;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

/// The state a conditional update expects to find the record in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub status: RequestStatus,
    pub processing_attempts: i32,
}

impl Expected {
    pub fn of(model: &Model) -> Self {
        Expected {
            status: model.status,
            processing_attempts: model.processing_attempts,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub student_id: Option<String>,
    pub assignment_id: Option<String>,
    pub submission_id: Option<String>,
    pub include_archived: bool,
    pub attempts_below: Option<i32>,
    pub attempted_before: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub student_id: String,
    pub assignment_id: String,
    pub submission_id: String,
    pub submission_content: String,
    pub template_used: String,
    pub model_used: String,
}

#[derive(Debug, Clone)]
pub struct FeedbackStore {
    db: DatabaseConnection,
}

impl FeedbackStore {
    pub fn new(db: DatabaseConnection) -> Self {
        FeedbackStore { db }
    }

    pub async fn create(&self, request: NewRequest, now: DateTime<Utc>) -> Result<Model, DbErr> {
        ActiveModel {
            id: NotSet,
            student_id: Set(request.student_id),
            assignment_id: Set(request.assignment_id),
            submission_id: Set(request.submission_id),
            submission_content: Set(request.submission_content),
            plagiarism_score: Set(None),
            similar_sources: Set(None),
            status: Set(RequestStatus::Pending),
            generated_feedback: Set(None),
            feedback_summary: Set(None),
            created_at: Set(now),
            completed_at: Set(None),
            template_used: Set(request.template_used),
            model_used: Set(request.model_used),
            processing_attempts: Set(0),
            error_log: Set(String::new()),
            is_archived: Set(false),
            last_attempt_at: Set(None),
        }
        .insert(&self.db)
        .await
    }

    pub async fn read(&self, id: i32) -> Result<Option<Model>, DbErr> {
        FeedbackRequest::find_by_id(id).one(&self.db).await
    }

    /// Applies `changes` in a single statement, but only if the record is unarchived and still in
    /// the `expected` status and attempt. Returns whether the record was updated.
    pub async fn update(
        &self,
        id: i32,
        expected: Expected,
        changes: ActiveModel,
    ) -> Result<bool, DbErr> {
        let result = FeedbackRequest::update_many()
            .set(changes)
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(expected.status))
            .filter(Column::ProcessingAttempts.eq(expected.processing_attempts))
            .filter(Column::IsArchived.eq(false))
            .exec(&self.db)
            .await?;
        debug!(
            "conditional update of request {id} from {:?}/{} matched {} rows",
            expected.status, expected.processing_attempts, result.rows_affected
        );
        Ok(result.rows_affected == 1)
    }

    pub async fn query(&self, filter: &RequestFilter) -> Result<Vec<Model>, DbErr> {
        let mut select = FeedbackRequest::find();
        if let Some(status) = filter.status {
            select = select.filter(Column::Status.eq(status));
        }
        if let Some(student_id) = &filter.student_id {
            select = select.filter(Column::StudentId.eq(student_id.as_str()));
        }
        if let Some(assignment_id) = &filter.assignment_id {
            select = select.filter(Column::AssignmentId.eq(assignment_id.as_str()));
        }
        if let Some(submission_id) = &filter.submission_id {
            select = select.filter(Column::SubmissionId.eq(submission_id.as_str()));
        }
        if !filter.include_archived {
            select = select.filter(Column::IsArchived.eq(false));
        }
        if let Some(attempts) = filter.attempts_below {
            select = select.filter(Column::ProcessingAttempts.lt(attempts));
        }
        if let Some(cutoff) = filter.attempted_before {
            select = select.filter(Column::LastAttemptAt.lt(cutoff));
        }
        if let Some(limit) = filter.limit {
            select = select.limit(limit);
        }
        select
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
    }

    pub async fn archive_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
        let result = FeedbackRequest::update_many()
            .set(ActiveModel {
                is_archived: Set(true),
                ..Default::default()
            })
            .filter(Column::Status.eq(RequestStatus::Completed))
            .filter(Column::IsArchived.eq(false))
            .filter(Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
