use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FeedbackRequest::Table)
                    .if_not_exists()
                    .col(pk_auto(FeedbackRequest::Id))
                    .col(string(FeedbackRequest::StudentId))
                    .col(string(FeedbackRequest::AssignmentId))
                    .col(string(FeedbackRequest::SubmissionId))
                    .col(text(FeedbackRequest::SubmissionContent))
                    .col(double_null(FeedbackRequest::PlagiarismScore))
                    .col(text_null(FeedbackRequest::SimilarSources))
                    .col(string(FeedbackRequest::Status).default("pending"))
                    .col(text_null(FeedbackRequest::GeneratedFeedback))
                    .col(text_null(FeedbackRequest::FeedbackSummary))
                    .col(timestamp_with_time_zone(FeedbackRequest::CreatedAt))
                    .col(timestamp_with_time_zone_null(FeedbackRequest::CompletedAt))
                    .col(string(FeedbackRequest::TemplateUsed))
                    .col(string(FeedbackRequest::ModelUsed))
                    .col(integer(FeedbackRequest::ProcessingAttempts).default(0))
                    .col(text(FeedbackRequest::ErrorLog).default(""))
                    .col(boolean(FeedbackRequest::IsArchived).default(false))
                    .col(timestamp_with_time_zone_null(
                        FeedbackRequest::LastAttemptAt,
                    ))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_feedback_request_status")
                    .table(FeedbackRequest::Table)
                    .col(FeedbackRequest::Status)
                    .col(FeedbackRequest::IsArchived)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_feedback_request_submission")
                    .table(FeedbackRequest::Table)
                    .col(FeedbackRequest::SubmissionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FeedbackRequest::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum FeedbackRequest {
    Table,
    Id,
    StudentId,
    AssignmentId,
    SubmissionId,
    SubmissionContent,
    PlagiarismScore,
    SimilarSources,
    Status,
    GeneratedFeedback,
    FeedbackSummary,
    CreatedAt,
    CompletedAt,
    TemplateUsed,
    ModelUsed,
    ProcessingAttempts,
    ErrorLog,
    IsArchived,
    LastAttemptAt,
}
