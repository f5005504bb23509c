//! Lifecycle of a feedback request.
//!
//! A request is submitted as `Pending`, claimed into `Processing` by exactly one worker, and left
//! in `Completed` or `Failed` when the attempt ends. `Failed` requests may be claimed again until
//! `max_attempts` is reached. Every transition is a conditional update on status and attempt
//! number, so concurrent workers never process the same request twice and a late result from a
//! superseded attempt is never written.

use crate::attempt_log::{self, AttemptError, Stage};
use crate::db::feedback_request::{ActiveModel, Model, RequestStatus};
use crate::delivery::{FeedbackDelivery, ResultSink};
use crate::generator::{FeedbackGenerator, GenerationContext};
use crate::model::{NewSubmission, RequestStatusView};
use crate::plagiarism::PlagiarismScorer;
use crate::store::{Expected, FeedbackStore, NewRequest, RequestFilter};
use crate::upstream::ServiceError;
use chrono::{DateTime, Utc};
use common::models::{GeneratedFeedback, PlagiarismResult};
use log::{debug, error, info, warn};
use sea_orm::{DbErr, Set};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("feedback request {0} not found")]
    NotFound(i32),
    #[error("cannot {operation} feedback request {id} while it is {status:?}")]
    InvalidState {
        id: i32,
        status: RequestStatus,
        operation: &'static str,
    },
    #[error("feedback request {id} exhausted its {attempts} attempts")]
    RetryExhausted { id: i32, attempts: i32 },
    #[error("{stage} service failed: {detail}")]
    ExternalService { stage: Stage, detail: String },
    #[error("failed to encode request fields: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("document store error: {0}")]
    Store(#[from] DbErr),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub service_timeout: Duration,
    /// Whether failed requests below the ceiling count as pending work.
    pub auto_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            service_timeout: Duration::from_secs(120),
            auto_retry: true,
        }
    }
}

#[derive(Clone)]
pub struct LifecycleManager {
    store: FeedbackStore,
    plagiarism: Arc<dyn PlagiarismScorer>,
    generator: Arc<dyn FeedbackGenerator>,
    sink: Option<Arc<dyn ResultSink>>,
    policy: RetryPolicy,
}

impl LifecycleManager {
    pub fn new(
        store: FeedbackStore,
        plagiarism: Arc<dyn PlagiarismScorer>,
        generator: Arc<dyn FeedbackGenerator>,
        sink: Option<Arc<dyn ResultSink>>,
        policy: RetryPolicy,
    ) -> Self {
        LifecycleManager {
            store,
            plagiarism,
            generator,
            sink,
            policy,
        }
    }

    pub async fn submit(&self, submission: NewSubmission) -> Result<Model, LifecycleError> {
        let fields = [
            ("student_id", &submission.student_id),
            ("assignment_id", &submission.assignment_id),
            ("submission_id", &submission.submission_id),
            ("template", &submission.template),
            ("model", &submission.model),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(LifecycleError::InvalidInput(format!("{name} is required")));
        }
        if submission.content.trim().is_empty() {
            return Err(LifecycleError::InvalidInput(
                "content must not be empty".to_string(),
            ));
        }

        let request = self
            .store
            .create(
                NewRequest {
                    student_id: submission.student_id,
                    assignment_id: submission.assignment_id,
                    submission_id: submission.submission_id,
                    submission_content: submission.content,
                    template_used: submission.template,
                    model_used: submission.model,
                },
                Utc::now(),
            )
            .await?;
        info!(
            "created feedback request {} for submission {}",
            request.id, request.submission_id
        );
        Ok(request)
    }

    pub async fn get(&self, id: i32) -> Result<Model, LifecycleError> {
        self.store
            .read(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    pub async fn status(&self, id: i32) -> Result<RequestStatusView, LifecycleError> {
        Ok(RequestStatusView::from(&self.get(id).await?))
    }

    pub async fn list(&self, filter: &RequestFilter) -> Result<Vec<Model>, LifecycleError> {
        Ok(self.store.query(filter).await?)
    }

    /// Runs one attempt. Failures of the external services are recorded on the request and do
    /// not surface as errors; the returned record carries the outcome.
    pub async fn process(&self, id: i32) -> Result<Model, LifecycleError> {
        let request = self.get(id).await?;
        self.attempt(request, "process").await
    }

    pub async fn retry(&self, id: i32) -> Result<Model, LifecycleError> {
        let request = self.get(id).await?;
        if request.status != RequestStatus::Failed {
            return Err(LifecycleError::InvalidState {
                id,
                status: request.status,
                operation: "retry",
            });
        }
        // Only exhausted requests can be archived while Failed.
        if request.processing_attempts >= self.policy.max_attempts || request.is_archived {
            return Err(LifecycleError::RetryExhausted {
                id,
                attempts: request.processing_attempts,
            });
        }
        self.attempt(request, "retry").await
    }

    pub async fn archive(&self, id: i32) -> Result<Model, LifecycleError> {
        let request = self.get(id).await?;
        if request.is_archived {
            return Ok(request);
        }
        let terminal = match request.status {
            RequestStatus::Completed => true,
            RequestStatus::Failed => request.processing_attempts >= self.policy.max_attempts,
            RequestStatus::Pending | RequestStatus::Processing => false,
        };
        if !terminal {
            return Err(LifecycleError::InvalidState {
                id,
                status: request.status,
                operation: "archive",
            });
        }

        let archived = self
            .store
            .update(
                id,
                Expected::of(&request),
                ActiveModel {
                    is_archived: Set(true),
                    ..Default::default()
                },
            )
            .await?;
        let current = self.get(id).await?;
        if !archived && !current.is_archived {
            return Err(LifecycleError::InvalidState {
                id,
                status: current.status,
                operation: "archive",
            });
        }
        info!("archived feedback request {id}");
        Ok(current)
    }

    /// Requests ready to be claimed, oldest first.
    pub async fn pending_work(&self, limit: u64) -> Result<Vec<Model>, LifecycleError> {
        let mut work = self
            .store
            .query(&RequestFilter {
                status: Some(RequestStatus::Pending),
                limit: Some(limit),
                ..Default::default()
            })
            .await?;

        let remaining = limit.saturating_sub(work.len() as u64);
        if self.policy.auto_retry && remaining > 0 {
            work.extend(
                self.store
                    .query(&RequestFilter {
                        status: Some(RequestStatus::Failed),
                        attempts_below: Some(self.policy.max_attempts),
                        limit: Some(remaining),
                        ..Default::default()
                    })
                    .await?,
            );
        }
        Ok(work)
    }

    pub async fn archive_completed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, LifecycleError> {
        let archived = self.store.archive_completed_before(cutoff).await?;
        if archived > 0 {
            info!("archived {archived} completed feedback requests created before {cutoff}");
        }
        Ok(archived)
    }

    /// Fails attempts that have been `Processing` for longer than `older_than`.
    pub async fn reclaim_stalled(&self, older_than: Duration) -> Result<u64, LifecycleError> {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let stalled = self
            .store
            .query(&RequestFilter {
                status: Some(RequestStatus::Processing),
                attempted_before: Some(cutoff),
                ..Default::default()
            })
            .await?;

        let mut reclaimed = 0;
        for request in stalled {
            let entry = AttemptError {
                at: Utc::now(),
                attempt: request.processing_attempts,
                stage: Stage::Stalled,
                detail: format!("no outcome recorded within {older_than:?}"),
            };
            let changes = ActiveModel {
                status: Set(RequestStatus::Failed),
                error_log: Set(attempt_log::append(&request.error_log, &entry)?),
                ..Default::default()
            };
            if self
                .store
                .update(request.id, Expected::of(&request), changes)
                .await?
            {
                warn!(
                    "reclaimed stalled feedback request {}, attempt {}",
                    request.id, request.processing_attempts
                );
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    async fn attempt(
        &self,
        request: Model,
        operation: &'static str,
    ) -> Result<Model, LifecycleError> {
        let attempt = self.claim(&request, operation).await?;
        info!(
            "processing feedback request {}, attempt {attempt}",
            request.id
        );

        let outcome = self.run_attempt(&request).await;
        self.finish(request, attempt, outcome).await
    }

    /// Moves `request` into `Processing`, returning the number of the new attempt.
    async fn claim(&self, request: &Model, operation: &'static str) -> Result<i32, LifecycleError> {
        let claimable = !request.is_archived
            && match request.status {
                RequestStatus::Pending => true,
                RequestStatus::Failed => request.processing_attempts < self.policy.max_attempts,
                RequestStatus::Processing | RequestStatus::Completed => false,
            };
        if !claimable {
            return Err(LifecycleError::InvalidState {
                id: request.id,
                status: request.status,
                operation,
            });
        }

        let attempt = request.processing_attempts + 1;
        let claimed = self
            .store
            .update(
                request.id,
                Expected::of(request),
                ActiveModel {
                    status: Set(RequestStatus::Processing),
                    processing_attempts: Set(attempt),
                    last_attempt_at: Set(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await?;
        if !claimed {
            let current = self.get(request.id).await?;
            debug!(
                "lost claim on feedback request {}, now {:?}",
                request.id, current.status
            );
            return Err(LifecycleError::InvalidState {
                id: request.id,
                status: current.status,
                operation,
            });
        }
        Ok(attempt)
    }

    async fn run_attempt(
        &self,
        request: &Model,
    ) -> Result<(PlagiarismResult, GeneratedFeedback), LifecycleError> {
        let plagiarism = self
            .call(
                Stage::Plagiarism,
                self.plagiarism.score(&request.submission_content),
            )
            .await?;
        if !plagiarism.is_valid_score() {
            return Err(LifecycleError::ExternalService {
                stage: Stage::Plagiarism,
                detail: format!("score {} is outside [0, 1]", plagiarism.score),
            });
        }

        let context = GenerationContext {
            template: request.template_used.clone(),
            model: request.model_used.clone(),
        };
        let generated = self
            .call(
                Stage::Generation,
                self.generator
                    .generate(&request.submission_content, &plagiarism, context),
            )
            .await?;
        Ok((plagiarism, generated))
    }

    async fn call<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, LifecycleError> {
        let timeout = self.policy.service_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .unwrap_or(Err(ServiceError::Timeout(timeout)))
            .map_err(|err| LifecycleError::ExternalService {
                stage,
                detail: err.to_string(),
            })
    }

    async fn finish(
        &self,
        request: Model,
        attempt: i32,
        outcome: Result<(PlagiarismResult, GeneratedFeedback), LifecycleError>,
    ) -> Result<Model, LifecycleError> {
        let expected = Expected {
            status: RequestStatus::Processing,
            processing_attempts: attempt,
        };
        let id = request.id;

        let (changes, completed) = match outcome {
            Ok((plagiarism, generated)) => (
                ActiveModel {
                    status: Set(RequestStatus::Completed),
                    completed_at: Set(Some(Utc::now())),
                    plagiarism_score: Set(Some(plagiarism.score)),
                    similar_sources: Set(Some(serde_json::to_string(&plagiarism.sources)?)),
                    generated_feedback: Set(Some(generated.feedback)),
                    feedback_summary: Set(Some(generated.summary)),
                    ..Default::default()
                },
                Some(plagiarism),
            ),
            Err(LifecycleError::ExternalService { stage, detail }) => {
                warn!("attempt {attempt} of feedback request {id} failed at {stage}: {detail}");
                let entry = AttemptError {
                    at: Utc::now(),
                    attempt,
                    stage,
                    detail,
                };
                (
                    ActiveModel {
                        status: Set(RequestStatus::Failed),
                        error_log: Set(attempt_log::append(&request.error_log, &entry)?),
                        ..Default::default()
                    },
                    None,
                )
            }
            Err(err) => return Err(err),
        };

        if !self.store.update(id, expected, changes).await? {
            warn!("discarding result of superseded attempt {attempt} of feedback request {id}");
        }
        let current = self.get(id).await?;

        if let Some(plagiarism) = completed {
            if current.status == RequestStatus::Completed
                && current.processing_attempts == attempt
            {
                info!("completed feedback request {id} on attempt {attempt}");
                self.deliver(&current, plagiarism).await;
            }
        }
        Ok(current)
    }

    async fn deliver(&self, request: &Model, plagiarism: PlagiarismResult) {
        let Some(sink) = &self.sink else {
            return;
        };
        let delivery = FeedbackDelivery {
            request_id: request.id,
            submission_id: request.submission_id.clone(),
            student_id: request.student_id.clone(),
            assignment_id: request.assignment_id.clone(),
            feedback: request.generated_feedback.clone().unwrap_or_default(),
            summary: request.feedback_summary.clone().unwrap_or_default(),
            generated_at: request.completed_at.unwrap_or_else(Utc::now),
            plagiarism_score: plagiarism.score,
            similar_sources: plagiarism.sources,
            sent_at: Utc::now(),
            service: env!("CARGO_PKG_NAME").to_string(),
        };
        let timeout = self.policy.service_timeout;
        match tokio::time::timeout(timeout, sink.deliver(&delivery)).await {
            Ok(Ok(())) => debug!("delivered feedback request {}", request.id),
            Ok(Err(err)) => error!("failed to deliver feedback request {}: {err}", request.id),
            Err(_) => error!(
                "delivery of feedback request {} timed out after {timeout:?}",
                request.id
            ),
        }
    }
}
