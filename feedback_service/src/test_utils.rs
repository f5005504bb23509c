use crate::delivery::{FeedbackDelivery, ResultSink};
use crate::generator::{FeedbackGenerator, GenerationContext};
use crate::manager::{LifecycleManager, RetryPolicy};
use crate::model::NewSubmission;
use crate::plagiarism::PlagiarismScorer;
use crate::store::FeedbackStore;
use crate::upstream::ServiceError;
use async_trait::async_trait;
use common::models::{GeneratedFeedback, PlagiarismResult};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub async fn setup_store() -> FeedbackStore {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1);
    let db = Database::connect(opt)
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    FeedbackStore::new(db)
}

pub fn manager_with(
    store: FeedbackStore,
    plagiarism: impl PlagiarismScorer + 'static,
    generator: impl FeedbackGenerator + 'static,
) -> LifecycleManager {
    LifecycleManager::new(
        store,
        Arc::new(plagiarism),
        Arc::new(generator),
        None,
        RetryPolicy::default(),
    )
}

pub fn submission(content: &str) -> NewSubmission {
    NewSubmission {
        student_id: "student-1".to_string(),
        assignment_id: "assignment-1".to_string(),
        submission_id: "sub-1".to_string(),
        content: content.to_string(),
        template: "essay-v1".to_string(),
        model: "gpt-4o".to_string(),
    }
}

pub struct MockPlagiarism {
    result: Result<PlagiarismResult, String>,
    delay: Duration,
}

impl MockPlagiarism {
    pub fn returning(score: f64) -> Self {
        MockPlagiarism {
            result: Ok(PlagiarismResult {
                score,
                sources: vec![],
            }),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(message: &str) -> Self {
        MockPlagiarism {
            result: Err(message.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PlagiarismScorer for MockPlagiarism {
    async fn score(&self, _text: &str) -> Result<PlagiarismResult, ServiceError> {
        tokio::time::sleep(self.delay).await;
        self.result.clone().map_err(ServiceError::InvalidResponse)
    }
}

pub struct MockGenerator {
    feedback: GeneratedFeedback,
    error: Option<String>,
    fail_once: AtomicBool,
    hang: bool,
}

impl MockGenerator {
    pub fn returning(feedback: &str, summary: &str) -> Self {
        MockGenerator {
            feedback: GeneratedFeedback {
                feedback: feedback.to_string(),
                summary: summary.to_string(),
            },
            error: None,
            fail_once: AtomicBool::new(false),
            hang: false,
        }
    }

    pub fn failing(message: &str) -> Self {
        MockGenerator {
            error: Some(message.to_string()),
            ..Self::returning("", "")
        }
    }

    /// Fails the first call, then succeeds.
    pub fn failing_once(feedback: &str, summary: &str) -> Self {
        MockGenerator {
            fail_once: AtomicBool::new(true),
            ..Self::returning(feedback, summary)
        }
    }

    pub fn hanging() -> Self {
        MockGenerator {
            hang: true,
            ..Self::returning("", "")
        }
    }
}

#[async_trait]
impl FeedbackGenerator for MockGenerator {
    async fn generate(
        &self,
        _text: &str,
        _plagiarism: &PlagiarismResult,
        _context: GenerationContext,
    ) -> Result<GeneratedFeedback, ServiceError> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.fail_once.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::InvalidResponse("transient failure".to_string()));
        }
        match &self.error {
            Some(message) => Err(ServiceError::InvalidResponse(message.clone())),
            None => Ok(self.feedback.clone()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<FeedbackDelivery>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<FeedbackDelivery> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for RecordingSink {
    async fn deliver(&self, delivery: &FeedbackDelivery) -> Result<(), ServiceError> {
        self.delivered.lock().unwrap().push(delivery.clone());
        Ok(())
    }
}
