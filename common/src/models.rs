use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, PartialOrd)]
pub struct SimilarSource {
    pub source_id: String,
    pub similarity: f64,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, PartialOrd)]
pub struct PlagiarismResult {
    pub score: f64,
    #[serde(default)]
    pub sources: Vec<SimilarSource>,
}

impl PlagiarismResult {
    pub fn is_valid_score(&self) -> bool {
        (0.0..=1.0).contains(&self.score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GeneratedFeedback {
    pub feedback: String,
    pub summary: String,
}

/// Message published to the LMS once a request has completed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct FeedbackDelivery {
    pub request_id: i32,
    pub submission_id: String,
    pub student_id: String,
    pub assignment_id: String,
    pub feedback: String,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
    pub plagiarism_score: f64,
    pub similar_sources: Vec<SimilarSource>,
    pub sent_at: DateTime<Utc>,
    pub service: String,
}
