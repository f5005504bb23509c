use crate::upstream::{ServiceError, read_json};
use async_trait::async_trait;
pub use common::models::PlagiarismResult;
use reqwest::{Client, Url};
use serde::Serialize;

#[async_trait]
pub trait PlagiarismScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<PlagiarismResult, ServiceError>;
}

#[derive(Debug)]
pub struct HttpPlagiarismScorer {
    client: Client,
    score_url: Url,
}

impl HttpPlagiarismScorer {
    pub fn new(client: Client, score_url: Url) -> Self {
        HttpPlagiarismScorer { client, score_url }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
}

#[async_trait]
impl PlagiarismScorer for HttpPlagiarismScorer {
    async fn score(&self, text: &str) -> Result<PlagiarismResult, ServiceError> {
        let res = self
            .client
            .post(self.score_url.clone())
            .json(&ScoreRequest { text })
            .send()
            .await?;
        read_json(res).await
    }
}
