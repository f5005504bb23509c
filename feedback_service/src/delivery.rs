use crate::upstream::{ServiceError, check_status};
use async_trait::async_trait;
pub use common::models::FeedbackDelivery;
use reqwest::{Client, Url};

/// Receives the results of completed requests, e.g. the LMS that created them.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, delivery: &FeedbackDelivery) -> Result<(), ServiceError>;
}

#[derive(Debug)]
pub struct HttpResultSink {
    client: Client,
    url: Url,
}

impl HttpResultSink {
    pub fn new(client: Client, url: Url) -> Self {
        HttpResultSink { client, url }
    }
}

#[async_trait]
impl ResultSink for HttpResultSink {
    async fn deliver(&self, delivery: &FeedbackDelivery) -> Result<(), ServiceError> {
        let res = self
            .client
            .post(self.url.clone())
            .json(delivery)
            .send()
            .await?;
        check_status(res).await?;
        Ok(())
    }
}
