use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected code {0}: {1}")]
    Upstream(StatusCode, String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("failed to render prompt: {0}")]
    Prompt(#[from] askama::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns a 4xx or 5xx response into `ServiceError::Upstream`, keeping the body for the log.
pub async fn check_status(res: Response) -> Result<Response, ServiceError> {
    let status = res.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(ServiceError::Upstream(status, res.text().await?));
    }
    Ok(res)
}

pub async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ServiceError> {
    Ok(check_status(res).await?.json().await?)
}
