use bytes::Bytes;
use futures::Stream;
use futures::TryStreamExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::models::{CompletedTaskResponse, TaskIdResponse, ThumbnailUrlResponse};
use crate::config::ClientConfig;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Progress channel error: {0}")]
    ChannelError(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// HTTP side of the backend contract.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask the backend to start extracting metadata for `source_url`.
    /// Returns the new task id.
    pub async fn create_task(&self, source_url: &str) -> Result<String> {
        let url = format!("{}/video", self.config.http_base);
        debug!(%source_url, "creating task");

        let response = self
            .http
            .get(&url)
            .query(&[("url", source_url)])
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Task creation failed: {}", e)))?;

        let json: TaskIdResponse = decode(response).await?;
        if json.task_id.is_empty() {
            return Err(ApiError::InvalidResponse("empty task_id".to_string()));
        }
        Ok(json.task_id)
    }

    /// Fetch the current status (and result, once completed) of a task.
    pub async fn fetch_task(&self, task_id: &str) -> Result<CompletedTaskResponse> {
        let url = format!("{}/video/{}", self.config.http_base, task_id);

        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Status request failed: {}", e)))?;

        decode(response).await
    }

    pub async fn fetch_thumbnail(&self, task_id: &str) -> Result<ThumbnailUrlResponse> {
        let url = format!("{}/video/thumbnail/{}", self.config.http_base, task_id);

        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Thumbnail request failed: {}", e)))?;

        decode(response).await
    }

    /// Fetch a backend-relative resource (e.g. a thumbnail image) in one piece.
    pub async fn fetch_bytes(&self, reference: &str) -> Result<Bytes> {
        let url = self.config.resolve(reference);

        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Resource request failed: {}", e)))?;

        Ok(response.bytes().await?)
    }

    /// Stream a finished file.
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<Bytes>>)> {
        let response = self
            .http
            .get(download_url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::ApiError(format!("Download request failed: {}", e)))?;

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))
}
