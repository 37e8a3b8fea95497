//! HTTP transport for the generation backend.

use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use tphoto_models::{GenerateRequest, GenerateResponse, JobId, StatusResponse};

use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};

/// Remote job service producing lip-sync videos.
#[async_trait]
pub trait LipSyncBackend: Send + Sync {
    /// Submit a generation job. Exactly one request is sent.
    async fn submit(&self, request: &GenerateRequest) -> BackendResult<JobId>;

    /// Fetch the current status of a job.
    async fn status(&self, job_id: &JobId) -> BackendResult<StatusResponse>;

    /// Stream the asset at `url` into `dest`, returning the bytes written.
    ///
    /// On failure nothing is left at `dest`.
    async fn download(&self, url: &str, dest: &Path) -> BackendResult<u64>;
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// reqwest-based backend client.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| BackendError::Config(format!("invalid base URL {}: {}", config.base_url, e)))?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> BackendResult<Self> {
        Self::new(BackendConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the backend answers `GET health` with an ok status.
    pub async fn health_check(&self) -> BackendResult<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let health: HealthResponse = response.json().await?;
        Ok(matches!(health.status.as_str(), "ok" | "healthy"))
    }

    async fn error_from_response(response: reqwest::Response) -> BackendError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        BackendError::from_http_status(status, body)
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> BackendResult<u64> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let expected = response.content_length();

        let mut file = File::create(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        if let Some(expected) = expected {
            if expected != written {
                return Err(BackendError::invalid_response(format!(
                    "truncated download: expected {} bytes, got {}",
                    expected, written
                )));
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl LipSyncBackend for HttpBackend {
    async fn submit(&self, request: &GenerateRequest) -> BackendResult<JobId> {
        let url = format!("{}/generate", self.base_url);
        debug!(poster_id = %request.poster_id, voice_id = %request.voice_id, "Submitting generation job");

        let response = self.client.post(&url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::invalid_response(format!("bad generate response: {}", e)))?;
        if body.video_id.as_str().is_empty() {
            return Err(BackendError::invalid_response("empty videoId"));
        }

        info!(poster_id = %request.poster_id, video_id = %body.video_id, "Generation job accepted");
        Ok(body.video_id)
    }

    async fn status(&self, job_id: &JobId) -> BackendResult<StatusResponse> {
        let url = format!(
            "{}/status/{}",
            self.base_url,
            urlencoding::encode(job_id.as_str())
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::invalid_response(format!("bad status response: {}", e)))
    }

    async fn download(&self, url: &str, dest: &Path) -> BackendResult<u64> {
        match self.stream_to_file(url, dest).await {
            Ok(bytes) => {
                debug!(bytes, dest = %dest.display(), "Download complete");
                Ok(bytes)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(dest = %dest.display(), error = %remove_err, "Failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tphoto_models::JobStatus;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> HttpBackend {
        HttpBackend::new(BackendConfig {
            base_url: format!("{}/api/", server.uri()),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let config = BackendConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpBackend::new(config), Err(BackendError::Config(_))));
    }

    #[tokio::test]
    async fn test_submit_sends_poster_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "posterId": "ad-42",
                "text": "Hello there",
                "voiceId": "voice-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "videoId": "job-7"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let request = GenerateRequest::new("ad-42", "Hello there", "voice-1").unwrap();
        let job = backend.submit(&request).await.unwrap();
        assert_eq!(job.as_str(), "job-7");
    }

    #[tokio::test]
    async fn test_submit_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let request = GenerateRequest::new("ad-42", "Hello", "voice-1").unwrap();
        let err = backend.submit(&request).await.unwrap_err();
        assert!(matches!(err, BackendError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_status_parses_complete_job() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status/job-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "videoId": "job-7",
                "status": "complete",
                "progress": 100,
                "videoUrl": format!("{}/files/job-7.mp4", server.uri()),
                "lipCoordinates": {"lipX": 0.4, "lipY": 0.6, "lipWidth": 0.2, "lipHeight": 0.1},
                "checksum": "abc"
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let status = backend.status(&JobId::from_string("job-7")).await.unwrap();
        assert_eq!(status.status, JobStatus::Complete);
        assert!(status.video_url.unwrap().ends_with("/files/job-7.mp4"));
    }

    #[tokio::test]
    async fn test_status_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/status/job-7"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let err = backend.status(&JobId::from_string("job-7")).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        let payload = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/files/job-7.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ad-42.mp4.part");
        let backend = backend_for(&server);
        let bytes = backend
            .download(&format!("{}/files/job-7.mp4", server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(bytes, payload.len() as u64);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/missing.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ad-42.mp4.part");
        let backend = backend_for(&server);
        let err = backend
            .download(&format!("{}/files/missing.mp4", server.uri()), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::RequestFailed(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok"
            })))
            .mount(&server)
            .await;

        assert!(backend_for(&server).health_check().await.unwrap());
    }
}
