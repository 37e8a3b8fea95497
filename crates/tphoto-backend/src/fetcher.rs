//! Job submission, fixed-interval polling and download.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use tphoto_models::{Clock, GenerateRequest, JobId, JobStatus, StatusResponse};

use crate::client::LipSyncBackend;
use crate::config::PollConfig;
use crate::error::{BackendError, BackendResult};
use crate::metrics;

/// A finished download on local storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedVideo {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Drives a generation job from submission to a local file.
pub struct BackendVideoFetcher {
    backend: Arc<dyn LipSyncBackend>,
    clock: Arc<dyn Clock>,
    poll: PollConfig,
}

impl BackendVideoFetcher {
    pub fn new(backend: Arc<dyn LipSyncBackend>, clock: Arc<dyn Clock>, poll: PollConfig) -> Self {
        Self {
            backend,
            clock,
            poll,
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Submit a job. Submission is never retried.
    pub async fn generate_lip_sync(&self, request: &GenerateRequest) -> BackendResult<JobId> {
        let job_id = self.backend.submit(request).await?;
        metrics::record_submit();
        Ok(job_id)
    }

    /// Poll until the job reaches a terminal status or the deadline passes.
    ///
    /// The first poll is immediate; later polls are `interval` apart. A
    /// terminal status returns at once. Transient transport failures count
    /// as a poll and are retried on the next tick.
    pub async fn poll_until_complete(&self, job_id: &JobId) -> BackendResult<StatusResponse> {
        let started = self.clock.now();
        let mut polls: u32 = 0;

        loop {
            let elapsed = self.clock.now().saturating_duration_since(started);
            let remaining = self.poll.timeout.saturating_sub(elapsed);
            if remaining.is_zero() {
                warn!(video_id = %job_id, polls, "Polling timed out");
                metrics::record_outcome("timeout");
                return Err(BackendError::Timeout(self.poll.timeout.as_secs()));
            }

            polls += 1;
            let result = match tokio::time::timeout(remaining, self.backend.status(job_id)).await {
                Ok(result) => result,
                Err(_) => {
                    metrics::record_outcome("timeout");
                    return Err(BackendError::Timeout(self.poll.timeout.as_secs()));
                }
            };

            match result {
                Ok(status) => {
                    metrics::record_poll(status.status);
                    match status.status {
                        JobStatus::Complete => {
                            if status.video_url.as_deref().map_or(true, str::is_empty) {
                                metrics::record_outcome("error");
                                return Err(BackendError::invalid_response(
                                    "complete status without videoUrl",
                                ));
                            }
                            info!(video_id = %job_id, polls, "Generation complete");
                            metrics::record_outcome("complete");
                            return Ok(status);
                        }
                        JobStatus::Failed => {
                            let message = status
                                .error_message
                                .unwrap_or_else(|| "backend reported failure".to_string());
                            warn!(video_id = %job_id, polls, error = %message, "Generation failed");
                            metrics::record_outcome("failed");
                            return Err(BackendError::GenerationFailed(message));
                        }
                        JobStatus::Pending | JobStatus::Processing => {
                            debug!(
                                video_id = %job_id,
                                status = %status.status,
                                progress = status.progress,
                                "Job in progress"
                            );
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(video_id = %job_id, polls, error = %e, "Status poll failed, will retry");
                }
                Err(e) => {
                    metrics::record_outcome("error");
                    return Err(e);
                }
            }

            self.clock.sleep(self.poll.interval).await;
        }
    }

    /// Download the finished asset into `dest`.
    pub async fn download_video(&self, url: &str, dest: &Path) -> BackendResult<DownloadedVideo> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let size_bytes = self.backend.download(url, dest).await?;
        Ok(DownloadedVideo {
            path: dest.to_path_buf(),
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tphoto_models::ManualClock;

    type Scripted = BackendResult<StatusResponse>;

    /// Backend returning a fixed sequence of status results.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Scripted>>,
        polls: Mutex<Vec<Duration>>,
        clock: ManualClock,
    }

    impl ScriptedBackend {
        fn new(clock: ManualClock, script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                polls: Mutex::new(Vec::new()),
                clock,
            }
        }

        fn poll_times(&self) -> Vec<Duration> {
            self.polls.lock().unwrap().clone()
        }
    }

    fn status(state: JobStatus) -> StatusResponse {
        StatusResponse {
            video_id: JobId::from_string("job-1"),
            status: state,
            progress: 0,
            video_url: (state == JobStatus::Complete).then(|| "https://cdn/v.mp4".to_string()),
            lip_coordinates: None,
            checksum: None,
            error_message: (state == JobStatus::Failed).then(|| "no face".to_string()),
        }
    }

    #[async_trait]
    impl LipSyncBackend for ScriptedBackend {
        async fn submit(&self, _request: &GenerateRequest) -> BackendResult<JobId> {
            Ok(JobId::from_string("job-1"))
        }

        async fn status(&self, _job_id: &JobId) -> BackendResult<StatusResponse> {
            self.polls.lock().unwrap().push(self.clock.elapsed());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(status(JobStatus::Processing)))
        }

        async fn download(&self, _url: &str, _dest: &Path) -> BackendResult<u64> {
            Ok(0)
        }
    }

    fn fetcher(backend: Arc<ScriptedBackend>, clock: ManualClock) -> BackendVideoFetcher {
        BackendVideoFetcher::new(backend, Arc::new(clock), PollConfig::default())
    }

    #[tokio::test]
    async fn test_completes_on_third_poll() {
        let clock = ManualClock::new();
        let backend = Arc::new(ScriptedBackend::new(
            clock.clone(),
            vec![
                Ok(status(JobStatus::Pending)),
                Ok(status(JobStatus::Processing)),
                Ok(status(JobStatus::Complete)),
            ],
        ));

        let result = fetcher(backend.clone(), clock.clone())
            .poll_until_complete(&JobId::from_string("job-1"))
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Complete);
        assert_eq!(
            backend.poll_times(),
            vec![Duration::ZERO, Duration::from_secs(2), Duration::from_secs(4)]
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(4));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn test_failed_status_stops_polling() {
        let clock = ManualClock::new();
        let backend = Arc::new(ScriptedBackend::new(
            clock.clone(),
            vec![Ok(status(JobStatus::Processing)), Ok(status(JobStatus::Failed))],
        ));

        let err = fetcher(backend.clone(), clock.clone())
            .poll_until_complete(&JobId::from_string("job-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::GenerationFailed(ref m) if m == "no face"));
        assert_eq!(backend.poll_times().len(), 2);
    }

    #[tokio::test]
    async fn test_times_out_after_sixty_seconds() {
        let clock = ManualClock::new();
        let backend = Arc::new(ScriptedBackend::new(clock.clone(), Vec::new()));

        let err = fetcher(backend.clone(), clock.clone())
            .poll_until_complete(&JobId::from_string("job-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Timeout(60)));
        let polls = backend.poll_times();
        assert_eq!(polls.len(), 30);
        assert_eq!(polls.last().copied(), Some(Duration::from_secs(58)));
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_transient_errors_keep_polling() {
        let clock = ManualClock::new();
        let backend = Arc::new(ScriptedBackend::new(
            clock.clone(),
            vec![
                Err(BackendError::from_http_status(503, "busy")),
                Ok(status(JobStatus::Complete)),
            ],
        ));

        let result = fetcher(backend.clone(), clock)
            .poll_until_complete(&JobId::from_string("job-1"))
            .await;

        assert!(result.is_ok());
        assert_eq!(backend.poll_times().len(), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_aborts() {
        let clock = ManualClock::new();
        let backend = Arc::new(ScriptedBackend::new(
            clock.clone(),
            vec![Err(BackendError::from_http_status(404, "unknown job"))],
        ));

        let err = fetcher(backend.clone(), clock)
            .poll_until_complete(&JobId::from_string("job-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::RequestFailed(_)));
        assert_eq!(backend.poll_times().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_without_url_is_invalid() {
        let clock = ManualClock::new();
        let mut complete = status(JobStatus::Complete);
        complete.video_url = None;
        let backend = Arc::new(ScriptedBackend::new(clock.clone(), vec![Ok(complete)]));

        let err = fetcher(backend, clock)
            .poll_until_complete(&JobId::from_string("job-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }
}
