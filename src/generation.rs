//! End-to-end image-to-video generation
//!
//! Encode → upload → submit → poll until terminal → download. Every failure
//! aborts the run; a job that was already submitted is left on the remote side.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{JobState, StatusRecord, VideoApi};
use crate::config::PollingConfig;
use crate::error::{CogVideoError, Result};
use crate::tensor::{ImageTensor, DEFAULT_JPEG_QUALITY};

/// A job that reached `finished` with a downloadable video
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub chat_id: String,
    pub record: StatusRecord,
    pub video_url: String,
    /// Status requests issued, including the final one
    pub polls: u32,
}

/// Everything one generation run produced
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub source_id: String,
    pub source_url: String,
    pub chat_id: String,
    pub video_path: PathBuf,
    pub cover_url: Option<String>,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Drives a [`VideoApi`] through a complete generation
pub struct VideoGenerator<A: VideoApi> {
    api: A,
    poll_interval: Duration,
    max_wait: Option<Duration>,
    jpeg_quality: u8,
}

impl<A: VideoApi> VideoGenerator<A> {
    pub fn new(api: A, polling: &PollingConfig) -> Self {
        Self {
            api,
            poll_interval: polling.interval(),
            max_wait: polling.max_wait(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run the whole workflow and return the downloaded video's path
    pub async fn generate(
        &self,
        image: &ImageTensor,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let start = Instant::now();
        debug!("Input image shape: {:?}", image.shape());

        let encoded = image.encode_jpeg(self.jpeg_quality)?;

        let source = self.api.upload_image(&encoded).await?;
        info!(
            "🖼️  Image uploaded: source_id={}, url={}",
            source.source_id, source.source_url
        );

        let chat_id = self.api.submit_job(&source.source_id, prompt).await?;
        info!("🚀 Started video generation: chat_id={}", chat_id);

        let completed = self.wait_for_completion(&chat_id, cancel).await?;

        let video_path = self
            .api
            .download_video(&completed.video_url, &completed.chat_id)
            .await?;

        let elapsed = start.elapsed();
        info!(
            "🎉 Video for {} ready in {:.1}s: {}",
            chat_id,
            elapsed.as_secs_f64(),
            video_path.display()
        );

        Ok(GenerationOutcome {
            source_id: source.source_id,
            source_url: source.source_url,
            chat_id,
            video_path,
            cover_url: completed.record.cover_url,
            polls: completed.polls,
            elapsed,
        })
    }

    /// Poll until the job finishes, fails, is cancelled, or exceeds the
    /// maximum wait
    pub async fn wait_for_completion(&self, chat_id: &str, cancel: &CancellationToken) -> Result<CompletedJob> {
        let start = Instant::now();
        let mut polls = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(chat_id));
            }

            let record = self.api.poll_status(chat_id).await?;
            polls += 1;
            info!(
                "⏳ Status check {} for {}: {}{}",
                polls,
                chat_id,
                record.status,
                record
                    .message
                    .as_deref()
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            );

            match record.status {
                JobState::Finished => {
                    let video_url = match record.video_url.as_deref() {
                        Some(url) if !url.is_empty() => url.to_string(),
                        _ => {
                            warn!("⚠️  Job {} finished without a video URL", chat_id);
                            return Err(CogVideoError::MissingVideoUrl {
                                chat_id: chat_id.to_string(),
                            });
                        }
                    };
                    return Ok(CompletedJob {
                        chat_id: chat_id.to_string(),
                        record,
                        video_url,
                        polls,
                    });
                }
                JobState::Failed => {
                    let message = record
                        .message
                        .unwrap_or_else(|| "no reason given".to_string());
                    warn!("❌ Job {} failed: {}", chat_id, message);
                    return Err(CogVideoError::GenerationFailed {
                        chat_id: chat_id.to_string(),
                        message,
                    });
                }
                JobState::InProgress(_) => {}
            }

            let mut pause = self.poll_interval;
            if let Some(max_wait) = self.max_wait {
                let waited = start.elapsed();
                if waited >= max_wait {
                    return Err(CogVideoError::Timeout {
                        chat_id: chat_id.to_string(),
                        waited,
                    });
                }
                pause = pause.min(max_wait - waited);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(chat_id)),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

fn cancelled(chat_id: &str) -> CogVideoError {
    info!("🛑 Generation of {} cancelled", chat_id);
    CogVideoError::Cancelled {
        chat_id: chat_id.to_string(),
    }
}
