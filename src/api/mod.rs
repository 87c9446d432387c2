//! Remote video API
//!
//! [`VideoApi`] is the seam between the generation workflow and the HTTP
//! service; [`ChatGlmClient`] is the reqwest implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::tensor::EncodedImage;

pub mod client;
pub mod models;

pub use client::ChatGlmClient;

/// An image stored on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedSource {
    pub source_id: String,
    pub source_url: String,
}

/// Lifecycle state of a generation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    /// Queued or rendering; carries the raw remote state
    InProgress(String),
    Finished,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl From<&str> for JobState {
    fn from(raw: &str) -> Self {
        match raw {
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            other => Self::InProgress(other.to_string()),
        }
    }
}

impl From<String> for JobState {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress(raw) => f.write_str(raw),
            Self::Finished => f.write_str("finished"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Normalized result of one status poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub chat_id: Option<String>,
    pub status: JobState,
    pub plan: Option<serde_json::Value>,
    pub message: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
}

/// Calls the generation workflow needs from the remote service
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Upload a JPEG-encoded source image
    async fn upload_image(&self, image: &EncodedImage) -> Result<UploadedSource>;

    /// Start a generation job, returning its chat id
    async fn submit_job(&self, source_id: &str, prompt: &str) -> Result<String>;

    /// Fetch the current status of a job
    async fn poll_status(&self, chat_id: &str) -> Result<StatusRecord>;

    /// Download a finished video, returning the local path
    async fn download_video(&self, video_url: &str, chat_id: &str) -> Result<PathBuf>;

    /// Unprocessed status payload as JSON text
    async fn fetch_raw_status(&self, chat_id: &str) -> Result<String>;
}
