/// CogVideo plugin nodes - Rust Implementation
///
/// Image-to-video generation against the ChatGLM video API, exposed as two
/// node-graph plugin nodes: one that turns an image into a local MP4 and one
/// that reports the raw status of a job.

pub mod api;
pub mod config;
pub mod error;
pub mod generation;
pub mod nodes;
pub mod retry;
pub mod tensor;

#[cfg(feature = "python-bindings")]
pub mod python_bridge;

// Re-export main types for easy access
pub use crate::api::{ChatGlmClient, JobState, StatusRecord, UploadedSource, VideoApi};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{CogVideoError, ErrorKind, Result};
pub use crate::generation::{CompletedJob, GenerationOutcome, VideoGenerator};
pub use crate::nodes::{node_class_mappings, CogVideoStatus, CogVideoUploader, NodeSpec};
pub use crate::retry::{retry, retry_transient, RetryPolicy};
pub use crate::tensor::{EncodedImage, ImageTensor};
