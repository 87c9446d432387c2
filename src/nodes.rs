//! Node-graph plugin nodes
//!
//! Each node publishes a [`NodeSpec`] describing its inputs and output the way
//! the host runtime expects, and exposes one blocking entry point the host
//! calls per graph execution.

use serde::Serialize;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{ChatGlmClient, VideoApi};
use crate::config::Config;
use crate::error::{CogVideoError, Result};
use crate::generation::VideoGenerator;
use crate::tensor::ImageTensor;

/// Category both nodes are listed under
pub const NODE_CATEGORY: &str = "CogVideo";

/// Prompt offered when the user has not typed one ("make the whole picture move")
pub const DEFAULT_PROMPT: &str = "让画面整体动起来";

/// Socket types understood by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketType {
    Image,
    String,
}

/// One required input of a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub name: &'static str,
    pub socket: SocketType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    pub multiline: bool,
}

/// Declaration the host reads to place a node in its graph editor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSpec {
    pub class_name: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub function: &'static str,
    pub inputs: Vec<InputSpec>,
    pub output_type: SocketType,
    pub output_name: &'static str,
}

/// Specs of every node this plugin provides
pub fn node_class_mappings() -> Vec<NodeSpec> {
    vec![CogVideoUploader::spec(), CogVideoStatus::spec()]
}

fn blocking_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CogVideoError::Configuration(format!("failed to create runtime: {}", e)))
}

/// Uploads an image, generates a video from it and returns the local path
#[derive(Debug, Clone)]
pub struct CogVideoUploader {
    config: Config,
}

impl CogVideoUploader {
    /// Fails when `config` does not pass [`Config::validate`]
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn spec() -> NodeSpec {
        NodeSpec {
            class_name: "CogVideoUploader",
            display_name: "CogVideo Uploader",
            category: NODE_CATEGORY,
            function: "generate_video",
            inputs: vec![
                InputSpec {
                    name: "image",
                    socket: SocketType::Image,
                    default: None,
                    multiline: false,
                },
                InputSpec {
                    name: "prompt",
                    socket: SocketType::String,
                    default: Some(DEFAULT_PROMPT),
                    multiline: false,
                },
                InputSpec {
                    name: "bearer_token",
                    socket: SocketType::String,
                    default: Some(""),
                    multiline: false,
                },
            ],
            output_type: SocketType::String,
            output_name: "video_path",
        }
    }

    /// Client for this invocation; a non-empty `bearer_token` input wins over
    /// the configured one
    pub fn client(&self, bearer_token: &str) -> Result<ChatGlmClient> {
        let client = ChatGlmClient::new(&self.config)?;
        let token = bearer_token.trim();
        Ok(if token.is_empty() {
            client
        } else {
            client.with_bearer_token(token)
        })
    }

    /// Async form of [`generate_video`](Self::generate_video)
    pub async fn generate_video_async(
        &self,
        image: &ImageTensor,
        prompt: &str,
        bearer_token: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let prompt = if prompt.trim().is_empty() { DEFAULT_PROMPT } else { prompt };
        let generator = VideoGenerator::new(self.client(bearer_token)?, &self.config.polling)
            .with_jpeg_quality(self.config.api.jpeg_quality);

        let outcome = generator.generate(image, prompt, cancel).await?;
        Ok(outcome.video_path.to_string_lossy().into_owned())
    }

    /// Host entry point: blocks until the video is downloaded
    pub fn generate_video(&self, image: &ImageTensor, prompt: &str, bearer_token: &str) -> Result<String> {
        self.generate_video_cancellable(image, prompt, bearer_token, &CancellationToken::new())
    }

    /// Blocking entry point the host can abort through `cancel`
    pub fn generate_video_cancellable(
        &self,
        image: &ImageTensor,
        prompt: &str,
        bearer_token: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        info!("🎥 {} invoked", Self::spec().display_name);
        blocking_runtime()?.block_on(self.generate_video_async(image, prompt, bearer_token, cancel))
    }
}

/// Returns the raw remote status payload of a job
#[derive(Debug, Clone)]
pub struct CogVideoStatus {
    config: Config,
}

impl CogVideoStatus {
    /// Fails when `config` does not pass [`Config::validate`]
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn spec() -> NodeSpec {
        NodeSpec {
            class_name: "CogVideoStatus",
            display_name: "CogVideo Status",
            category: NODE_CATEGORY,
            function: "check_status",
            inputs: vec![InputSpec {
                name: "chat_id",
                socket: SocketType::String,
                default: None,
                multiline: false,
            }],
            output_type: SocketType::String,
            output_name: "status",
        }
    }

    pub async fn check_status_async(&self, chat_id: &str) -> Result<String> {
        let chat_id = chat_id.trim();
        if chat_id.is_empty() {
            return Err(CogVideoError::InvalidInput("chat_id is empty".to_string()));
        }

        let client = ChatGlmClient::new(&self.config)?;
        client.fetch_raw_status(chat_id).await
    }

    /// Host entry point
    pub fn check_status(&self, chat_id: &str) -> Result<String> {
        blocking_runtime()?.block_on(self.check_status_async(chat_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_mappings() {
        let specs = node_class_mappings();
        let names: Vec<_> = specs.iter().map(|s| s.class_name).collect();
        assert_eq!(names, vec!["CogVideoUploader", "CogVideoStatus"]);
        assert!(specs.iter().all(|s| s.category == "CogVideo"));
        assert!(specs.iter().all(|s| s.output_type == SocketType::String));
    }

    #[test]
    fn test_uploader_spec() {
        let spec = CogVideoUploader::spec();
        assert_eq!(spec.display_name, "CogVideo Uploader");
        assert_eq!(spec.function, "generate_video");
        assert_eq!(spec.output_name, "video_path");

        let inputs: Vec<_> = spec.inputs.iter().map(|i| (i.name, i.socket)).collect();
        assert_eq!(
            inputs,
            vec![
                ("image", SocketType::Image),
                ("prompt", SocketType::String),
                ("bearer_token", SocketType::String),
            ]
        );
        assert_eq!(spec.inputs[1].default, Some(DEFAULT_PROMPT));
    }

    #[test]
    fn test_spec_serializes_socket_names() {
        let value = serde_json::to_value(CogVideoStatus::spec()).unwrap();
        assert_eq!(value["inputs"][0]["socket"], "STRING");
        assert_eq!(value["output_type"], "STRING");
        assert!(value["inputs"][0].get("default").is_none());
    }

    #[test]
    fn test_status_rejects_empty_chat_id() {
        let node = CogVideoStatus::new(Config::default()).unwrap();
        let err = node.check_status("  ").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_uploader_requires_a_token() {
        let node = CogVideoUploader::new(Config::default()).unwrap();
        let image = ImageTensor::new(vec![2, 2, 3], vec![0.5; 12]).unwrap();

        let err = node.generate_video(&image, "", "").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_nodes_reject_invalid_config() {
        let zero_interval = crate::config::ConfigBuilder::new()
            .with_bearer_token("tok")
            .with_poll_interval(std::time::Duration::ZERO)
            .build();

        let err = CogVideoUploader::new(zero_interval.clone()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(err.to_string().contains("interval_seconds"));

        let err = CogVideoStatus::new(zero_interval).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
