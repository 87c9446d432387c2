use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info};

use super::models::{self, SubmitRequest};
use super::{StatusRecord, UploadedSource, VideoApi};
use crate::config::{ClientIdentity, Config, GenerationParams, OutputConfig};
use crate::error::{CogVideoError, Result};
use crate::retry::{retry_transient, RetryPolicy};
use crate::tensor::EncodedImage;

/// Write buffer used while streaming a video to disk
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// reqwest client for the ChatGLM video API
#[derive(Debug, Clone)]
pub struct ChatGlmClient {
    base_url: String,
    bearer_token: Option<String>,
    identity: ClientIdentity,
    generation: GenerationParams,
    output: OutputConfig,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl ChatGlmClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_seconds))
            .build()
            .map_err(|e| CogVideoError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.api.bearer_token.clone(),
            identity: config.identity.clone(),
            generation: config.generation.clone(),
            output: config.output.clone(),
            retry: config.retry.policy(),
            client,
        })
    }

    /// Use `token` instead of the configured credential
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Local file a job's video is downloaded to
    pub fn video_path(&self, chat_id: &str) -> Result<PathBuf> {
        validate_chat_id(chat_id)?;
        Ok(self.output.video_dir().join(format!("{}.mp4", chat_id)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> Result<HeaderValue> {
        let token = self
            .bearer_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CogVideoError::Configuration(
                    "bearer token not configured (set COGVIDEO_BEARER_TOKEN)".to_string(),
                )
            })?;

        HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| CogVideoError::Configuration("bearer token contains invalid characters".to_string()))
    }

    /// Authorization plus the client-identification headers
    fn api_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.auth_header()?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let identity = &self.identity;
        let mut fields: Vec<(&str, &str)> = vec![
            ("accept-language", identity.accept_language.as_str()),
            ("app-name", identity.app_name.as_str()),
            ("x-app-platform", identity.platform.as_str()),
            ("x-app-version", identity.app_version.as_str()),
            ("x-lang", identity.lang.as_str()),
            ("x-device-brand", identity.device_brand.as_str()),
            ("x-device-model", identity.device_model.as_str()),
            ("priority", identity.priority.as_str()),
        ];
        if let Some(device_id) = &identity.device_id {
            fields.push(("x-device-id", device_id.as_str()));
        }
        // Extra headers come last so they can override the defaults
        for (name, value) in &identity.extra_headers {
            fields.push((name.as_str(), value.as_str()));
        }

        for (name, value) in fields {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CogVideoError::Configuration(format!("invalid header name: {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| CogVideoError::Configuration(format!("invalid value for header {}", name)))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    async fn upload_once(&self, image: &EncodedImage) -> Result<UploadedSource> {
        let url = self.url("/static/upload");

        let file = Part::bytes(image.bytes.clone())
            .file_name("blob")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part("file", file)
            .text("width", image.width.to_string())
            .text("height", image.height.to_string());

        info!("📤 Uploading {}x{} image ({} bytes)", image.width, image.height, image.bytes.len());

        let response = self
            .client
            .post(&url)
            .headers(self.api_headers()?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CogVideoError::network("Upload", e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| CogVideoError::network("Upload", e))?;
        debug!("Upload response {}: {}", status, body);

        models::parse_upload_response(status, &body)
    }

    async fn submit_once(&self, source_id: &str, prompt: &str) -> Result<String> {
        let url = self.url("/chat");
        let request = SubmitRequest::new(source_id, prompt, &self.generation);

        info!("🎬 Sending video generation request");
        debug!(
            "Request data: {}",
            serde_json::to_string(&request).unwrap_or_default()
        );

        let response = self
            .client
            .post(&url)
            .headers(self.api_headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| CogVideoError::network("Video generation", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CogVideoError::network("Video generation", e))?;
        debug!("Generation response {}: {}", status, body);

        models::parse_submit_response(status, &body)
    }

    async fn status_once(&self, chat_id: &str) -> Result<StatusRecord> {
        let url = self.url(&format!("/chat/status/{}", urlencoding::encode(chat_id)));

        let response = self
            .client
            .get(&url)
            .headers(self.api_headers()?)
            .send()
            .await
            .map_err(|e| CogVideoError::network("Status check", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CogVideoError::network("Status check", e))?;
        debug!("Status response {}: {}", status, body);

        models::parse_status_response(status, &body)
    }

    async fn raw_status_once(&self, chat_id: &str) -> Result<String> {
        let url = self.url(&format!("/chat/status/{}", urlencoding::encode(chat_id)));

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, self.auth_header()?)
            .send()
            .await
            .map_err(|e| CogVideoError::network("Status check", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| CogVideoError::network("Status check", e))?;

        models::parse_raw_status(status, &body)
    }

    async fn download_once(&self, video_url: &str, chat_id: &str) -> Result<PathBuf> {
        let video_path = self.video_path(chat_id)?;
        let output_dir = self.output.video_dir();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| CogVideoError::io(&output_dir, e))?;

        info!("📥 Downloading video for {} from {}", chat_id, video_url);

        let response = self
            .client
            .get(video_url)
            .send()
            .await
            .map_err(|e| CogVideoError::network("Download", e))?;

        let status = response.status().as_u16();
        if status != models::HTTP_OK {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Failed to download video: {}", status);
            return Err(CogVideoError::ApiRejection {
                operation: "Download".to_string(),
                status,
                api_status: None,
                api_message: None,
                body,
            });
        }

        let file = tokio::fs::File::create(&video_path)
            .await
            .map_err(|e| CogVideoError::io(&video_path, e))?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CogVideoError::network("Download", e))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| CogVideoError::io(&video_path, e))?;
            written += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| CogVideoError::io(&video_path, e))?;

        info!(
            "✅ Saved {:.1} MB to {}",
            written as f64 / 1_000_000.0,
            video_path.display()
        );
        Ok(video_path)
    }
}

#[async_trait]
impl VideoApi for ChatGlmClient {
    async fn upload_image(&self, image: &EncodedImage) -> Result<UploadedSource> {
        retry_transient(&self.retry, move || self.upload_once(image)).await
    }

    async fn submit_job(&self, source_id: &str, prompt: &str) -> Result<String> {
        retry_transient(&self.retry, move || self.submit_once(source_id, prompt)).await
    }

    async fn poll_status(&self, chat_id: &str) -> Result<StatusRecord> {
        retry_transient(&self.retry, move || self.status_once(chat_id)).await
    }

    async fn download_video(&self, video_url: &str, chat_id: &str) -> Result<PathBuf> {
        retry_transient(&self.retry, move || self.download_once(video_url, chat_id)).await
    }

    async fn fetch_raw_status(&self, chat_id: &str) -> Result<String> {
        retry_transient(&self.retry, move || self.raw_status_once(chat_id)).await
    }
}

/// Job ids become file names, so they must be a single plain path component
pub fn validate_chat_id(chat_id: &str) -> Result<()> {
    let unsafe_id = chat_id.is_empty()
        || chat_id == "."
        || chat_id == ".."
        || chat_id.contains(['/', '\\', '\0'])
        || chat_id.contains("..");

    if unsafe_id {
        return Err(CogVideoError::InvalidInput(format!(
            "job id {:?} cannot be used as a file name",
            chat_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    fn client() -> ChatGlmClient {
        let config = ConfigBuilder::new()
            .with_base_url("http://localhost:1/api/v1/")
            .with_bearer_token("tok")
            .with_device_id("dev-42")
            .with_output_dir(PathBuf::from("/tmp/out"))
            .build();
        ChatGlmClient::new(&config).unwrap()
    }

    #[test]
    fn test_url_joining_trims_trailing_slash() {
        assert_eq!(client().url("/chat"), "http://localhost:1/api/v1/chat");
    }

    #[test]
    fn test_api_headers() {
        let headers = client().api_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers["app-name"], "chatglm");
        assert_eq!(headers["x-device-id"], "dev-42");
        assert_eq!(headers["x-device-brand"], "");
    }

    #[test]
    fn test_missing_token_is_configuration_error() {
        let client = ChatGlmClient::new(&Config::default()).unwrap();
        let err = client.api_headers().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_token_override() {
        let client = ChatGlmClient::new(&Config::default())
            .unwrap()
            .with_bearer_token("override");
        assert_eq!(client.auth_header().unwrap(), "Bearer override");
    }

    #[test]
    fn test_video_path() {
        assert_eq!(
            client().video_path("J1").unwrap(),
            PathBuf::from("/tmp/out/cogvideo/J1.mp4")
        );
    }

    #[test]
    fn test_unsafe_chat_ids_rejected() {
        for id in ["", "..", "../etc", "a/b", "a\\b", "x..y"] {
            assert!(validate_chat_id(id).is_err(), "{:?} accepted", id);
        }
        assert!(validate_chat_id("6790c3b5a1e0b2f1d3c4e5f6").is_ok());
    }
}
