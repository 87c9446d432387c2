use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CogVideoError, Result};
use crate::retry::RetryPolicy;

/// Configuration for the CogVideo client and nodes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote API endpoint and credential
    pub api: ApiConfig,

    /// Client-identification headers sent with API calls
    pub identity: ClientIdentity,

    /// Generation parameters sent with every job
    pub generation: GenerationParams,

    /// Network retry settings
    pub retry: RetryConfig,

    /// Job polling settings
    pub polling: PollingConfig,

    /// Where downloaded videos go
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the video API
    pub base_url: String,

    /// Bearer token; never compiled in, comes from a config file or the environment
    pub bearer_token: Option<String>,

    /// Whole-request timeout in seconds
    pub timeout_seconds: u64,

    /// Connection timeout in seconds
    pub connect_timeout_seconds: u64,

    /// JPEG quality for uploaded images
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    pub app_name: String,
    pub platform: String,
    pub app_version: String,
    pub lang: String,
    pub accept_language: String,
    pub device_brand: String,
    pub device_model: String,

    /// Sent as `x-device-id` only when set
    pub device_id: Option<String>,

    pub priority: String,

    /// Any further headers the remote side expects
    pub extra_headers: BTreeMap<String, String>,
}

/// Fixed generation parameters (`base_parameter_extra` on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub generation_pattern: u32,
    pub resolution: u32,
    pub fps: u32,
    pub duration: u32,
    pub generation_ai_audio: u32,
    pub generation_ratio_height: u32,
    pub generation_ratio_width: u32,
    pub activity_type: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per network call
    pub max_attempts: u32,

    /// Pause between attempts in seconds
    pub delay_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Pause between status polls in seconds
    pub interval_seconds: f64,

    /// Give up after this many seconds (unset = wait indefinitely)
    pub max_wait_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base output directory
    pub base_dir: PathBuf,

    /// Subdirectory for downloaded videos
    pub subdir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://chatglm.cn/chatglm/video-api/v1".to_string(),
            bearer_token: None,
            timeout_seconds: 120,
            connect_timeout_seconds: 30,
            jpeg_quality: crate::tensor::DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            app_name: "chatglm".to_string(),
            platform: "pc".to_string(),
            app_version: "0.0.1".to_string(),
            lang: "zh".to_string(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".to_string(),
            device_brand: String::new(),
            device_model: String::new(),
            device_id: None,
            priority: "u=1, i".to_string(),
            extra_headers: BTreeMap::new(),
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            generation_pattern: 1,
            resolution: 0,
            fps: 0,
            duration: 1,
            generation_ai_audio: 0,
            generation_ratio_height: 9,
            generation_ratio_width: 16,
            activity_type: 0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_seconds: 2.0,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5.0,
            max_wait_seconds: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./output"),
            subdir: "cogvideo".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, secs_f64(self.delay_seconds))
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        secs_f64(self.interval_seconds)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_seconds.map(secs_f64)
    }
}

impl OutputConfig {
    /// Directory the videos are written to
    pub fn video_dir(&self) -> PathBuf {
        self.base_dir.join(&self.subdir)
    }
}

/// Seconds to a `Duration`; non-positive and NaN map to zero, values too
/// large for a `Duration` saturate
fn secs_f64(seconds: f64) -> Duration {
    if seconds.is_nan() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

impl Config {
    /// Load configuration from the first readable config file, then apply
    /// environment overrides
    pub fn load() -> Result<Self> {
        let mut config_paths = vec![
            PathBuf::from("cogvideo.toml"),
            PathBuf::from("config/cogvideo.toml"),
        ];
        if let Some(home) = std::env::var_os("HOME") {
            config_paths.push(PathBuf::from(home).join(".config/cogvideo/config.toml"));
        }

        let mut config = None;
        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(parsed) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        config = Some(parsed);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }

        let mut config = config.unwrap_or_default();
        config.apply_env();
        Ok(config)
    }

    /// Load a specific config file, then apply environment overrides
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| CogVideoError::io(path, e))?;
        let mut config: Config = toml::from_str(&config_str)
            .map_err(|e| CogVideoError::Configuration(format!("{}: {}", path.display(), e)))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override fields from `COGVIDEO_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("COGVIDEO_BEARER_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.api.bearer_token = Some(token.trim().to_string());
        }

        if let Some(base_url) = var("COGVIDEO_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Some(device_id) = var("COGVIDEO_DEVICE_ID") {
            self.identity.device_id = Some(device_id);
        }

        if let Some(output_dir) = var("COGVIDEO_OUTPUT_DIR") {
            self.output.base_dir = PathBuf::from(output_dir);
        }

        if let Some(interval) = var("COGVIDEO_POLL_INTERVAL") {
            match interval.parse() {
                Ok(seconds) => self.polling.interval_seconds = seconds,
                Err(_) => tracing::warn!("Ignoring invalid COGVIDEO_POLL_INTERVAL: {}", interval),
            }
        }

        if let Some(max_wait) = var("COGVIDEO_MAX_WAIT") {
            match max_wait.parse() {
                Ok(seconds) => self.polling.max_wait_seconds = Some(seconds),
                Err(_) => tracing::warn!("Ignoring invalid COGVIDEO_MAX_WAIT: {}", max_wait),
            }
        }

        if let Some(retries) = var("COGVIDEO_MAX_RETRIES") {
            match retries.parse() {
                Ok(attempts) => self.retry.max_attempts = attempts,
                Err(_) => tracing::warn!("Ignoring invalid COGVIDEO_MAX_RETRIES: {}", retries),
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| CogVideoError::Configuration(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, config_str).map_err(|e| CogVideoError::io(path, e))?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.api.base_url).map_err(|e| {
            CogVideoError::Configuration(format!("invalid base_url {}: {}", self.api.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CogVideoError::Configuration(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(CogVideoError::Configuration(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if !self.polling.interval_seconds.is_finite() || self.polling.interval().is_zero() {
            return Err(CogVideoError::Configuration(
                "polling.interval_seconds must be greater than 0".to_string(),
            ));
        }

        if let Some(max_wait) = self.polling.max_wait_seconds {
            if !max_wait.is_finite() || secs_f64(max_wait).is_zero() {
                return Err(CogVideoError::Configuration(
                    "polling.max_wait_seconds must be greater than 0 when set".to_string(),
                ));
            }
        }

        if self.api.jpeg_quality == 0 || self.api.jpeg_quality > 100 {
            return Err(CogVideoError::Configuration(
                "api.jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.output.subdir.is_empty() {
            return Err(CogVideoError::Configuration("output.subdir must not be empty".to_string()));
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "CogVideo Configuration:\n\
            - Base URL: {}\n\
            - Bearer token: {}\n\
            - Retries: {} attempts, {}s apart\n\
            - Poll interval: {}s\n\
            - Max wait: {}\n\
            - Output directory: {}",
            self.api.base_url,
            if self.api.bearer_token.is_some() { "set" } else { "missing" },
            self.retry.max_attempts,
            self.retry.delay_seconds,
            self.polling.interval_seconds,
            self.polling
                .max_wait_seconds
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "unbounded".to_string()),
            self.output.video_dir().display()
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.api.base_url = base_url.into();
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.config.api.bearer_token = Some(token.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.config.identity.device_id = Some(device_id.into());
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.base_dir = dir;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self.config.retry.delay_seconds = delay.as_secs_f64();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.polling.interval_seconds = interval.as_secs_f64();
        self
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.config.polling.max_wait_seconds = max_wait.map(|d| d.as_secs_f64());
        self
    }

    pub fn with_generation(mut self, generation: GenerationParams) -> Self {
        self.config.generation = generation;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
