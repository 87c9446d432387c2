//! Wire formats of the video API and response validation

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{JobState, StatusRecord, UploadedSource};
use crate::config::GenerationParams;
use crate::error::{CogVideoError, Result};

/// HTTP status every call must answer with
pub const HTTP_OK: u16 = 200;

/// Common response envelope: `{"status": 0, "message": "success", "result": {...}}`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: Option<i64>,
    pub message: Option<String>,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct UploadResult {
    pub source_id: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResult {
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusResult {
    pub chat_id: Option<String>,
    pub status: Option<String>,
    pub plan: Option<serde_json::Value>,
    pub msg: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
}

/// Body of `POST /chat`
#[derive(Debug, Serialize)]
pub struct SubmitRequest<'a> {
    pub prompt: &'a str,
    pub conversation_id: &'a str,
    pub source_list: Vec<&'a str>,
    pub base_parameter_extra: &'a GenerationParams,
}

impl<'a> SubmitRequest<'a> {
    pub fn new(source_id: &'a str, prompt: &'a str, params: &'a GenerationParams) -> Self {
        Self {
            prompt,
            conversation_id: "",
            source_list: vec![source_id],
            base_parameter_extra: params,
        }
    }
}

fn rejection(operation: &str, status: u16, body: &str) -> CogVideoError {
    CogVideoError::ApiRejection {
        operation: operation.to_string(),
        status,
        api_status: None,
        api_message: None,
        body: body.to_string(),
    }
}

fn malformed(operation: &str, status: u16, reason: impl Into<String>, body: &str) -> CogVideoError {
    CogVideoError::MalformedResponse {
        operation: operation.to_string(),
        status,
        reason: reason.into(),
        body: body.to_string(),
    }
}

/// Require HTTP 200 and a JSON body
pub fn decode_envelope<T: DeserializeOwned>(operation: &str, status: u16, body: &str) -> Result<ApiEnvelope<T>> {
    if status != HTTP_OK {
        error!("❌ {} failed with status {}: {}", operation, status, body);
        return Err(rejection(operation, status, body));
    }

    serde_json::from_str(body).map_err(|e| {
        error!("❌ {} returned an unreadable body: {}", operation, e);
        malformed(operation, status, format!("invalid JSON: {}", e), body)
    })
}

/// Require `status == 0` and `message == "success"` and return the result object
pub fn require_success<T>(operation: &str, status: u16, body: &str, envelope: ApiEnvelope<T>) -> Result<T> {
    let accepted = envelope.status == Some(0) && envelope.message.as_deref() == Some("success");
    if !accepted {
        error!(
            "❌ {} rejected: status={:?} message={:?}",
            operation, envelope.status, envelope.message
        );
        return Err(CogVideoError::ApiRejection {
            operation: operation.to_string(),
            status,
            api_status: envelope.status,
            api_message: envelope.message,
            body: body.to_string(),
        });
    }

    envelope
        .result
        .ok_or_else(|| malformed(operation, status, "missing result object", body))
}

/// Interpret the upload response
pub fn parse_upload_response(status: u16, body: &str) -> Result<UploadedSource> {
    const OP: &str = "Upload";
    let envelope: ApiEnvelope<UploadResult> = decode_envelope(OP, status, body)?;
    let result = envelope
        .result
        .ok_or_else(|| malformed(OP, status, "missing result object", body))?;

    match (result.source_id, result.source_url) {
        (Some(source_id), Some(source_url)) if !source_id.is_empty() => Ok(UploadedSource {
            source_id,
            source_url,
        }),
        _ => Err(malformed(OP, status, "missing source_id or source_url", body)),
    }
}

/// Interpret the job submission response, returning the chat id
pub fn parse_submit_response(status: u16, body: &str) -> Result<String> {
    const OP: &str = "Video generation";
    let envelope: ApiEnvelope<SubmitResult> = decode_envelope(OP, status, body)?;
    let result = require_success(OP, status, body, envelope)?;

    result
        .chat_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed(OP, status, "no chat_id in response", body))
}

/// Interpret a status poll response
pub fn parse_status_response(status: u16, body: &str) -> Result<StatusRecord> {
    const OP: &str = "Status check";
    let envelope: ApiEnvelope<StatusResult> = decode_envelope(OP, status, body)?;
    let result = require_success(OP, status, body, envelope)?;

    Ok(StatusRecord {
        chat_id: result.chat_id,
        status: JobState::from(result.status.as_deref().unwrap_or("pending")),
        plan: result.plan,
        message: result.msg,
        video_url: result.video_url,
        cover_url: result.cover_url,
    })
}

/// Re-serialize a raw status payload without checking the envelope
pub fn parse_raw_status(status: u16, body: &str) -> Result<String> {
    const OP: &str = "Status check";
    if status != HTTP_OK {
        error!("❌ {} failed with status {}: {}", OP, status, body);
        return Err(rejection(OP, status, body));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| malformed(OP, status, format!("invalid JSON: {}", e), body))?;
    serde_json::to_string(&value).map_err(|e| malformed(OP, status, e.to_string(), body))
}
