//! Request and response messages of the control channel.
//!
//! Requests are JSON objects tagged by `action`:
//!
//! ```json
//! { "action": "downloadPdf", "options": { "highRes": true, "autoScroll": false } }
//! ```

use serde::{Deserialize, Serialize};

use crate::export::ExportOptions;
use crate::media::VideoUrlResponse;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    DownloadPdf {
        #[serde(default)]
        options: ExportOptions,
    },
    ExtractImages,
    DownloadZip {
        #[serde(default)]
        options: ExportOptions,
    },
    GetVideoUrl,
    Ping,
}

/// Every `action` a `Request` can carry
const ACTIONS: &[&str] = &["downloadPdf", "extractImages", "downloadZip", "getVideoUrl", "ping"];

impl Request {
    /// Parse a request.
    ///
    /// A missing or unrecognized `action` becomes the "Unknown action" reply.
    /// A known action whose fields do not parse is answered with what was wrong.
    pub fn from_json(json: &str) -> std::result::Result<Request, Response> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Response::error(format!("Malformed request: {}", e)))?;
        let action = match value.get("action").and_then(|a| a.as_str()) {
            Some(action) if ACTIONS.contains(&action) => action.to_string(),
            _ => return Err(Response::unknown_action()),
        };
        serde_json::from_value(value)
            .map_err(|e| Response::error(format!("Invalid {} request: {}", action, e)))
    }
}

/// `{ success, count?, error? }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn ok(count: Option<usize>) -> Self {
        Self {
            success: true,
            count,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Export(ExportResponse),
    Video(VideoUrlResponse),
    Pong { status: &'static str },
    Error { error: String },
}

impl Response {
    pub fn pong() -> Self {
        Response::Pong { status: "ok" }
    }

    pub fn unknown_action() -> Self {
        Self::error("Unknown action")
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
    }
}
