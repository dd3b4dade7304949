//! HTTP error mapping.
//!
//! Every failure becomes a short message plus optional structured detail:
//! `{"error": "...", "details": ...}`. Stack traces and internal state are
//! never exposed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{json, Value};

use crate::media::{AnalysisError, InputError};

/// JSON error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Errors returned by the analysis endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("server misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("unexpected internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Misconfigured(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Input(InputError::TooLarge { .. } | InputError::BodyTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Input(_) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(err) => match err {
                AnalysisError::NotConfigured(_) | AnalysisError::ParseResponse(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                AnalysisError::Request(_)
                | AnalysisError::Upstream { .. }
                | AnalysisError::EmptyResult
                | AnalysisError::StreamInterrupted(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            ApiError::Misconfigured(_) => ("Server is not configured for video analysis".to_string(), None),
            ApiError::Input(err) => (err.to_string(), None),
            ApiError::Analysis(err) => match err {
                AnalysisError::NotConfigured(_) => {
                    ("Server is not configured for video analysis".to_string(), None)
                }
                AnalysisError::Upstream { status, body } => (
                    "Upstream inference request failed".to_string(),
                    Some(json!({ "status": status, "body": body })),
                ),
                AnalysisError::Request(message) | AnalysisError::StreamInterrupted(message) => (
                    "Upstream inference request failed".to_string(),
                    Some(Value::String(message.clone())),
                ),
                AnalysisError::EmptyResult => {
                    ("Upstream returned an empty analysis".to_string(), None)
                }
                AnalysisError::ParseResponse(message) => (
                    "Unexpected internal error".to_string(),
                    Some(Value::String(message.clone())),
                ),
            },
            ApiError::Internal(message) => (
                "Unexpected internal error".to_string(),
                Some(Value::String(message.clone())),
            ),
        };
        ErrorBody { error, details }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Analysis request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Analysis request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
