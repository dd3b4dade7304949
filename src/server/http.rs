//! HTTP handlers
//!
//! `POST /api/analyze` and `POST /api/analyze/stream` accept the same
//! multipart form:
//!
//! | field         | meaning                                   |
//! |---------------|-------------------------------------------|
//! | `video`       | uploaded file part                        |
//! | `videoUrl`    | remote video URL, used when no file given |
//! | `focusPrompt` | optional analysis focus                   |
//! | `stream`      | `true` switches `/api/analyze` to SSE     |

use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bytes::BytesMut;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::connect_info::ClientAddr;
use super::error::ApiError;
use super::AppState;
use crate::media::{
    normalize_focus, AnalysisRequest, AnalysisStream, InputError, InputNormalizer, UploadedFile,
};

/// Form field carrying the uploaded video.
pub const FIELD_VIDEO: &str = "video";
/// Form field carrying a remote video URL.
pub const FIELD_VIDEO_URL: &str = "videoUrl";
/// Form field carrying the optional focus prompt.
pub const FIELD_FOCUS: &str = "focusPrompt";
/// Form field requesting a streamed response.
pub const FIELD_STREAM: &str = "stream";

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub analyzer_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Raw form contents before normalization.
#[derive(Debug, Default)]
pub(crate) struct AnalysisForm {
    pub file: Option<UploadedFile>,
    pub video_url: Option<String>,
    pub focus: Option<String>,
    pub stream: bool,
}

impl AnalysisForm {
    fn into_request(self, normalizer: &InputNormalizer) -> Result<(AnalysisRequest, bool), ApiError> {
        let media = normalizer.normalize(self.file, self.video_url.as_deref())?;
        let focus = normalize_focus(self.focus.as_deref());
        Ok((AnalysisRequest::new(media, focus), self.stream))
    }
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.analyzer.as_ref().map(|a| a.model().to_string());
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        analyzer_configured: model.is_some(),
        model,
    })
}

/// POST /api/analyze
pub async fn analyze_handler(
    State(state): State<AppState>,
    client: ClientAddr,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    run_analysis(state, client, multipart, false).await
}

/// POST /api/analyze/stream
pub async fn analyze_stream_handler(
    State(state): State<AppState>,
    client: ClientAddr,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    run_analysis(state, client, multipart, true).await
}

async fn run_analysis(
    state: AppState,
    client: ClientAddr,
    multipart: Result<Multipart, MultipartRejection>,
    force_stream: bool,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("analysis", %request_id, %client);
    async move {
        match handle_analysis(state, multipart, force_stream).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn handle_analysis(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
    force_stream: bool,
) -> Result<Response, ApiError> {
    // Configuration is checked before the body is read.
    let Some(analyzer) = state.analyzer.clone() else {
        return Err(ApiError::Misconfigured(
            "no provider API key configured".to_string(),
        ));
    };

    let multipart = multipart.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Request is not a multipart form");
        ApiError::Input(InputError::MissingInput)
    })?;
    let form = read_form(multipart, &state.normalizer).await?;
    let (request, stream_requested) = form.into_request(&state.normalizer)?;

    tracing::info!(
        media = request.media.kind(),
        focused = request.focus.is_some(),
        stream = force_stream || stream_requested,
        "Analysis request accepted"
    );

    if force_stream || stream_requested {
        let stream = analyzer.analyze_streaming(request).await?;
        Ok(stream_response(stream))
    } else {
        let result = analyzer.analyze(request).await?;
        tracing::info!(
            summary_len = result.summary.len(),
            details_len = result.details.len(),
            "Analysis completed"
        );
        Ok(Json(result).into_response())
    }
}

/// Wrap an open analysis stream in an SSE response.
///
/// The body yields upstream bytes unchanged; dropping it closes the upstream
/// connection.
pub(crate) fn stream_response(stream: AnalysisStream) -> Response {
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Read every form field. Unknown fields are skipped.
pub(crate) async fn read_form(
    mut multipart: Multipart,
    normalizer: &InputNormalizer,
) -> Result<AnalysisForm, ApiError> {
    let mut form = AnalysisForm::default();
    let limit = normalizer.max_upload_bytes();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_VIDEO => form.file = read_file(field, normalizer).await?,
            FIELD_VIDEO_URL => form.video_url = Some(read_text(field, limit).await?),
            FIELD_FOCUS => form.focus = Some(read_text(field, limit).await?),
            FIELD_STREAM => form.stream = parse_flag(&read_text(field, limit).await?),
            _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// Read the file part chunk by chunk, stopping as soon as the ceiling is hit.
///
/// A part with no file name and no bytes is what browsers send for an
/// untouched file input; it counts as no file.
async fn read_file(
    mut field: Field<'_>,
    normalizer: &InputNormalizer,
) -> Result<Option<UploadedFile>, ApiError> {
    let limit = normalizer.max_upload_bytes();
    let file_name = field
        .file_name()
        .map(str::to_string)
        .filter(|name| !name.is_empty());
    let content_type = field.content_type().map(str::to_string);

    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
        data.extend_from_slice(&chunk);
        normalizer.check_size(data.len() as u64)?;
    }

    if file_name.is_none() && data.is_empty() {
        return Ok(None);
    }

    let mut file = UploadedFile::new(data.freeze());
    if let Some(name) = file_name {
        file = file.with_file_name(name);
    }
    if let Some(content_type) = content_type {
        file = file.with_content_type(content_type);
    }
    Ok(Some(file))
}

async fn read_text(field: Field<'_>, limit: u64) -> Result<String, ApiError> {
    field.text().await.map_err(|e| multipart_error(e, limit))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Body-limit failures surface as `413`; any other broken form is internal.
fn multipart_error(err: MultipartError, limit: u64) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::Input(InputError::BodyTooLarge { limit });
    }
    ApiError::Internal(format!("failed to read multipart form: {}", err.body_text()))
}
