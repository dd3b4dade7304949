//! Video analysis relay using an OpenAI-compatible chat completions API.
//!
//! Builds a single-turn multimodal request (prompt text followed by the video
//! reference), sends it to the configured inference provider and returns
//! either:
//!
//! - a complete [`AnalysisResult`] split into summary and details, or
//! - an [`AnalysisStream`] forwarding the provider's event-stream bytes
//!   verbatim, in arrival order.
//!
//! The relay never interprets individual stream events; see
//! [`SseDeltaDecoder`](super::stream::SseDeltaDecoder) for the consumer-side
//! parser.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::input::MediaReference;
use super::stream::AnalysisStream;
use crate::config::ProviderConfig;

/// Default provider base URL; the endpoint is `{base}/chat/completions`.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default multimodal model identifier.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Summary used when the first line of the model output is blank.
pub const SUMMARY_FALLBACK: &str = "Video analysis complete. See the details below.";

/// Fixed instruction describing the required report sections.
pub const SYSTEM_INSTRUCTION: &str = "You are an expert video analyst. Watch the provided video \
and write a structured report. Start with a single-line summary of the video on the first line, \
then continue with these sections:\n\
1. Summary: a concise overview of what the video shows.\n\
2. Scene breakdown: a timeline of the key scenes or moments, with approximate timestamps \
where they can be inferred.\n\
3. Insights: domain-specific observations an expert in the subject would find valuable.\n\
4. Recommendations: actionable suggestions as a bullet list.";

const DEFAULT_FOCUS_SUFFIX: &str = "\n\nNo specific focus was requested, so infer the most \
valuable insights for this video and its likely audience.";

/// Errors that can occur while relaying an analysis.
#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream returned no analysis text")]
    EmptyResult,

    #[error("failed to parse upstream response: {0}")]
    ParseResponse(String),

    #[error("upstream stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Assemble the prompt: the fixed instruction plus a focus-dependent suffix.
pub fn build_prompt(focus: Option<&str>) -> String {
    match focus.map(str::trim).filter(|f| !f.is_empty()) {
        Some(focus) => format!(
            "{SYSTEM_INSTRUCTION}\n\nThe user asked you to focus on: \"{focus}\". \
Prioritize observations and recommendations related to this focus while still \
covering every section."
        ),
        None => format!("{SYSTEM_INSTRUCTION}{DEFAULT_FOCUS_SUFFIX}"),
    }
}

/// A normalized analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub media: MediaReference,
    pub focus: Option<String>,
}

impl AnalysisRequest {
    pub fn new(media: MediaReference, focus: Option<String>) -> Self {
        Self { media, focus }
    }

    pub fn prompt(&self) -> String {
        build_prompt(self.focus.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Chat completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    InputVideo { video_url: VideoUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoUrl {
    pub url: String,
}

impl ChatCompletionRequest {
    /// One user message: the prompt text, then the video reference.
    pub fn new(model: &str, request: &AnalysisRequest, stream: bool) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: request.prompt(),
                    },
                    ContentPart::InputVideo {
                        video_url: VideoUrl {
                            url: request.media.to_url().into_owned(),
                        },
                    },
                ],
            }],
            stream,
        }
    }
}

/// Chat completions response body; every level is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<MessageContent>,
}

/// Providers return content either as a string or as a list of parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentFragment>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentFragment {
    #[serde(default)]
    pub text: Option<String>,
}

impl CompletionResponse {
    /// Text of the first choice's message, if it has any non-blank text.
    pub fn first_choice_text(&self) -> Option<String> {
        let content = self.choices.first()?.message.as_ref()?.content.as_ref()?;
        let text = match content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Complete (non-streaming) analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub details: String,
}

impl AnalysisResult {
    /// Split raw model output on the first newline.
    ///
    /// The first line (trimmed) is the summary, falling back to
    /// [`SUMMARY_FALLBACK`] when blank. The remaining lines, trimmed, are the
    /// details; when nothing remains the full raw text is used instead.
    pub fn from_raw(raw: &str) -> Self {
        let (first, rest) = raw.split_once('\n').unwrap_or((raw, ""));

        let summary = match first.trim() {
            "" => SUMMARY_FALLBACK.to_string(),
            s => s.to_string(),
        };
        let details = match rest.trim() {
            "" => raw.to_string(),
            d => d.to_string(),
        };

        Self { summary, details }
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Provider-agnostic interface for video analysis.
#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    /// Model identifier sent with every request.
    fn model(&self) -> &str;

    /// Run the analysis and wait for the complete result.
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;

    /// Start a streaming analysis.
    ///
    /// Resolves once the provider has answered with a status line. A
    /// non-success status is returned here as an error, before any byte is
    /// forwarded.
    async fn analyze_streaming(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisStream, AnalysisError>;
}

/// Analyzer backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionsAnalyzer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for ChatCompletionsAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsAnalyzer")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsAnalyzer {
    /// Create an analyzer with default endpoint and model.
    pub fn new(api_key: String) -> Result<Self, AnalysisError> {
        Self::build(api_key, Duration::from_secs(10), None)
    }

    /// Create an analyzer from configuration.
    ///
    /// Returns `Ok(None)` when no API key is configured so callers can keep
    /// running and report the problem per request.
    pub fn from_config(config: &ProviderConfig) -> Result<Option<Self>, AnalysisError> {
        let Some(api_key) = config.api_key.clone().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let analyzer = Self::build(
            api_key,
            Duration::from_secs(config.connect_timeout_secs),
            config.request_timeout_secs.map(Duration::from_secs),
        )?
        .with_base_url(config.base_url.clone())
        .with_model(config.model.clone());
        Ok(Some(analyzer))
    }

    fn build(
        api_key: String,
        connect_timeout: Duration,
        request_timeout: Option<Duration>,
    ) -> Result<Self, AnalysisError> {
        if api_key.trim().is_empty() {
            return Err(AnalysisError::NotConfigured(
                "provider API key must not be empty".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        // No overall deadline unless configured; streams may run long.
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AnalysisError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    /// Set a custom base URL (e.g., for a proxy or a test backend).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Send the request and fail on a non-success status.
    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, AnalysisError> {
        let mut http_request = self
            .client
            .post(self.endpoint())
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");
        if body.stream {
            http_request = http_request.header("accept", "text/event-stream");
        }

        let response = http_request
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::Request(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                body_len = body.len(),
                "Inference provider returned an error status"
            );
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl VideoAnalyzer for ChatCompletionsAnalyzer {
    fn model(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let body = ChatCompletionRequest::new(&self.model, &request, false);
        tracing::debug!(
            model = %self.model,
            media = request.media.kind(),
            focused = request.focus.is_some(),
            "Sending analysis request"
        );

        let response = self.send(&body).await?;
        let raw = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::Request(format!("failed to read response body: {e}")))?;
        let parsed: CompletionResponse = serde_json::from_slice(&raw)
            .map_err(|e| AnalysisError::ParseResponse(format!("invalid completion JSON: {e}")))?;

        let text = parsed.first_choice_text().ok_or(AnalysisError::EmptyResult)?;
        Ok(AnalysisResult::from_raw(&text))
    }

    async fn analyze_streaming(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisStream, AnalysisError> {
        let body = ChatCompletionRequest::new(&self.model, &request, true);
        tracing::debug!(
            model = %self.model,
            media = request.media.kind(),
            focused = request.focus.is_some(),
            "Sending streaming analysis request"
        );

        let response = self.send(&body).await?;
        Ok(AnalysisStream::new(response.bytes_stream()))
    }
}
