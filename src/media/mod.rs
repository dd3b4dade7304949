//! Media pipeline module
//!
//! Two stages, composed per request:
//!
//! - **Input normalization** ([`input`]): validates an uploaded file or a remote
//!   URL and produces one canonical [`MediaReference`].
//!   - Uploads are size-checked and embedded as `data:` URLs
//!   - URLs are checked syntactically only
//!   - A file always takes precedence over a URL
//!
//! - **Analysis relay** ([`analysis`], [`stream`]): builds the multimodal
//!   provider request and returns either a complete [`AnalysisResult`] or an
//!   [`AnalysisStream`] of raw provider bytes.
//!
//! # Example
//!
//! ```ignore
//! use reelsight::media::{AnalysisRequest, ChatCompletionsAnalyzer, InputNormalizer, VideoAnalyzer};
//!
//! let media = InputNormalizer::default().normalize(None, Some("https://example.com/clip.mp4"))?;
//! let analyzer = ChatCompletionsAnalyzer::new(api_key)?;
//! let result = analyzer.analyze(AnalysisRequest::new(media, None)).await?;
//!
//! println!("{}\n\n{}", result.summary, result.details);
//! ```

pub mod analysis;
pub mod input;
pub mod stream;

pub use analysis::{
    build_prompt, AnalysisError, AnalysisRequest, AnalysisResult, ChatCompletionsAnalyzer,
    CompletionResponse, VideoAnalyzer, DEFAULT_BASE_URL, DEFAULT_MODEL,
};
pub use input::{
    normalize_focus, InputError, InputNormalizer, MediaReference, UploadedFile,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_VIDEO_MIME_TYPE,
};
pub use stream::{AnalysisStream, SseDeltaDecoder, StreamFrame, StreamState};
