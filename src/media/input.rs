//! Input normalization for analysis requests.
//!
//! Turns the heterogeneous inputs of an analysis request (an uploaded file or a
//! remote URL) into a single [`MediaReference`]. Validation is purely local:
//! size and emptiness checks for uploads, syntactic checks for URLs. Whether a
//! remote URL is actually fetchable is left to the inference provider.

use std::borrow::Cow;

use base64::Engine;
use bytes::Bytes;
use thiserror::Error;

/// Default ceiling for uploaded videos (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// MIME type assumed when an upload does not declare one.
pub const DEFAULT_VIDEO_MIME_TYPE: &str = "video/mp4";

/// Validation failures detected before any outbound call is made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("provide either a video file or a video URL")]
    MissingInput,

    #[error("uploaded video file is empty")]
    EmptyFile,

    #[error("uploaded video is too large: {size} bytes (limit is {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    /// The request body hit the limit before the upload could be measured.
    #[error("request body exceeds the upload limit of {limit} bytes")]
    BodyTooLarge { limit: u64 },

    #[error("invalid video URL: {0}")]
    InvalidUrl(String),
}

/// The video to analyze, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    /// A remote video the provider fetches itself.
    Remote { url: String },
    /// An uploaded video carried inline.
    Embedded { mime_type: String, payload: Bytes },
}

impl MediaReference {
    /// Render the reference as the URL handed to the provider.
    ///
    /// Remote references are returned as-is. Embedded payloads are base64
    /// encoded in full into a `data:{mime};base64,{payload}` URL; there is no
    /// partial variant, which is why uploads are bounded by a size ceiling.
    pub fn to_url(&self) -> Cow<'_, str> {
        match self {
            MediaReference::Remote { url } => Cow::Borrowed(url.as_str()),
            MediaReference::Embedded { mime_type, payload } => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
                Cow::Owned(format!("data:{mime_type};base64,{encoded}"))
            }
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MediaReference::Remote { .. } => "remote",
            MediaReference::Embedded { .. } => "embedded",
        }
    }
}

/// A file received from the caller, fully buffered.
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            file_name: None,
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Validates request input and produces a [`MediaReference`].
#[derive(Debug, Clone)]
pub struct InputNormalizer {
    max_upload_bytes: u64,
    default_mime_type: String,
}

impl Default for InputNormalizer {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            default_mime_type: DEFAULT_VIDEO_MIME_TYPE.to_string(),
        }
    }
}

impl InputNormalizer {
    pub fn new(max_upload_bytes: u64, default_mime_type: impl Into<String>) -> Self {
        let default_mime_type = default_mime_type.into();
        Self {
            max_upload_bytes,
            default_mime_type: if default_mime_type.trim().is_empty() {
                DEFAULT_VIDEO_MIME_TYPE.to_string()
            } else {
                default_mime_type
            },
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Check a (possibly partial) upload length against the ceiling.
    ///
    /// Lengths at or above the ceiling are rejected.
    pub fn check_size(&self, size: u64) -> Result<(), InputError> {
        if size >= self.max_upload_bytes {
            return Err(InputError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Resolve the request input into a single media reference.
    ///
    /// A file always wins over a URL; when both are given the URL is ignored
    /// without being validated. Blank URL strings count as absent.
    pub fn normalize(
        &self,
        file: Option<UploadedFile>,
        url: Option<&str>,
    ) -> Result<MediaReference, InputError> {
        if let Some(file) = file {
            return self.embed(file);
        }

        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(raw) => parse_remote(raw),
            None => Err(InputError::MissingInput),
        }
    }

    fn embed(&self, file: UploadedFile) -> Result<MediaReference, InputError> {
        if file.is_empty() {
            return Err(InputError::EmptyFile);
        }
        self.check_size(file.len())?;

        let mime_type = file
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_mime_type)
            .to_string();

        Ok(MediaReference::Embedded {
            mime_type,
            payload: file.data,
        })
    }
}

/// Syntactic absolute-URL check; no scheme or reachability policy is applied.
fn parse_remote(raw: &str) -> Result<MediaReference, InputError> {
    url::Url::parse(raw).map_err(|e| InputError::InvalidUrl(format!("{raw}: {e}")))?;
    Ok(MediaReference::Remote {
        url: raw.to_string(),
    })
}

/// Trim the focus instruction; blank means "no focus".
pub fn normalize_focus(focus: Option<&str>) -> Option<String> {
    focus
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_data_url(url: &str) -> (String, Vec<u8>) {
        let rest = url.strip_prefix("data:").expect("data URL prefix");
        let (mime, encoded) = rest.split_once(";base64,").expect("base64 marker");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .expect("valid base64");
        (mime.to_string(), bytes)
    }

    fn small() -> InputNormalizer {
        InputNormalizer::new(16, "video/mp4")
    }

    // ==================== missing input ====================

    #[test]
    fn test_neither_file_nor_url() {
        let result = small().normalize(None, None);
        assert_eq!(result, Err(InputError::MissingInput));
    }

    #[test]
    fn test_blank_url_counts_as_missing() {
        let result = small().normalize(None, Some("   "));
        assert_eq!(result, Err(InputError::MissingInput));
    }

    // ==================== uploads ====================

    #[test]
    fn test_empty_file_rejected() {
        let result = small().normalize(Some(UploadedFile::new(Vec::new())), None);
        assert_eq!(result, Err(InputError::EmptyFile));
    }

    #[test]
    fn test_file_at_ceiling_rejected() {
        let file = UploadedFile::new(vec![0u8; 16]);
        let result = small().normalize(Some(file), None);
        assert_eq!(result, Err(InputError::TooLarge { size: 16, limit: 16 }));
    }

    #[test]
    fn test_file_above_ceiling_rejected() {
        let file = UploadedFile::new(vec![0u8; 40]);
        assert!(matches!(
            small().normalize(Some(file), None),
            Err(InputError::TooLarge { size: 40, .. })
        ));
    }

    #[test]
    fn test_file_below_ceiling_embedded_with_declared_type() {
        let file = UploadedFile::new(vec![1u8, 2, 3]).with_content_type("video/webm");
        let media = small().normalize(Some(file), None).unwrap();
        assert_eq!(
            media,
            MediaReference::Embedded {
                mime_type: "video/webm".to_string(),
                payload: Bytes::from_static(&[1, 2, 3]),
            }
        );
    }

    #[test]
    fn test_missing_content_type_defaults_to_video() {
        let file = UploadedFile::new(vec![9u8; 4]).with_content_type("  ");
        match small().normalize(Some(file), None).unwrap() {
            MediaReference::Embedded { mime_type, .. } => assert_eq!(mime_type, "video/mp4"),
            other => panic!("expected embedded media, got {other:?}"),
        }
    }

    #[test]
    fn test_embedded_payload_round_trips_through_data_url() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![0],
            vec![0xff; 15],
            (0u8..15).collect(),
            b"ftypisom".to_vec(),
        ];
        for payload in payloads {
            let file = UploadedFile::new(payload.clone()).with_content_type("video/quicktime");
            let media = small().normalize(Some(file), None).unwrap();
            let (mime, decoded) = decode_data_url(&media.to_url());
            assert_eq!(mime, "video/quicktime");
            assert_eq!(decoded, payload);
        }
    }

    // ==================== precedence ====================

    #[test]
    fn test_file_wins_over_valid_url() {
        let file = UploadedFile::new(vec![7u8; 3]);
        let media = small()
            .normalize(Some(file), Some("https://example.com/clip.mp4"))
            .unwrap();
        assert_eq!(media.kind(), "embedded");
    }

    #[test]
    fn test_file_wins_over_invalid_url_without_checking_it() {
        let file = UploadedFile::new(vec![7u8; 3]);
        let media = small().normalize(Some(file), Some("not a url")).unwrap();
        assert_eq!(media.kind(), "embedded");
    }

    #[test]
    fn test_file_errors_are_not_masked_by_url() {
        let result = small().normalize(
            Some(UploadedFile::new(Vec::new())),
            Some("https://example.com/clip.mp4"),
        );
        assert_eq!(result, Err(InputError::EmptyFile));
    }

    // ==================== URLs ====================

    #[test]
    fn test_invalid_urls_rejected() {
        for raw in ["not a url", "example.com/video.mp4", "/relative/path.mp4", "://missing"] {
            let result = small().normalize(None, Some(raw));
            assert!(
                matches!(result, Err(InputError::InvalidUrl(_))),
                "expected InvalidUrl for {raw:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_valid_url_becomes_remote() {
        let media = small()
            .normalize(None, Some("  https://cdn.example.com/match.mp4?t=10  "))
            .unwrap();
        assert_eq!(
            media,
            MediaReference::Remote {
                url: "https://cdn.example.com/match.mp4?t=10".to_string()
            }
        );
        assert_eq!(media.to_url(), "https://cdn.example.com/match.mp4?t=10");
    }

    #[test]
    fn test_url_scheme_is_not_restricted() {
        let media = small().normalize(None, Some("s3://bucket/key.mp4")).unwrap();
        assert_eq!(media.kind(), "remote");
    }

    // ==================== focus ====================

    #[test]
    fn test_normalize_focus() {
        assert_eq!(normalize_focus(None), None);
        assert_eq!(normalize_focus(Some("")), None);
        assert_eq!(normalize_focus(Some(" \n\t ")), None);
        assert_eq!(
            normalize_focus(Some("  analyze footwork ")),
            Some("analyze footwork".to_string())
        );
    }

    // ==================== construction ====================

    #[test]
    fn test_default_normalizer_limits() {
        let normalizer = InputNormalizer::default();
        assert_eq!(normalizer.max_upload_bytes(), 100 * 1024 * 1024);
        assert!(normalizer.check_size(100 * 1024 * 1024 - 1).is_ok());
        assert!(normalizer.check_size(100 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_blank_default_mime_falls_back() {
        let normalizer = InputNormalizer::new(16, "");
        let media = normalizer
            .normalize(Some(UploadedFile::new(vec![1u8])), None)
            .unwrap();
        assert!(media.to_url().starts_with("data:video/mp4;base64,"));
    }

    #[test]
    fn test_input_error_display() {
        assert_eq!(
            InputError::TooLarge { size: 20, limit: 10 }.to_string(),
            "uploaded video is too large: 20 bytes (limit is 10 bytes)"
        );
        assert_eq!(InputError::EmptyFile.to_string(), "uploaded video file is empty");
        assert_eq!(
            InputError::BodyTooLarge { limit: 10 }.to_string(),
            "request body exceeds the upload limit of 10 bytes"
        );
    }
}
