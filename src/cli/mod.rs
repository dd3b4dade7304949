//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `serve` (default) -- start the HTTP server
//! - `analyze` -- run a single analysis from the terminal
//! - `status` -- query a running instance's health endpoint
//! - `config show|path` -- inspect configuration
//! - `version` -- print build/version info

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::config::{self, Config};
use crate::media::{
    normalize_focus, AnalysisError, AnalysisRequest, ChatCompletionsAnalyzer, InputNormalizer,
    SseDeltaDecoder, StreamFrame, UploadedFile, VideoAnalyzer,
};

/// Video analysis relay for vision-capable chat models.
#[derive(Parser, Debug)]
#[command(
    name = "reelsight",
    version = env!("CARGO_PKG_VERSION"),
    about = "reelsight: short-form video analysis relay"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve {
        /// Port to listen on (default: from config or 8787).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind (default: from config or 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },

    /// Analyze one video and print the result.
    Analyze {
        /// Local video file. Takes precedence over --url.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Publicly reachable video URL.
        #[arg(short, long)]
        url: Option<String>,

        /// What the analysis should concentrate on.
        #[arg(long)]
        focus: Option<String>,

        /// Print model output incrementally as it arrives.
        #[arg(long)]
        stream: bool,
    },

    /// Query a running instance for health information.
    Status {
        /// Port of the running instance (default: from config or 8787).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host of the running instance.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration (secrets redacted) as JSON.
    Show,

    /// Print the resolved configuration file path.
    Path,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Secrets that should be redacted when printing config.
const SECRET_KEYS: &[&str] = &["apikey", "api_key", "token", "secret", "password"];

/// Apply `serve` flag overrides on top of the loaded configuration.
pub fn apply_serve_overrides(config: &mut Config, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
}

/// Run the `config show` subcommand.
pub fn handle_config_show(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let redacted = redact_secrets(serde_json::to_value(config)?);
    println!("{}", serde_json::to_string_pretty(&redacted)?);
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path() {
    println!("{}", config::get_config_path().display());
}

/// Run the `analyze` subcommand.
pub async fn handle_analyze(
    config: &Config,
    file: Option<&Path>,
    url: Option<&str>,
    focus: Option<&str>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(analyzer) = ChatCompletionsAnalyzer::from_config(&config.provider)? else {
        return Err(format!(
            "no provider API key configured; set {} or provider.apiKey in {}",
            config::API_KEY_ENV,
            config::get_config_path().display()
        )
        .into());
    };
    let analyzer: Arc<dyn VideoAnalyzer> = Arc::new(analyzer);

    let normalizer = InputNormalizer::new(
        config.media.max_upload_bytes,
        config.media.default_mime_type.clone(),
    );
    let upload = match file {
        Some(path) => Some(read_upload(path, &normalizer).await?),
        None => None,
    };
    let media = normalizer.normalize(upload, url)?;
    let request = AnalysisRequest::new(media, normalize_focus(focus));

    if stream {
        print_stream(analyzer.as_ref(), request).await
    } else {
        let result = analyzer.analyze(request).await?;
        println!("{}", result.summary);
        println!();
        println!("{}", result.details);
        Ok(())
    }
}

/// Read a local file into an upload, refusing oversize files before reading.
async fn read_upload(
    path: &Path,
    normalizer: &InputNormalizer,
) -> Result<UploadedFile, Box<dyn std::error::Error>> {
    let metadata = tokio::fs::metadata(path).await?;
    normalizer.check_size(metadata.len())?;

    let data = tokio::fs::read(path).await?;
    let mut upload = UploadedFile::new(data);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        upload = upload.with_file_name(name);
    }
    if let Some(mime) = mime_from_extension(path) {
        upload = upload.with_content_type(mime);
    }
    Ok(upload)
}

async fn print_stream(
    analyzer: &dyn VideoAnalyzer,
    request: AnalysisRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = analyzer.analyze_streaming(request).await?;
    let mut decoder = SseDeltaDecoder::new();
    let mut stdout = std::io::stdout();

    while let Some(chunk) = stream.next_chunk().await {
        let chunk = chunk?;
        print_frames(&mut stdout, decoder.feed(&chunk))?;
        if decoder.is_done() {
            break;
        }
    }
    print_frames(&mut stdout, decoder.finish())?;
    writeln!(stdout)?;
    Ok(())
}

fn print_frames(
    out: &mut impl Write,
    frames: Vec<StreamFrame>,
) -> Result<(), Box<dyn std::error::Error>> {
    for frame in frames {
        match frame {
            StreamFrame::Text(text) => {
                write!(out, "{text}")?;
                out.flush()?;
            }
            StreamFrame::Error(message) => {
                return Err(AnalysisError::StreamInterrupted(message).into());
            }
            StreamFrame::Done => {}
        }
    }
    Ok(())
}

/// Run the `status` subcommand -- connect to a running instance's health endpoint.
pub async fn handle_status(
    config: &Config,
    host: &str,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = port.unwrap_or(config.server.port);
    let url = format!("http://{}:{}/health", host, port);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let response = match client.get(&url).send().await {
        Ok(r) => r,
        Err(e) => {
            return Err(format!(
                "could not connect to reelsight at {host}:{port} ({e}); is the server running? \
                 Start it with: reelsight serve"
            )
            .into());
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("health endpoint returned HTTP {status}: {body}").into());
    }

    let body: Value = response.json().await?;

    println!("reelsight status");
    println!("================");
    if let Some(version) = body.get("version").and_then(|v| v.as_str()) {
        println!("  Version:  {}", version);
    }
    println!("  Address:  {}:{}", host, port);
    if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
        println!("  Status:   {}", status);
    }
    let configured = body
        .get("analyzerConfigured")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    println!(
        "  Analyzer: {}",
        if configured { "configured" } else { "missing API key" }
    );
    if let Some(model) = body.get("model").and_then(|v| v.as_str()) {
        println!("  Model:    {}", model);
    }

    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("reelsight {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("REELSIGHT_BUILD_DATE"));
    println!("  Git commit: {}", env!("REELSIGHT_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Guess a video MIME type from a file extension.
fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(mime)
}

/// Redact known secret keys in a JSON value (recursive).
fn redact_secrets(mut value: Value) -> Value {
    match &mut value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let lower = key.to_lowercase();
                if SECRET_KEYS.iter().any(|s| lower.contains(s)) {
                    *child = Value::String("[REDACTED]".to_string());
                } else {
                    *child = redact_secrets(child.take());
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                *item = redact_secrets(item.take());
            }
        }
        _ => {}
    }
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_no_args_defaults_to_none() {
        let cli = Cli::try_parse_from(["reelsight"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_serve_with_flags() {
        let cli =
            Cli::try_parse_from(["reelsight", "serve", "--port", "9000", "--host", "0.0.0.0"])
                .unwrap();
        match cli.command {
            Some(Command::Serve { port, host }) => {
                assert_eq!(port, Some(9000));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
            }
            other => panic!("expected Serve, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_analyze_file_and_focus() {
        let cli = Cli::try_parse_from([
            "reelsight",
            "analyze",
            "--file",
            "clip.mp4",
            "--focus",
            "hook strength",
            "--stream",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Analyze {
                file,
                url,
                focus,
                stream,
            }) => {
                assert_eq!(file, Some(PathBuf::from("clip.mp4")));
                assert!(url.is_none());
                assert_eq!(focus.as_deref(), Some("hook strength"));
                assert!(stream);
            }
            other => panic!("expected Analyze, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_analyze_url_short_flag() {
        let cli =
            Cli::try_parse_from(["reelsight", "analyze", "-u", "https://example.com/v.mp4"])
                .unwrap();
        match cli.command {
            Some(Command::Analyze { url, stream, .. }) => {
                assert_eq!(url.as_deref(), Some("https://example.com/v.mp4"));
                assert!(!stream);
            }
            other => panic!("expected Analyze, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_status_defaults() {
        let cli = Cli::try_parse_from(["reelsight", "status"]).unwrap();
        match cli.command {
            Some(Command::Status { port, host }) => {
                assert!(port.is_none());
                assert_eq!(host, "127.0.0.1");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_config_subcommands() {
        let cli = Cli::try_parse_from(["reelsight", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Config(ConfigCommand::Show))));
        let cli = Cli::try_parse_from(["reelsight", "config", "path"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Config(ConfigCommand::Path))));
    }

    #[test]
    fn test_cli_version_subcommand() {
        let cli = Cli::try_parse_from(["reelsight", "version"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Version)));
    }

    #[test]
    fn test_cli_unknown_subcommand_fails() {
        assert!(Cli::try_parse_from(["reelsight", "transcode"]).is_err());
    }

    #[test]
    fn test_apply_serve_overrides() {
        let mut config = Config::default();
        apply_serve_overrides(&mut config, None, Some(9100));
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        apply_serve_overrides(&mut config, Some("0.0.0.0".to_string()), None);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_redact_secrets() {
        let val = serde_json::json!({
            "provider": {
                "apiKey": "sk-or-abc123",
                "model": "google/gemini-2.5-flash"
            },
            "server": { "port": 8787 }
        });
        let redacted = redact_secrets(val);
        assert_eq!(redacted["provider"]["apiKey"], "[REDACTED]");
        assert_eq!(redacted["provider"]["model"], "google/gemini-2.5-flash");
        assert_eq!(redacted["server"]["port"], 8787);
    }

    #[test]
    fn test_redact_secrets_array() {
        let val = serde_json::json!([{"apiKey": "secret"}, {"safe": "ok"}]);
        let redacted = redact_secrets(val);
        assert_eq!(redacted[0]["apiKey"], "[REDACTED]");
        assert_eq!(redacted[1]["safe"], "ok");
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension(Path::new("a.MP4")), Some("video/mp4"));
        assert_eq!(mime_from_extension(Path::new("dir/b.mov")), Some("video/quicktime"));
        assert_eq!(mime_from_extension(Path::new("c.webm")), Some("video/webm"));
        assert_eq!(mime_from_extension(Path::new("notes.txt")), None);
        assert_eq!(mime_from_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_print_frames_writes_text_and_stops_on_error() {
        let mut out = Vec::new();
        print_frames(
            &mut out,
            vec![
                StreamFrame::Text("Hook".to_string()),
                StreamFrame::Text(" lands".to_string()),
                StreamFrame::Done,
            ],
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Hook lands");

        let mut out = Vec::new();
        let err = print_frames(&mut out, vec![StreamFrame::Error("quota".to_string())]);
        assert!(err.unwrap_err().to_string().contains("quota"));
    }

    #[tokio::test]
    async fn test_analyze_without_key_fails_fast() {
        let config = Config::default();
        let err = handle_analyze(&config, None, Some("https://example.com/v.mp4"), None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(config::API_KEY_ENV));
    }

    #[tokio::test]
    async fn test_read_upload_rejects_oversize_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; 16]).unwrap();

        let small = InputNormalizer::new(8, "video/mp4");
        assert!(read_upload(&path, &small).await.is_err());

        let upload = read_upload(&path, &InputNormalizer::default()).await.unwrap();
        assert_eq!(upload.len(), 16);
        assert_eq!(upload.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(upload.file_name.as_deref(), Some("clip.mp4"));
    }
}
