//! Streaming relay types.
//!
//! [`AnalysisStream`] is the relay side: a single-pass, pull-based sequence of
//! raw byte chunks read from the provider connection. It forwards chunks
//! opaquely and in order, ends cleanly on normal end-of-stream and yields one
//! [`AnalysisError::StreamInterrupted`] when the connection fails mid-stream.
//! Dropping (or [`cancel`](AnalysisStream::cancel)ling) it closes the upstream
//! connection.
//!
//! [`SseDeltaDecoder`] is the consumer side: it parses the forwarded bytes as
//! server-sent events and extracts the incremental text deltas. The relay never
//! uses it.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::Value;

use super::analysis::AnalysisError;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, AnalysisError>> + Send>>;

/// Lifecycle of an [`AnalysisStream`]; terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

/// Upstream byte stream forwarded to the consumer.
pub struct AnalysisStream {
    inner: Option<ByteStream>,
    state: StreamState,
    chunks: u64,
    bytes: u64,
}

impl fmt::Debug for AnalysisStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisStream")
            .field("state", &self.state)
            .field("chunks", &self.chunks)
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl AnalysisStream {
    /// Wrap an upstream body stream. Transport errors become
    /// [`AnalysisError::StreamInterrupted`].
    pub fn new<S, E>(upstream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display,
    {
        let inner = upstream.map(|item| {
            item.map_err(|e| AnalysisError::StreamInterrupted(e.to_string()))
        });
        Self {
            inner: Some(Box::pin(inner)),
            state: StreamState::Streaming,
            chunks: 0,
            bytes: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of chunks forwarded so far.
    pub fn chunks_forwarded(&self) -> u64 {
        self.chunks
    }

    /// Number of bytes forwarded so far.
    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes
    }

    /// Pull the next chunk. `None` once the stream has ended.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, AnalysisError>> {
        self.next().await
    }

    /// Stop reading and close the upstream connection.
    pub fn cancel(mut self) {
        self.close(StreamState::Cancelled);
    }

    fn close(&mut self, state: StreamState) {
        if self.inner.take().is_none() {
            return;
        }
        self.state = state;
        match state {
            StreamState::Errored => tracing::warn!(
                chunks = self.chunks,
                bytes = self.bytes,
                "Analysis stream interrupted"
            ),
            _ => tracing::debug!(
                state = ?state,
                chunks = self.chunks,
                bytes = self.bytes,
                "Analysis stream closed"
            ),
        }
    }
}

impl Drop for AnalysisStream {
    fn drop(&mut self) {
        // Dropped while still streaming: the consumer went away.
        self.close(StreamState::Cancelled);
    }
}

impl Stream for AnalysisStream {
    type Item = Result<Bytes, AnalysisError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.chunks += 1;
                this.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.close(StreamState::Errored);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.close(StreamState::Completed);
                Poll::Ready(None)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer-side decoding
// ---------------------------------------------------------------------------

/// One decoded unit of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Incremental output text.
    Text(String),
    /// Error event reported in-band by the provider.
    Error(String),
    /// End marker (`data: [DONE]`).
    Done,
}

/// Incremental parser for OpenAI-style server-sent events.
///
/// Bytes may be fed in arbitrary chunks; lines are only decoded once complete,
/// so events and UTF-8 sequences split across chunks are handled.
#[derive(Debug, Default)]
pub struct SseDeltaDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to contain no newline.
    scanned: usize,
    done: bool,
}

impl SseDeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk and return the frames completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            let line = self.buffer[start..=end].to_vec();
            self.push_line(&line, &mut frames);
            start = end + 1;
            search_from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        frames
    }

    /// Decode whatever is left once the byte stream has ended.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        self.scanned = 0;
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.push_line(&line, &mut frames);
        }
        frames
    }

    fn push_line(&mut self, line: &[u8], frames: &mut Vec<StreamFrame>) {
        if self.done {
            return;
        }
        let line = String::from_utf8_lossy(line);
        if let Some(frame) = decode_line(line.trim_end_matches(['\r', '\n'])) {
            if frame == StreamFrame::Done {
                self.done = true;
            }
            frames.push(frame);
        }
    }
}

/// Decode a single SSE line. Comments, blank lines and events without text
/// yield `None`.
fn decode_line(line: &str) -> Option<StreamFrame> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(StreamFrame::Done);
    }

    let event: Value = serde_json::from_str(data).ok()?;
    if let Some(err) = event.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Some(StreamFrame::Error(message));
    }

    event
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.is_empty())
        .map(|c| StreamFrame::Text(c.to_string()))
}
