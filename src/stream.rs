//! Wire framing for synthesized audio.
//!
//! The same [`FrameStream`] can be returned as one buffer, forwarded as a
//! chunked body, or wrapped as Server-Sent Events. Streaming bodies own
//! the frame stream, so dropping the body (client disconnect) drops the
//! encoder and cancels synthesis for that request only.

use crate::audio::encoder::FrameStream;
use crate::error::{Result, SpeechError};
use axum::body::Bytes;
use base64::Engine;
use futures_util::Stream;
use serde::Serialize;
use std::convert::Infallible;

/// How the response body is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// One body once all audio is encoded.
    Complete,
    /// Audio bytes forwarded as they are encoded.
    Chunked,
    /// `text/event-stream` with base64 deltas.
    Sse,
}

impl TransportMode {
    /// Map the `stream_format` request field.
    pub fn from_request(stream_format: Option<&str>) -> Result<Self> {
        match stream_format {
            None => Ok(TransportMode::Complete),
            Some("audio") => Ok(TransportMode::Chunked),
            Some("sse") => Ok(TransportMode::Sse),
            Some(other) => Err(SpeechError::validation(
                "stream_format",
                "invalid_stream_format",
                format!("Unsupported stream_format '{}'. Use 'audio' or 'sse'", other),
            )),
        }
    }

    pub fn is_streaming(self) -> bool {
        self != TransportMode::Complete
    }
}

/// Concatenate every frame into one buffer.
pub async fn collect_complete(mut frames: FrameStream) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(frame) = frames.next().await {
        body.extend(frame?.bytes);
    }
    Ok(body)
}

/// Forward frames as they are produced.
///
/// A failure ends the body with an error so the transfer is aborted rather
/// than terminated cleanly.
pub fn chunked_body(
    mut frames: FrameStream,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    async_stream::stream! {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => {
                    if !frame.bytes.is_empty() {
                        yield Ok::<Bytes, std::io::Error>(Bytes::from(frame.bytes));
                    }
                }
                Err(e) => {
                    tracing::error!("Audio stream failed: {}", e);
                    yield Err(std::io::Error::other(e.to_string()));
                    break;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Character-count usage for an input of `input_chars` characters.
    pub fn for_input(input_chars: usize) -> Self {
        Self {
            input_tokens: input_chars,
            output_tokens: input_chars,
            total_tokens: input_chars * 2,
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamFailure {
    message: String,
    code: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum SseEvent {
    #[serde(rename = "speech.audio.delta")]
    Delta { index: usize, audio: String },
    #[serde(rename = "speech.audio.done")]
    Done { usage: Usage },
    #[serde(rename = "error")]
    Error { error: StreamFailure },
}

impl SseEvent {
    fn to_data(&self) -> String {
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("data: {payload}\n\n")
    }
}

/// Wrap frames as SSE: one delta per frame with strictly increasing
/// `index`, then exactly one terminal event (done or error).
pub fn sse_body(
    mut frames: FrameStream,
    usage: Usage,
) -> impl Stream<Item = std::result::Result<String, Infallible>> + Send + 'static {
    async_stream::stream! {
        let mut index = 0;
        loop {
            match frames.next().await {
                Some(Ok(frame)) => {
                    if !frame.bytes.is_empty() {
                        let audio = base64::engine::general_purpose::STANDARD.encode(&frame.bytes);
                        yield Ok::<_, Infallible>(SseEvent::Delta { index, audio }.to_data());
                        index += 1;
                    }
                }
                Some(Err(e)) => {
                    tracing::error!("SSE audio stream failed: {}", e);
                    let error = StreamFailure {
                        message: e.to_string(),
                        code: "stream_error",
                    };
                    yield Ok(SseEvent::Error { error }.to_data());
                    break;
                }
                None => {
                    yield Ok(SseEvent::Done { usage }.to_data());
                    break;
                }
            }
        }
    }
}
