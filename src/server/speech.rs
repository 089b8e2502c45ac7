//! `POST /v1/audio/speech`

use crate::audio::{self, AudioFormat, FrameStream, Framing};
use crate::defaults;
use crate::error::SpeechError;
use crate::server::{ApiError, AppState, check_model};
use crate::stream::{self, TransportMode, Usage};
use crate::tts::chunker::{self, SynthesisJob};
use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::OwnedSemaphorePermit;

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub input: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub response_format: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
    /// `audio` for a chunked body, `sse` for server-sent events.
    #[serde(default)]
    pub stream_format: Option<String>,
    /// Accepted for compatibility; no engine uses it.
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Request fields after validation.
#[derive(Debug, Clone, PartialEq)]
struct SpeechParams {
    input: String,
    speed: f32,
    format: AudioFormat,
    mode: TransportMode,
}

fn validate(req: &SpeechRequest) -> Result<SpeechParams, SpeechError> {
    if req.input.trim().is_empty() {
        return Err(SpeechError::validation(
            "input",
            "empty_input",
            "Input text cannot be empty",
        ));
    }
    if req.input.chars().count() > defaults::MAX_INPUT_CHARS {
        return Err(SpeechError::validation(
            "input",
            "context_length_exceeded",
            format!(
                "Input text exceeds maximum length of {} characters",
                defaults::MAX_INPUT_CHARS
            ),
        ));
    }

    let speed = req.speed.unwrap_or(1.0);
    if !(defaults::MIN_SPEED..=defaults::MAX_SPEED).contains(&speed) {
        return Err(SpeechError::validation(
            "speed",
            "invalid_speed",
            format!(
                "Speed must be between {} and {}",
                defaults::MIN_SPEED,
                defaults::MAX_SPEED
            ),
        ));
    }

    let format = match req.response_format.as_deref() {
        None => AudioFormat::Wav,
        Some(name) => name.parse()?,
    };
    let mode = TransportMode::from_request(req.stream_format.as_deref())?;

    Ok(SpeechParams {
        input: req.input.clone(),
        speed,
        format,
        mode,
    })
}

/// Keep `permit` alive until the body stream is dropped.
fn hold_permit<S>(
    body: S,
    permit: OwnedSemaphorePermit,
) -> impl Stream<Item = S::Item> + Send + 'static
where
    S: Stream + Send + 'static,
{
    body.map(move |item| {
        let _held = &permit;
        item
    })
}

pub async fn speech(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request("body", "invalid_json", e.body_text()))?;
    let params = validate(&req)?;
    if req.instructions.is_some() {
        tracing::debug!("Ignoring speech instructions");
    }

    let permit = state.acquire_permit().await?;
    let handle = state.slots.acquire_tts()?;
    check_model(
        req.model.as_deref(),
        handle.model_id(),
        defaults::TTS_MODEL_ALIASES,
    )?;

    let voice = req
        .voice
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(&state.config.tts.default_voice)
        .to_string();
    if !handle.supports_voice(&voice) {
        return Err(SpeechError::InvalidVoice { voice }.into());
    }

    let framing = if params.mode.is_streaming() {
        Framing::Progressive
    } else {
        Framing::Whole
    };
    let encoder = audio::encoder_for(params.format, handle.sample_rate(), framing)?;

    let request_id = uuid::Uuid::new_v4().to_string();
    let input_chars = params.input.chars().count();
    tracing::info!(
        request_id = %request_id,
        model = handle.model_id(),
        version = handle.version(),
        voice = %voice,
        format = %params.format,
        mode = ?params.mode,
        chars = input_chars,
        "Synthesizing speech"
    );

    let job = SynthesisJob {
        max_chars: state.config.tts.chunk_max_chars,
        timeout: Some(state.config.limits.synthesis_timeout()),
        ..SynthesisJob::new(params.input, voice, params.speed)
    };
    let segments = chunker::synthesize(handle, job);
    let frames = FrameStream::new(segments, encoder, params.format, framing);

    let response = match params.mode {
        TransportMode::Complete => {
            let bytes = stream::collect_complete(frames).await?;
            drop(permit);
            tracing::debug!(request_id = %request_id, bytes = bytes.len(), "Speech complete");
            (
                [
                    (header::CONTENT_TYPE, params.format.mime_type().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("inline; filename=\"speech.{}\"", params.format.extension()),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        TransportMode::Chunked => {
            let body = hold_permit(stream::chunked_body(frames), permit);
            (
                [
                    (header::CONTENT_TYPE, params.format.mime_type()),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                Body::from_stream(body),
            )
                .into_response()
        }
        TransportMode::Sse => {
            let body = hold_permit(
                stream::sse_body(frames, Usage::for_input(input_chars)),
                permit,
            );
            (
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                Body::from_stream(body),
            )
                .into_response()
        }
    };

    Ok(response)
}
