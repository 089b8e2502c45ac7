//! `POST /v1/audio/transcriptions`

use crate::defaults;
use crate::error::SpeechError;
use crate::server::{ApiError, AppState, check_model};
use crate::stt::TranscribeOptions;
use crate::stt::service::{self, Transcript};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Default)]
struct TranscriptionRequest {
    file: Option<Vec<u8>>,
    filename: Option<String>,
    model: Option<String>,
    language: Option<String>,
    prompt: Option<String>,
    temperature: Option<f32>,
    response_format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseFormat {
    Json,
    Text,
    VerboseJson,
}

impl ResponseFormat {
    fn parse(value: Option<&str>) -> Result<Self, SpeechError> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("json") => Ok(ResponseFormat::Json),
            Some("text") => Ok(ResponseFormat::Text),
            Some("verbose_json") => Ok(ResponseFormat::VerboseJson),
            Some(other) => Err(SpeechError::validation(
                "response_format",
                "invalid_format",
                format!(
                    "Unsupported response_format '{}'. Supported: json, text, verbose_json",
                    other
                ),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonTranscription {
    text: String,
}

#[derive(Debug, Serialize)]
struct VerboseTranscription {
    task: &'static str,
    language: Option<String>,
    duration: f32,
    model: String,
    text: String,
}

fn multipart_error(err: MultipartError, limit_mb: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return SpeechError::PayloadTooLarge { limit_mb }.into();
    }
    ApiError::bad_request("file", "invalid_multipart", err.body_text())
}

async fn read_text(
    field: axum::extract::multipart::Field<'_>,
    limit_mb: usize,
) -> Result<Option<String>, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|e| multipart_error(e, limit_mb))?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

async fn parse_request(
    mut multipart: Multipart,
    limit_mb: usize,
) -> Result<TranscriptionRequest, ApiError> {
    let mut out = TranscriptionRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit_mb))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                out.filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, limit_mb))?;
                out.file = Some(bytes.to_vec());
            }
            "model" => out.model = read_text(field, limit_mb).await?,
            "language" => out.language = read_text(field, limit_mb).await?,
            "prompt" => out.prompt = read_text(field, limit_mb).await?,
            "response_format" => out.response_format = read_text(field, limit_mb).await?,
            "temperature" => {
                if let Some(raw) = read_text(field, limit_mb).await? {
                    let value = raw.parse::<f32>().ok().filter(|t| (0.0..=1.0).contains(t));
                    out.temperature = Some(value.ok_or_else(|| {
                        ApiError::bad_request(
                            "temperature",
                            "invalid_temperature",
                            format!("temperature must be a number between 0 and 1, got '{}'", raw),
                        )
                    })?);
                }
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    Ok(out)
}

/// `auto` and empty mean "detect".
fn language_hint(requested: Option<String>, configured: &str) -> Option<String> {
    requested
        .or_else(|| Some(configured.to_string()))
        .filter(|l| !l.is_empty() && l != defaults::AUTO_LANGUAGE)
}

pub async fn transcriptions(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let limit_mb = state.config.server.max_upload_mb;
    let multipart = multipart
        .map_err(|e| ApiError::bad_request("file", "invalid_multipart", e.body_text()))?;
    let req = parse_request(multipart, limit_mb).await?;

    let file = req
        .file
        .ok_or_else(|| ApiError::bad_request("file", "missing_file", "Missing required 'file' field"))?;
    if file.len() > limit_mb * 1024 * 1024 {
        return Err(SpeechError::PayloadTooLarge { limit_mb }.into());
    }
    let format = ResponseFormat::parse(req.response_format.as_deref())?;

    let options = TranscribeOptions {
        language: language_hint(req.language, &state.config.stt.language),
        prompt: req.prompt,
        temperature: req.temperature,
    };
    let language = options.language.clone();

    tracing::info!(
        filename = req.filename.as_deref().unwrap_or("<unnamed>"),
        bytes = file.len(),
        language = language.as_deref().unwrap_or(defaults::AUTO_LANGUAGE),
        "Transcription request"
    );

    let _permit = state.acquire_permit().await?;
    let handle = state.slots.acquire_stt()?;
    check_model(req.model.as_deref(), handle.model_id(), defaults::STT_MODEL_ALIASES)?;
    let Transcript {
        text,
        duration_secs,
        model,
    } = service::transcribe(
        handle,
        file,
        options,
        state.config.limits.transcription_timeout(),
    )
    .await?;

    let response = match format {
        ResponseFormat::Json => Json(JsonTranscription { text }).into_response(),
        ResponseFormat::Text => {
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
        }
        ResponseFormat::VerboseJson => Json(VerboseTranscription {
            task: "transcribe",
            language,
            duration: duration_secs,
            model,
            text,
        })
        .into_response(),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_parsing() {
        assert_eq!(ResponseFormat::parse(None).unwrap(), ResponseFormat::Json);
        assert_eq!(
            ResponseFormat::parse(Some("TEXT")).unwrap(),
            ResponseFormat::Text
        );
        assert_eq!(
            ResponseFormat::parse(Some("verbose_json")).unwrap(),
            ResponseFormat::VerboseJson
        );
        match ResponseFormat::parse(Some("srt")) {
            Err(SpeechError::Validation { param, code, .. }) => {
                assert_eq!(param, "response_format");
                assert_eq!(code, "invalid_format");
            }
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_language_hint() {
        assert_eq!(language_hint(None, "auto"), None);
        assert_eq!(language_hint(None, "en").as_deref(), Some("en"));
        assert_eq!(
            language_hint(Some("fr".to_string()), "en").as_deref(),
            Some("fr")
        );
        assert_eq!(language_hint(Some("auto".to_string()), "en"), None);
    }
}
