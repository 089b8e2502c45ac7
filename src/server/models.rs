//! Model listing and hot-swap endpoints.

use crate::defaults;
use crate::error::SpeechError;
use crate::server::{ApiError, AppState};
use crate::slots::{ModelKind, ModelSpec, SlotStatus};
use crate::tts::voices;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Deserialize)]
pub struct SttDownloadRequest {
    pub model_id: String,
    #[serde(default)]
    pub compute_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TtsDownloadRequest {
    pub lang_code: String,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub message: String,
    pub model_id: String,
    pub version: u64,
    /// False when the model was already serving.
    pub reloaded: bool,
    pub status: SlotStatus,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelObject>,
}

#[derive(Debug, Serialize)]
pub struct ModelObject {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
    /// `stt` or `tts`.
    pub kind: ModelKind,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::bad_request("body", "invalid_json", e.body_text()))
}

fn validate_stt(req: &SttDownloadRequest) -> Result<ModelSpec, SpeechError> {
    let model_id = req.model_id.trim();
    if model_id.is_empty() {
        return Err(SpeechError::validation(
            "model_id",
            "invalid_model_id",
            "model_id cannot be empty",
        ));
    }
    let compute_type = req
        .compute_type
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(defaults::DEFAULT_COMPUTE_TYPE);
    if !defaults::COMPUTE_TYPES.contains(&compute_type) {
        return Err(SpeechError::validation(
            "compute_type",
            "invalid_compute_type",
            format!(
                "Invalid compute_type '{}'. Expected one of: {}",
                compute_type,
                defaults::COMPUTE_TYPES.join(", ")
            ),
        ));
    }
    Ok(ModelSpec::new(model_id, compute_type))
}

fn validate_tts(req: &TtsDownloadRequest) -> Result<ModelSpec, SpeechError> {
    let lang_code = req.lang_code.trim();
    let mut chars = lang_code.chars();
    let known = match (chars.next(), chars.next()) {
        (Some(code), None) => voices::language_tag(code).is_some(),
        _ => false,
    };
    if !known {
        let codes: Vec<String> = voices::LANGUAGES.iter().map(|(c, _)| c.to_string()).collect();
        return Err(SpeechError::validation(
            "lang_code",
            "invalid_lang_code",
            format!(
                "Invalid lang_code '{}'. Expected one of: {}",
                lang_code,
                codes.join(", ")
            ),
        ));
    }
    let model_id = req
        .model_id
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(defaults::DEFAULT_TTS_MODEL);
    Ok(ModelSpec::new(model_id, lang_code))
}

/// Swap `kind` to `spec` and wait for the load to finish.
async fn swap(state: &AppState, kind: ModelKind, spec: ModelSpec) -> Result<DownloadResponse, ApiError> {
    tracing::info!(%kind, model = %spec, "Model swap requested");
    let ticket = state.slots.begin_swap(kind, spec.clone())?;
    let outcome = ticket.wait().await?;

    let message = if outcome.reloaded {
        format!("Model '{}' ({}) loaded successfully.", outcome.model_id, spec.variant)
    } else {
        format!("Model '{}' ({}) is already loaded.", outcome.model_id, spec.variant)
    };
    Ok(DownloadResponse {
        message,
        model_id: outcome.model_id,
        version: outcome.version,
        reloaded: outcome.reloaded,
        status: state.slots.status(kind),
    })
}

pub async fn download_stt(
    State(state): State<AppState>,
    payload: Result<Json<SttDownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let spec = validate_stt(&json_body(payload)?)?;
    swap(&state, ModelKind::Stt, spec).await.map(Json)
}

pub async fn download_tts(
    State(state): State<AppState>,
    payload: Result<Json<TtsDownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let spec = validate_tts(&json_body(payload)?)?;
    swap(&state, ModelKind::Tts, spec).await.map(Json)
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let created = now_unix_secs();
    let data = [ModelKind::Stt, ModelKind::Tts]
        .into_iter()
        .filter_map(|kind| {
            let status = state.slots.status(kind);
            status.is_ready().then_some(status.model_id).flatten().map(|id| ModelObject {
                id,
                object: "model",
                created,
                owned_by: "voxserve",
                kind,
            })
        })
        .collect();

    Json(ModelList {
        object: "list",
        data,
    })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(err: SpeechError) -> String {
        match err {
            SpeechError::Validation { code, .. } => code,
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_stt_defaults_compute_type() {
        let spec = validate_stt(&SttDownloadRequest {
            model_id: " small.en ".to_string(),
            compute_type: None,
        })
        .unwrap();
        assert_eq!(spec, ModelSpec::new("small.en", "auto"));
    }

    #[test]
    fn test_stt_rejects_bad_compute_type_and_empty_id() {
        let err = validate_stt(&SttDownloadRequest {
            model_id: "small".to_string(),
            compute_type: Some("int4".to_string()),
        })
        .unwrap_err();
        assert_eq!(code(err), "invalid_compute_type");

        let err = validate_stt(&SttDownloadRequest {
            model_id: "  ".to_string(),
            compute_type: None,
        })
        .unwrap_err();
        assert_eq!(code(err), "invalid_model_id");
    }

    #[test]
    fn test_tts_defaults_model_and_checks_lang() {
        let spec = validate_tts(&TtsDownloadRequest {
            lang_code: "b".to_string(),
            model_id: None,
        })
        .unwrap();
        assert_eq!(spec, ModelSpec::new(defaults::DEFAULT_TTS_MODEL, "b"));

        for bad in ["", "x", "ab"] {
            let err = validate_tts(&TtsDownloadRequest {
                lang_code: bad.to_string(),
                model_id: None,
            })
            .unwrap_err();
            assert_eq!(code(err), "invalid_lang_code");
        }
    }
}
