//! OpenAI-shaped error responses.

use crate::error::SpeechError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Error returned by handlers, rendered as
/// `{"error":{"message","type","param","code"}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub param: Option<String>,
    pub code: String,
}

impl ApiError {
    pub fn bad_request(param: &str, code: &str, msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            param: Some(param.to_string()),
            code: code.to_string(),
        }
    }

    pub fn error_type(&self) -> &'static str {
        if self.status.is_client_error() {
            "invalid_request_error"
        } else {
            "server_error"
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": self.error_type(),
                "param": self.param,
                "code": self.code,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<SpeechError> for ApiError {
    fn from(err: SpeechError) -> Self {
        let message = err.to_string();
        let (status, param, code) = match &err {
            SpeechError::ModelNotReady { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, None, "model_not_ready")
            }
            SpeechError::SwapInProgress { .. } => (StatusCode::CONFLICT, None, "swap_in_progress"),
            SpeechError::UnsupportedFormat { .. } => (
                StatusCode::BAD_REQUEST,
                Some("response_format"),
                "invalid_format",
            ),
            SpeechError::Validation { param, code, .. } => {
                return Self {
                    status: StatusCode::BAD_REQUEST,
                    message,
                    param: Some(param.clone()),
                    code: code.clone(),
                };
            }
            SpeechError::InvalidModel { .. } => {
                (StatusCode::BAD_REQUEST, Some("model"), "model_not_found")
            }
            SpeechError::InvalidVoice { .. } => {
                (StatusCode::BAD_REQUEST, Some("voice"), "voice_not_found")
            }
            SpeechError::InvalidAudio { .. } => {
                (StatusCode::BAD_REQUEST, Some("file"), "invalid_audio")
            }
            SpeechError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, Some("file"), "file_too_large")
            }
            SpeechError::LoadFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, None, "model_load_failed")
            }
            SpeechError::Synthesis { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, None, "synthesis_failed")
            }
            SpeechError::Transcription { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, None, "transcription_failed")
            }
            SpeechError::Stream { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None, "stream_error"),
            SpeechError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, None, "timeout"),
            SpeechError::Encoding { .. }
            | SpeechError::ConfigParse { .. }
            | SpeechError::Config(_)
            | SpeechError::Io(_)
            | SpeechError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, None, "server_error"),
        };

        if status.is_server_error() {
            tracing::error!(code, "Request failed: {}", message);
        } else {
            tracing::debug!(code, "Request rejected: {}", message);
        }

        Self {
            status,
            message,
            param: param.map(str::to_string),
            code: code.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(err: SpeechError) -> ApiError {
        ApiError::from(err)
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                SpeechError::ModelNotReady {
                    kind: "tts".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
                "model_not_ready",
            ),
            (
                SpeechError::SwapInProgress {
                    kind: "stt".into(),
                    model: "small".into(),
                },
                StatusCode::CONFLICT,
                "swap_in_progress",
            ),
            (
                SpeechError::UnsupportedFormat {
                    format: "ogg".into(),
                },
                StatusCode::BAD_REQUEST,
                "invalid_format",
            ),
            (
                SpeechError::LoadFailed {
                    model: "x".into(),
                    message: "y".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "model_load_failed",
            ),
            (
                SpeechError::Timeout {
                    operation: "Transcription".into(),
                    secs: 300,
                },
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
            ),
            (
                SpeechError::PayloadTooLarge { limit_mb: 50 },
                StatusCode::PAYLOAD_TOO_LARGE,
                "file_too_large",
            ),
        ];
        for (err, status, code) in cases {
            let api = api(err);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn test_validation_keeps_param_and_code() {
        let api = api(SpeechError::validation(
            "input",
            "empty_input",
            "Input text cannot be empty",
        ));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.param.as_deref(), Some("input"));
        assert_eq!(api.code, "empty_input");
        assert_eq!(api.message, "Input text cannot be empty");
        assert_eq!(api.error_type(), "invalid_request_error");
    }

    #[test]
    fn test_voice_error_names_param() {
        let api = api(SpeechError::InvalidVoice {
            voice: "robot".into(),
        });
        assert_eq!(api.param.as_deref(), Some("voice"));
        assert_eq!(api.code, "voice_not_found");
    }

    #[test]
    fn test_server_errors_use_server_error_type() {
        let api = api(SpeechError::Other("boom".into()));
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.error_type(), "server_error");
    }
}
