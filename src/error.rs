//! Error types for voxserve.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeechError {
    // Model lifecycle errors
    #[error("{kind} model is not loaded")]
    ModelNotReady { kind: String },

    #[error("A {kind} model swap is already in progress (loading {model})")]
    SwapInProgress { kind: String, model: String },

    #[error("Failed to load model {model}: {message}")]
    LoadFailed { model: String, message: String },

    // Request validation errors
    #[error("Unsupported response format: {format}. Supported formats: mp3, opus, aac, flac, wav, pcm")]
    UnsupportedFormat { format: String },

    #[error("{message}")]
    Validation {
        param: String,
        code: String,
        message: String,
    },

    #[error("Model '{model}' not found")]
    InvalidModel { model: String },

    #[error("Voice '{voice}' not found")]
    InvalidVoice { voice: String },

    #[error("Invalid audio: {message}")]
    InvalidAudio { message: String },

    #[error("Uploaded file exceeds the {limit_mb} MB limit")]
    PayloadTooLarge { limit_mb: usize },

    // Inference errors
    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    #[error("Audio encoding failed: {message}")]
    Encoding { message: String },

    #[error("Stream failed: {message}")]
    Stream { message: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl SpeechError {
    /// Build a validation error for a request field.
    pub fn validation(param: &str, code: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            param: param.to_string(),
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Whether the condition is transient and the caller may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ModelNotReady { .. } | Self::SwapInProgress { .. } | Self::Timeout { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SpeechError>;
