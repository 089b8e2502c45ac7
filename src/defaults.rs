//! Default configuration constants for voxserve.
//!
//! Shared by the config layer, the HTTP handlers and the engines so every
//! limit has one source of truth.

/// Sample rate expected by the speech-to-text engine, in Hz.
pub const STT_SAMPLE_RATE: u32 = 16000;

/// Sample rate produced by the text-to-speech pipeline, in Hz.
pub const TTS_SAMPLE_RATE: u32 = 24000;

/// Default Whisper model name (ggml catalog name).
pub const DEFAULT_STT_MODEL: &str = "base.en";

/// Default compute type hint for the STT engine.
pub const DEFAULT_COMPUTE_TYPE: &str = "auto";

/// Compute types accepted for the STT engine.
pub const COMPUTE_TYPES: &[&str] = &["auto", "int8", "float16", "int8_float16", "float32"];

/// Default TTS engine identifier.
pub const DEFAULT_TTS_MODEL: &str = "espeak-ng";

/// Default TTS language code (American English).
pub const DEFAULT_TTS_LANG: &str = "a";

/// Default voice when a request does not name one.
pub const DEFAULT_VOICE: &str = "af_heart";

/// Accepted device overrides.
pub const DEVICES: &[&str] = &["cpu", "cuda"];

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Maximum number of characters accepted by `/v1/audio/speech`.
pub const MAX_INPUT_CHARS: usize = 4096;

/// Playback speed bounds for synthesis.
pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Upper bound on a single synthesis piece handed to the engine.
///
/// Short pieces reach the client sooner; long ones give the engine more
/// prosody context.
pub const CHUNK_MAX_CHARS: usize = 250;

/// Segments buffered between the synthesis worker and the encoder.
pub const SEGMENT_BUFFER: usize = 1;

/// Maximum upload size for transcription requests, in megabytes.
pub const MAX_UPLOAD_MB: usize = 50;

/// Sample rates accepted in uploaded WAV headers, in Hz.
pub const MIN_UPLOAD_SAMPLE_RATE: u32 = 8000;
pub const MAX_UPLOAD_SAMPLE_RATE: u32 = 384_000;

/// Longest audio a single transcription request may decode to, in seconds.
pub const MAX_UPLOAD_DURATION_SECS: u64 = 2 * 60 * 60;

/// Timeouts, in seconds.
pub const TRANSCRIPTION_TIMEOUT_SECS: u64 = 300;
pub const SYNTHESIS_TIMEOUT_SECS: u64 = 120;
pub const MODEL_LOAD_TIMEOUT_SECS: u64 = 600;

/// Encoder bitrates, in kbit/s.
pub const MP3_BITRATE_KBPS: u32 = 128;
pub const AAC_BITRATE_KBPS: u32 = 128;
pub const OPUS_BITRATE_KBPS: u32 = 96;

/// Default HTTP bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Concurrent inference requests allowed before callers queue.
pub const MAX_CONCURRENT_REQUESTS: usize = 100;

/// OpenAI model names accepted in place of the loaded TTS model id.
pub const TTS_MODEL_ALIASES: &[&str] = &["tts-1", "tts-1-hd", "gpt-4o-mini-tts"];

/// OpenAI model names accepted in place of the loaded STT model id.
pub const STT_MODEL_ALIASES: &[&str] = &["whisper-1", "gpt-4o-transcribe", "gpt-4o-mini-transcribe"];
