use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration, read from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub limits: LimitsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_concurrent_requests: usize,
    pub max_upload_mb: usize,
}

/// Whisper model loaded at startup and its decoding defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model: String,
    pub compute_type: String,
    pub language: String,
    pub threads: Option<usize>,
    /// Force inference onto "cpu" or "cuda"; `None` lets the engine decide.
    pub device: Option<String>,
    pub load_on_startup: bool,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub model: String,
    pub lang_code: String,
    pub default_voice: String,
    pub chunk_max_chars: usize,
    pub load_on_startup: bool,
}

/// Timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub transcription_timeout_secs: u64,
    pub synthesis_timeout_secs: u64,
    pub model_load_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            max_concurrent_requests: defaults::MAX_CONCURRENT_REQUESTS,
            max_upload_mb: defaults::MAX_UPLOAD_MB,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_STT_MODEL.to_string(),
            compute_type: defaults::DEFAULT_COMPUTE_TYPE.to_string(),
            language: defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
            device: None,
            load_on_startup: true,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_TTS_MODEL.to_string(),
            lang_code: defaults::DEFAULT_TTS_LANG.to_string(),
            default_voice: defaults::DEFAULT_VOICE.to_string(),
            chunk_max_chars: defaults::CHUNK_MAX_CHARS,
            load_on_startup: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            transcription_timeout_secs: defaults::TRANSCRIPTION_TIMEOUT_SECS,
            synthesis_timeout_secs: defaults::SYNTHESIS_TIMEOUT_SECS,
            model_load_timeout_secs: defaults::MODEL_LOAD_TIMEOUT_SECS,
        }
    }
}

impl LimitsConfig {
    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    pub fn model_load_timeout(&self) -> Duration {
        Duration::from_secs(self.model_load_timeout_secs)
    }
}

impl Config {
    /// Parse a TOML config file. Absent sections and keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Overlay deployment variables on top of the file values.
    ///
    /// Recognised variables:
    /// - STT_MODEL_NAME → stt.model
    /// - STT_COMPUTE_TYPE → stt.compute_type
    /// - DEVICE_OVERRIDE → stt.device
    /// - TTS_MODEL_NAME → tts.model
    /// - TTS_LANG_CODE → tts.lang_code
    /// - VOXSERVE_HOST → server.host
    /// - VOXSERVE_PORT → server.port
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(model) = non_empty_env("STT_MODEL_NAME") {
            self.stt.model = model;
        }

        if let Some(compute_type) = non_empty_env("STT_COMPUTE_TYPE") {
            self.stt.compute_type = compute_type;
        }

        if let Some(device) = non_empty_env("DEVICE_OVERRIDE") {
            self.stt.device = Some(device);
        }

        if let Some(model) = non_empty_env("TTS_MODEL_NAME") {
            self.tts.model = model;
        }

        if let Some(lang) = non_empty_env("TTS_LANG_CODE") {
            self.tts.lang_code = lang;
        }

        if let Some(host) = non_empty_env("VOXSERVE_HOST") {
            self.server.host = host;
        }

        if let Some(port) = non_empty_env("VOXSERVE_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid VOXSERVE_PORT='{}'", port),
            }
        }

        self
    }

    /// Check values that cannot be expressed in the type system.
    ///
    /// Returns human-readable warnings; none of them prevent startup.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !defaults::COMPUTE_TYPES.contains(&self.stt.compute_type.as_str()) {
            warnings.push(format!(
                "Invalid stt.compute_type '{}', expected one of: {}",
                self.stt.compute_type,
                defaults::COMPUTE_TYPES.join(", ")
            ));
        }

        if self.tts.lang_code.chars().count() != 1 {
            warnings.push(format!(
                "tts.lang_code should be a single character, got '{}'",
                self.tts.lang_code
            ));
        }

        if let Some(device) = &self.stt.device
            && !defaults::DEVICES.contains(&device.as_str())
        {
            warnings.push(format!(
                "Invalid device override '{}', expected 'cpu' or 'cuda'",
                device
            ));
        }

        if self.tts.chunk_max_chars == 0 {
            warnings.push("tts.chunk_max_chars must be positive".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            warnings.push("server.max_concurrent_requests must be positive".to_string());
        }

        warnings
    }

    /// `$XDG_CONFIG_HOME/voxserve/config.toml`.
    ///
    /// Returns ~/.config/voxserve/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("voxserve")
            .join("config.toml")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
