//! ggml Whisper engine.
//!
//! Real inference needs the `whisper` feature (whisper-rs, built with
//! cmake). Without it [`WhisperEngine::load`] always fails, so a slot never
//! serves the placeholder.

use crate::defaults;
use crate::error::{Result, SpeechError};
use crate::stt::transcriber::{TranscribeOptions, Transcriber};
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

#[cfg(feature = "whisper")]
static QUIET_WHISPER_CPP: Once = Once::new();

/// How a model file is loaded and run.
#[derive(Debug, Clone)]
pub struct WhisperSettings {
    pub model_path: PathBuf,
    /// Language used when a request gives none; `auto` detects.
    pub language: String,
    /// Inference threads; `None` lets whisper.cpp decide.
    pub threads: Option<usize>,
    pub use_gpu: bool,
}

impl WhisperSettings {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            language: defaults::AUTO_LANGUAGE.to_string(),
            threads: None,
            use_gpu: true,
        }
    }

    /// Catalog-style name of the model file (`ggml-small.en.bin` → `small.en`).
    pub fn model_name(&self) -> String {
        display_name(&self.model_path)
    }
}

fn display_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    stem.strip_prefix("ggml-").unwrap_or(stem).to_string()
}

fn require_file(settings: &WhisperSettings) -> Result<()> {
    if settings.model_path.is_file() {
        return Ok(());
    }
    Err(SpeechError::LoadFailed {
        model: settings.model_path.display().to_string(),
        message: "model file not found".to_string(),
    })
}

/// Scale i16 PCM into the [-1.0, 1.0) floats whisper.cpp expects.
pub fn samples_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

/// A loaded Whisper model. Each call runs on its own decoder state, so one
/// engine serves concurrent requests.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: WhisperContext,
    settings: WhisperSettings,
    name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "whisper")]
impl WhisperEngine {
    /// Read the model file into a whisper.cpp context. Blocking.
    pub fn load(settings: WhisperSettings) -> Result<Self> {
        QUIET_WHISPER_CPP.call_once(whisper_rs::install_logging_hooks);
        require_file(&settings)?;
        let name = settings.model_name();
        let load_failed = |message: String| SpeechError::LoadFailed {
            model: name.clone(),
            message,
        };

        let path = settings
            .model_path
            .to_str()
            .ok_or_else(|| load_failed("model path is not valid UTF-8".to_string()))?;
        let mut params = WhisperContextParameters::default();
        params.use_gpu(settings.use_gpu);
        params.flash_attn(true);
        let context = WhisperContext::new_with_params(path, params)
            .map_err(|e| load_failed(format!("whisper.cpp rejected the model: {}", e)))?;

        tracing::info!(model = %name, gpu = settings.use_gpu, "Whisper engine ready");
        Ok(Self {
            context,
            settings,
            name,
        })
    }

    fn run(&self, audio: &[f32], options: &TranscribeOptions) -> Result<String> {
        let failed = |what: &str, e: whisper_rs::WhisperError| SpeechError::Transcription {
            message: format!("{what}: {e}"),
        };
        let mut state = self
            .context
            .create_state()
            .map_err(|e| failed("cannot create decoder state", e))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let language = options
            .language
            .as_deref()
            .unwrap_or(&self.settings.language);
        params.set_language(match language {
            "" | defaults::AUTO_LANGUAGE => None,
            code => Some(code),
        });
        if let Some(prompt) = options.prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }
        if let Some(temperature) = options.temperature {
            params.set_temperature(temperature);
        }
        if let Some(threads) = self.settings.threads {
            params.set_n_threads(i32::try_from(threads).unwrap_or(i32::MAX));
        }
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);

        state
            .full(params, audio)
            .map_err(|e| failed("inference failed", e))?;

        let text: String = state.as_iter().map(|segment| segment.to_string()).collect();
        Ok(text.trim().to_string())
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperEngine {
    fn transcribe(&self, audio: &[i16], options: &TranscribeOptions) -> Result<String> {
        self.run(&samples_to_f32(audio), options)
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Stand-in when built without the `whisper` feature.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperEngine {
    name: String,
}

#[cfg(not(feature = "whisper"))]
impl WhisperEngine {
    pub fn load(settings: WhisperSettings) -> Result<Self> {
        require_file(&settings)?;
        Err(SpeechError::LoadFailed {
            model: settings.model_name(),
            message: "built without the `whisper` feature; rebuild with --features whisper"
                .to_string(),
        })
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperEngine {
    fn transcribe(&self, _audio: &[i16], _options: &TranscribeOptions) -> Result<String> {
        Err(SpeechError::Transcription {
            message: format!("{} cannot run without the `whisper` feature", self.name),
        })
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
