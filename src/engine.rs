//! Engine loading.
//!
//! A slot swap asks an [`EngineFactory`] for a fresh engine. The local
//! factory downloads Whisper models on demand and binds espeak-ng to a
//! language; the mock factory builds deterministic engines for tests.

use crate::config::SttConfig;
use crate::error::{Result, SpeechError};
use crate::models::{catalog, download};
use crate::slots::ModelSpec;
use crate::stt::transcriber::{MockTranscriber, Transcriber};
use crate::stt::whisper::{WhisperEngine, WhisperSettings};
use crate::tts::espeak::EspeakSynthesizer;
use crate::tts::synthesizer::{MockSynthesizer, Synthesizer};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// TTS model ids served by espeak-ng.
pub const ESPEAK_MODEL_IDS: &[&str] = &["espeak-ng", "espeak"];

/// Builds engines for slot swaps.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Load a speech-to-text engine. `spec.variant` is the compute type.
    async fn load_transcriber(&self, spec: &ModelSpec) -> Result<Arc<dyn Transcriber>>;

    /// Load a text-to-speech engine. `spec.variant` is the language code.
    async fn load_synthesizer(&self, spec: &ModelSpec) -> Result<Arc<dyn Synthesizer>>;
}

/// Loads Whisper (ggml) and espeak-ng engines on this machine.
#[derive(Debug, Clone)]
pub struct LocalEngineFactory {
    stt: SttConfig,
}

impl LocalEngineFactory {
    pub fn new(stt: SttConfig) -> Self {
        Self { stt }
    }

    fn use_gpu(&self) -> bool {
        self.stt.device.as_deref() != Some("cpu")
    }
}

/// Resolve a model id to a file: existing paths are used as-is, anything
/// else is resolved to a catalog name and installed.
async fn resolve_model_file(model_id: &str) -> Result<PathBuf> {
    let path = PathBuf::from(model_id);
    if path.is_absolute() || path.exists() {
        return Ok(path);
    }
    download::ensure_model(&catalog::resolve_name(model_id)).await
}

fn join_failed(model: &str, e: tokio::task::JoinError) -> SpeechError {
    SpeechError::LoadFailed {
        model: model.to_string(),
        message: format!("loader task failed: {}", e),
    }
}

#[async_trait]
impl EngineFactory for LocalEngineFactory {
    async fn load_transcriber(&self, spec: &ModelSpec) -> Result<Arc<dyn Transcriber>> {
        if !cfg!(feature = "whisper") {
            return Err(SpeechError::LoadFailed {
                model: spec.model_id.clone(),
                message: "built without the `whisper` feature; rebuild with --features whisper"
                    .to_string(),
            });
        }

        let model_path = resolve_model_file(&spec.model_id).await?;
        // ggml files carry their own quantization
        tracing::debug!(
            model = %spec.model_id,
            compute_type = %spec.variant,
            "Compute type recorded for status only"
        );

        let settings = WhisperSettings {
            model_path,
            language: self.stt.language.clone(),
            threads: self.stt.threads,
            use_gpu: self.use_gpu(),
        };
        let transcriber = tokio::task::spawn_blocking(move || WhisperEngine::load(settings))
        .await
        .map_err(|e| join_failed(&spec.model_id, e))??;

        Ok(Arc::new(transcriber))
    }

    async fn load_synthesizer(&self, spec: &ModelSpec) -> Result<Arc<dyn Synthesizer>> {
        if !ESPEAK_MODEL_IDS.contains(&spec.model_id.as_str()) {
            return Err(SpeechError::LoadFailed {
                model: spec.model_id.clone(),
                message: format!(
                    "unknown TTS model; available: {}",
                    ESPEAK_MODEL_IDS.join(", ")
                ),
            });
        }

        let lang_code = spec.variant.clone();
        let synthesizer = tokio::task::spawn_blocking(move || EspeakSynthesizer::new(&lang_code))
            .await
            .map_err(|e| join_failed(&spec.model_id, e))??;

        Ok(Arc::new(synthesizer))
    }
}

/// Factory producing mock engines, for tests and benchmarks.
///
/// Loads of ids registered with [`MockEngineFactory::fail_model`] fail with
/// `LoadFailed`; every load sleeps for the configured delay first.
#[derive(Debug, Clone, Default)]
pub struct MockEngineFactory {
    failing: Arc<Mutex<HashSet<String>>>,
    load_delay: Duration,
    loads: Arc<AtomicUsize>,
    synthesizer: Option<MockSynthesizer>,
    synthesizers_by_model: HashMap<String, MockSynthesizer>,
    transcriber: Option<MockTranscriber>,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Serve clones of `synthesizer` instead of a default mock.
    pub fn with_synthesizer(mut self, synthesizer: MockSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Serve clones of `synthesizer` for loads of `model_id` only.
    pub fn with_synthesizer_for(mut self, model_id: &str, synthesizer: MockSynthesizer) -> Self {
        self.synthesizers_by_model
            .insert(model_id.to_string(), synthesizer);
        self
    }

    /// Serve clones of `transcriber` instead of a default mock.
    pub fn with_transcriber(mut self, transcriber: MockTranscriber) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Make future loads of `model_id` fail.
    pub fn fail_model(&self, model_id: &str) {
        self.failing.lock().insert(model_id.to_string());
    }

    /// Number of loads started so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    async fn begin_load(&self, spec: &ModelSpec) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if self.failing.lock().contains(&spec.model_id) {
            return Err(SpeechError::LoadFailed {
                model: spec.model_id.clone(),
                message: "mock load failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn load_transcriber(&self, spec: &ModelSpec) -> Result<Arc<dyn Transcriber>> {
        self.begin_load(spec).await?;
        let transcriber = self
            .transcriber
            .clone()
            .unwrap_or_else(|| MockTranscriber::new(&spec.model_id));
        Ok(Arc::new(transcriber))
    }

    async fn load_synthesizer(&self, spec: &ModelSpec) -> Result<Arc<dyn Synthesizer>> {
        self.begin_load(spec).await?;
        let synthesizer = self
            .synthesizers_by_model
            .get(&spec.model_id)
            .or(self.synthesizer.as_ref())
            .cloned()
            .unwrap_or_else(|| MockSynthesizer::new(&spec.model_id));
        Ok(Arc::new(synthesizer))
    }
}
