use crate::engine::EngineFactory;
use crate::error::Result;
use crate::slots::slot::{ModelSlot, PinnedHandle, SwapTicket};
use crate::slots::{ModelKind, ModelSpec, SlotStatus};
use crate::stt::transcriber::Transcriber;
use crate::tts::synthesizer::Synthesizer;
use std::sync::Arc;
use std::time::Duration;

/// The two model slots of the server and the factory that fills them.
pub struct SlotManager {
    stt: Arc<ModelSlot<dyn Transcriber>>,
    tts: Arc<ModelSlot<dyn Synthesizer>>,
    factory: Arc<dyn EngineFactory>,
    load_timeout: Duration,
}

impl SlotManager {
    pub fn new(factory: Arc<dyn EngineFactory>, load_timeout: Duration) -> Self {
        Self {
            stt: Arc::new(ModelSlot::new(ModelKind::Stt)),
            tts: Arc::new(ModelSlot::new(ModelKind::Tts)),
            factory,
            load_timeout,
        }
    }

    /// Pin the serving STT engine for one request.
    pub fn acquire_stt(&self) -> Result<PinnedHandle<dyn Transcriber>> {
        self.stt.acquire()
    }

    /// Pin the serving TTS engine for one request.
    pub fn acquire_tts(&self) -> Result<PinnedHandle<dyn Synthesizer>> {
        self.tts.acquire()
    }

    /// Start replacing the STT engine with `spec` (variant = compute type).
    pub fn begin_stt_swap(&self, spec: ModelSpec) -> Result<SwapTicket> {
        let factory = Arc::clone(&self.factory);
        self.stt.begin_swap(spec, self.load_timeout, move |spec| async move {
            factory.load_transcriber(&spec).await
        })
    }

    /// Start replacing the TTS engine with `spec` (variant = language code).
    pub fn begin_tts_swap(&self, spec: ModelSpec) -> Result<SwapTicket> {
        let factory = Arc::clone(&self.factory);
        self.tts.begin_swap(spec, self.load_timeout, move |spec| async move {
            factory.load_synthesizer(&spec).await
        })
    }

    pub fn begin_swap(&self, kind: ModelKind, spec: ModelSpec) -> Result<SwapTicket> {
        match kind {
            ModelKind::Stt => self.begin_stt_swap(spec),
            ModelKind::Tts => self.begin_tts_swap(spec),
        }
    }

    pub fn status(&self, kind: ModelKind) -> SlotStatus {
        match kind {
            ModelKind::Stt => self.stt.status(),
            ModelKind::Tts => self.tts.status(),
        }
    }

    pub fn stt_slot(&self) -> &Arc<ModelSlot<dyn Transcriber>> {
        &self.stt
    }

    pub fn tts_slot(&self) -> &Arc<ModelSlot<dyn Synthesizer>> {
        &self.tts
    }
}

impl std::fmt::Debug for SlotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotManager")
            .field("stt", &self.stt.current_model_id())
            .field("tts", &self.tts.current_model_id())
            .field("load_timeout", &self.load_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockEngineFactory;
    use crate::error::SpeechError;
    use crate::slots::SlotState;
    use crate::stt::transcriber::TranscribeOptions;

    fn manager(factory: MockEngineFactory) -> SlotManager {
        SlotManager::new(Arc::new(factory), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_slots_start_unloaded() {
        let slots = manager(MockEngineFactory::new());
        assert_eq!(slots.status(ModelKind::Stt).state, SlotState::Unloaded);
        assert_eq!(slots.status(ModelKind::Tts).state, SlotState::Unloaded);
        assert!(matches!(
            slots.acquire_tts(),
            Err(SpeechError::ModelNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn test_swaps_fill_each_slot_independently() {
        let slots = manager(MockEngineFactory::new());
        let outcome = slots
            .begin_stt_swap(ModelSpec::new("tiny", "int8"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(outcome.kind, ModelKind::Stt);
        assert_eq!(outcome.version, 1);

        let stt = slots.acquire_stt().unwrap();
        assert_eq!(stt.model_id(), "tiny");
        assert_eq!(
            stt.transcribe(&[0; 160], &TranscribeOptions::default()).unwrap(),
            "mock transcription"
        );
        assert!(slots.acquire_tts().is_err());

        slots
            .begin_swap(ModelKind::Tts, ModelSpec::new("espeak-ng", "a"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(slots.acquire_tts().unwrap().sample_rate(), 24000);
    }

    #[tokio::test]
    async fn test_failed_load_reports_factory_error() {
        let factory = MockEngineFactory::new();
        factory.fail_model("bogus");
        let slots = manager(factory);

        let err = slots
            .begin_tts_swap(ModelSpec::new("bogus", "a"))
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::LoadFailed { .. }));

        let status = slots.status(ModelKind::Tts);
        assert_eq!(status.state, SlotState::Failed);
        assert!(status.last_error.unwrap().contains("mock load failure"));
    }

    #[tokio::test]
    async fn test_debug_shows_loaded_models() {
        let slots = manager(MockEngineFactory::new());
        slots
            .begin_stt_swap(ModelSpec::new("base.en", "auto"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        let debug = format!("{:?}", slots);
        assert!(debug.contains("base.en"));
    }
}
