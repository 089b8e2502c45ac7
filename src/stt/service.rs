use crate::audio;
use crate::error::{Result, SpeechError};
use crate::slots::PinnedHandle;
use crate::stt::transcriber::{TranscribeOptions, Transcriber};
use serde::Serialize;
use std::time::Duration;

/// Text recognized from one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcript {
    pub text: String,
    /// Length of the decoded audio in seconds.
    pub duration_secs: f32,
    pub model: String,
}

/// Transcribe an uploaded audio file with the pinned STT engine.
///
/// The handle moves into the blocking worker, so it is released on every
/// exit path, including a timeout (once the worker returns).
///
/// # Errors
/// `InvalidAudio` for undecodable uploads, `Timeout` when the engine
/// exceeds `timeout`, or the engine's own error.
pub async fn transcribe(
    handle: PinnedHandle<dyn Transcriber>,
    bytes: Vec<u8>,
    options: TranscribeOptions,
    timeout: Duration,
) -> Result<Transcript> {
    let samples = audio::decode_upload(bytes).await?;
    let model = handle.model_id().to_string();
    let version = handle.version();
    let duration_secs = samples.len() as f32 / crate::defaults::STT_SAMPLE_RATE as f32;

    tracing::debug!(
        model = %model,
        version,
        samples = samples.len(),
        "Transcribing upload"
    );

    let work = tokio::task::spawn_blocking(move || handle.transcribe(&samples, &options));
    let text = match tokio::time::timeout(timeout, work).await {
        Ok(joined) => joined.map_err(|e| SpeechError::Transcription {
            message: format!("transcription worker failed: {}", e),
        })??,
        Err(_) => {
            tracing::warn!(model = %model, "Transcription timed out");
            return Err(SpeechError::Timeout {
                operation: "Transcription".to_string(),
                secs: timeout.as_secs(),
            });
        }
    };

    Ok(Transcript {
        text: text.trim().to_string(),
        duration_secs,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav;
    use crate::engine::MockEngineFactory;
    use crate::slots::{ModelKind, ModelSpec, SlotManager};
    use crate::stt::transcriber::MockTranscriber;
    use std::sync::Arc;

    async fn loaded(transcriber: MockTranscriber) -> SlotManager {
        let factory = MockEngineFactory::new().with_transcriber(transcriber);
        let slots = SlotManager::new(Arc::new(factory), Duration::from_secs(5));
        slots
            .begin_stt_swap(ModelSpec::new("base.en", "auto"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        slots
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn tone_wav() -> Vec<u8> {
        wav::encode_wav(&vec![500i16; 16000], 16000).unwrap()
    }

    #[tokio::test]
    async fn test_transcribes_and_trims() {
        let slots = loaded(MockTranscriber::new("m").with_response("  hello world \n")).await;
        let handle = slots.acquire_stt().unwrap();
        let text = transcribe(handle, tone_wav(), TranscribeOptions::default(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(text.text, "hello world");
        assert_eq!(text.model, "base.en");
        assert!((text.duration_secs - 1.0).abs() < 1e-3);
        assert_eq!(slots.status(ModelKind::Stt).in_flight, 0);
    }

    #[tokio::test]
    async fn test_passes_options_to_engine() {
        let slots = loaded(MockTranscriber::new("m").with_response("bonjour")).await;
        let options = TranscribeOptions {
            language: Some("fr".to_string()),
            ..TranscribeOptions::default()
        };
        let text = transcribe(slots.acquire_stt().unwrap(), tone_wav(), options, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(text.text, "[fr] bonjour");
    }

    #[tokio::test]
    async fn test_result_names_pinned_version_after_swap() {
        let slots = loaded(MockTranscriber::new("m")).await;
        let handle = slots.acquire_stt().unwrap();
        slots
            .begin_stt_swap(ModelSpec::new("small.en", "auto"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(slots.status(ModelKind::Stt).draining.len(), 1);

        let text = transcribe(handle, tone_wav(), TranscribeOptions::default(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(text.model, "base.en");
        assert!(slots.status(ModelKind::Stt).draining.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_audio_releases_handle() {
        let transcriber = MockTranscriber::new("m");
        let slots = loaded(transcriber.clone()).await;
        let result = transcribe(
            slots.acquire_stt().unwrap(),
            b"not audio at all".to_vec(),
            TranscribeOptions::default(),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(SpeechError::InvalidAudio { .. })));
        assert_eq!(transcriber.call_count(), 0);
        assert_eq!(slots.status(ModelKind::Stt).in_flight, 0);
    }

    #[tokio::test]
    async fn test_engine_failure_releases_handle() {
        let slots = loaded(MockTranscriber::new("m").with_failure()).await;
        let handle = slots.acquire_stt().unwrap();
        let result = transcribe(handle, tone_wav(), TranscribeOptions::default(), TIMEOUT).await;
        assert!(matches!(result, Err(SpeechError::Transcription { .. })));
        assert_eq!(slots.status(ModelKind::Stt).in_flight, 0);
    }

    #[tokio::test]
    async fn test_timeout() {
        let slots =
            loaded(MockTranscriber::new("m").with_delay(Duration::from_millis(300))).await;
        let result = transcribe(
            slots.acquire_stt().unwrap(),
            tone_wav(),
            TranscribeOptions::default(),
            Duration::from_millis(20),
        )
        .await;
        match result {
            Err(SpeechError::Timeout { operation, .. }) => assert_eq!(operation, "Transcription"),
            other => panic!("Expected Timeout, got {other:?}"),
        }

        // The worker still owns the handle until the engine call returns
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(slots.status(ModelKind::Stt).in_flight, 0);
    }
}
