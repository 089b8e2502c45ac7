use crate::defaults;
use crate::error::{Result, SpeechError};
use crate::tts::voices;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for text-to-speech synthesis.
///
/// Implementations are blocking; the chunker drives them from a blocking
/// worker, one text piece per call.
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` as mono f32 samples at [`Synthesizer::sample_rate`].
    ///
    /// `speed` is a playback-rate multiplier in `[0.25, 4.0]`; 2.0 yields
    /// roughly half the duration of 1.0.
    fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<f32>>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Whether `voice` can be passed to [`Synthesizer::synthesize`].
    fn supports_voice(&self, voice: &str) -> bool;
}

impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<f32>> {
        (**self).synthesize(text, voice, speed)
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn supports_voice(&self, voice: &str) -> bool {
        (**self).supports_voice(voice)
    }
}

/// Deterministic synthesizer for tests.
///
/// Produces `samples_per_char / speed` samples per input character, so
/// output length is a pure function of the text and speed.
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    model_name: String,
    sample_rate: u32,
    samples_per_char: usize,
    fail_on_call: Option<usize>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            sample_rate: defaults::TTS_SAMPLE_RATE,
            samples_per_char: 240,
            fail_on_call: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_samples_per_char(mut self, samples: usize) -> Self {
        self.samples_per_char = samples;
        self
    }

    /// Fail the `n`th call (zero-based).
    pub fn with_failure_on_call(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    /// Block for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of synthesize calls started so far, across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Samples produced for `text` at `speed`.
    pub fn expected_len(&self, text: &str, speed: f32) -> usize {
        ((text.chars().count() * self.samples_per_char) as f32 / speed).round() as usize
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str, _voice: &str, speed: f32) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_on_call == Some(call) {
            return Err(SpeechError::Synthesis {
                message: format!("mock synthesis failure on call {}", call),
            });
        }

        let len = self.expected_len(text, speed);
        let step = 2.0 * std::f32::consts::PI * 220.0 / self.sample_rate as f32;
        Ok((0..len).map(|i| 0.1 * (i as f32 * step).sin()).collect())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn supports_voice(&self, voice: &str) -> bool {
        voices::is_known_voice(voice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_length_scales_with_text_and_speed() {
        let synth = MockSynthesizer::new("mock");
        let normal = synth.synthesize("hello", "af_heart", 1.0).unwrap();
        let fast = synth.synthesize("hello", "af_heart", 2.0).unwrap();

        assert_eq!(normal.len(), 5 * 240);
        assert_eq!(fast.len(), normal.len() / 2);
        assert_eq!(synth.call_count(), 2);
    }

    #[test]
    fn test_mock_fails_on_configured_call() {
        let synth = MockSynthesizer::new("mock").with_failure_on_call(1);
        assert!(synth.synthesize("a", "alloy", 1.0).is_ok());
        match synth.synthesize("b", "alloy", 1.0) {
            Err(SpeechError::Synthesis { message }) => assert!(message.contains("call 1")),
            other => panic!("Expected Synthesis error, got {other:?}"),
        }
    }

    #[test]
    fn test_mock_voice_support() {
        let synth = MockSynthesizer::new("mock");
        assert!(synth.supports_voice("alloy"));
        assert!(synth.supports_voice("bf_emma"));
        assert!(!synth.supports_voice("robot"));
    }

    #[test]
    fn test_samples_stay_in_range() {
        let synth = MockSynthesizer::new("mock");
        let samples = synth.synthesize("range check", "alloy", 0.5).unwrap();
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_synthesizer_trait_is_object_safe() {
        let synth: Arc<dyn Synthesizer> = Arc::new(MockSynthesizer::new("boxed"));
        assert_eq!(synth.model_name(), "boxed");
        assert_eq!(synth.sample_rate(), 24000);
    }
}
