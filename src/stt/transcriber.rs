use crate::error::{Result, SpeechError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Per-request transcription options (OpenAI form fields).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscribeOptions {
    /// ISO-639-1 language hint; `None` auto-detects.
    pub language: Option<String>,
    /// Text that conditions the decoder (spelling of names, prior context).
    pub prompt: Option<String>,
    /// Sampling temperature; `None` keeps the engine default.
    pub temperature: Option<f32>,
}

/// Trait for speech-to-text transcription.
///
/// Implementations are blocking; callers run them on a blocking worker.
pub trait Transcriber: Send + Sync {
    /// Transcribe audio samples to text.
    ///
    /// # Arguments
    /// * `audio` - Audio samples as 16-bit PCM at 16kHz mono
    /// * `options` - Language, prompt and temperature hints
    fn transcribe(&self, audio: &[i16], options: &TranscribeOptions) -> Result<String>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across requests.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[i16], options: &TranscribeOptions) -> Result<String> {
        (**self).transcribe(audio, options)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Block for `delay` inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of completed transcribe calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[i16], options: &TranscribeOptions) -> Result<String> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(SpeechError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }
        match &options.language {
            Some(lang) => Ok(format!("[{lang}] {}", self.response)),
            None => Ok(self.response.clone()),
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transcriber_returns_response() {
        let transcriber = MockTranscriber::new("test-model").with_response("Hello, this is a test");

        let audio = vec![0i16; 1000];
        let result = transcriber.transcribe(&audio, &TranscribeOptions::default());

        assert_eq!(result.unwrap(), "Hello, this is a test");
        assert_eq!(transcriber.call_count(), 1);
    }

    #[test]
    fn test_mock_transcriber_returns_error_when_configured() {
        let transcriber = MockTranscriber::new("test-model").with_failure();

        let result = transcriber.transcribe(&[0i16; 10], &TranscribeOptions::default());

        match result {
            Err(SpeechError::Transcription { message }) => {
                assert_eq!(message, "mock transcription failure");
            }
            _ => panic!("Expected Transcription error"),
        }
    }

    #[test]
    fn test_mock_transcriber_echoes_language_hint() {
        let transcriber = MockTranscriber::new("test-model").with_response("hola");
        let options = TranscribeOptions {
            language: Some("es".to_string()),
            ..TranscribeOptions::default()
        };

        let text = transcriber.transcribe(&[], &options).unwrap();
        assert_eq!(text, "[es] hola");
    }

    #[test]
    fn test_transcriber_trait_is_object_safe() {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(MockTranscriber::new("test-model").with_response("boxed test"));

        assert_eq!(transcriber.model_name(), "test-model");
        let result = transcriber.transcribe(&[0i16; 100], &TranscribeOptions::default());
        assert_eq!(result.unwrap(), "boxed test");
    }

    #[test]
    fn test_mock_clones_share_call_counter() {
        let transcriber = MockTranscriber::new("m");
        let clone = transcriber.clone();
        clone.transcribe(&[], &TranscribeOptions::default()).unwrap();
        assert_eq!(transcriber.call_count(), 1);
    }
}
