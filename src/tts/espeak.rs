//! espeak-ng backed synthesizer.
//!
//! Each call runs `espeak-ng --stdout`, parses the WAV it prints and
//! resamples to the pipeline rate.

use crate::audio::wav;
use crate::defaults;
use crate::error::{Result, SpeechError};
use crate::tts::synthesizer::Synthesizer;
use crate::tts::voices::{self, Gender};
use std::io::Write;
use std::process::{Command, Stdio};

const ESPEAK: &str = "espeak-ng";

/// espeak-ng speaking rate (words per minute) at speed 1.0.
const BASE_WPM: f32 = 175.0;
const MIN_WPM: f32 = 80.0;
const MAX_WPM: f32 = 450.0;

#[derive(Debug)]
pub struct EspeakSynthesizer {
    model_name: String,
    lang_code: char,
    sample_rate: u32,
}

impl EspeakSynthesizer {
    /// Probe the espeak-ng binary and bind the slot language.
    ///
    /// # Errors
    /// `LoadFailed` if the language code is unknown or espeak-ng is missing.
    pub fn new(lang_code: &str) -> Result<Self> {
        let load_failed = |message: String| SpeechError::LoadFailed {
            model: ESPEAK.to_string(),
            message,
        };

        let mut chars = lang_code.chars();
        let lang = match (chars.next(), chars.next()) {
            (Some(c), None) if voices::language_tag(c).is_some() => c,
            _ => return Err(load_failed(format!("unsupported lang_code '{}'", lang_code))),
        };

        let version = Command::new(ESPEAK)
            .arg("--version")
            .output()
            .map_err(|e| load_failed(format!("{} not available: {}", ESPEAK, e)))?;
        if !version.status.success() {
            return Err(load_failed(format!(
                "{} --version exited with {}",
                ESPEAK, version.status
            )));
        }
        tracing::info!(
            lang = %lang,
            version = %String::from_utf8_lossy(&version.stdout).trim(),
            "espeak-ng ready"
        );

        Ok(Self {
            model_name: ESPEAK.to_string(),
            lang_code: lang,
            sample_rate: defaults::TTS_SAMPLE_RATE,
        })
    }

    /// espeak voice argument for a request voice, e.g. `en-gb+f3`.
    pub fn espeak_voice(&self, voice: &str) -> Option<String> {
        let info = voices::parse(voice)?;
        let tag = voices::language_tag(info.lang.unwrap_or(self.lang_code))?;
        let variant = match info.gender {
            Gender::Female => "f3",
            Gender::Male => "m3",
        };
        Some(format!("{}+{}", tag, variant))
    }
}

/// Map a speed multiplier onto espeak's words-per-minute range.
///
/// espeak-ng only speaks between 80 and 450 wpm, roughly 0.46x to 2.57x;
/// [`residual_speed`] covers the rest of the range.
pub fn words_per_minute(speed: f32) -> u32 {
    (BASE_WPM * speed).clamp(MIN_WPM, MAX_WPM).round() as u32
}

/// The part of `speed` the wpm setting cannot express; 1.0 inside the range.
pub fn residual_speed(speed: f32) -> f32 {
    BASE_WPM * speed / words_per_minute(speed) as f32
}

/// Play `samples` back `factor` times faster by resampling. Pitch moves
/// with the rate.
fn change_playback_rate(samples: Vec<i16>, factor: f32, sample_rate: u32) -> Vec<i16> {
    if (factor - 1.0).abs() < 0.01 {
        return samples;
    }
    let from_rate = (sample_rate as f32 * factor).round() as u32;
    wav::resample(&samples, from_rate, sample_rate)
}

/// Speeds inside espeak's wpm range keep their pitch; beyond it the
/// remainder is applied as a playback-rate change, so duration still scales
/// as `1 / speed` across 0.25..=4.0.
impl Synthesizer for EspeakSynthesizer {
    fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<f32>> {
        let espeak_voice = self.espeak_voice(voice).ok_or_else(|| SpeechError::InvalidVoice {
            voice: voice.to_string(),
        })?;

        let mut child = Command::new(ESPEAK)
            .args(["--stdout", "--stdin", "-v", &espeak_voice])
            .args(["-s", &words_per_minute(speed).to_string()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SpeechError::Synthesis {
                message: format!("Failed to start {}: {}", ESPEAK, e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|e| SpeechError::Synthesis {
                    message: format!("Failed to write text to {}: {}", ESPEAK, e),
                })?;
        }

        let output = child.wait_with_output().map_err(|e| SpeechError::Synthesis {
            message: format!("{} failed: {}", ESPEAK, e),
        })?;
        if !output.status.success() {
            return Err(SpeechError::Synthesis {
                message: format!(
                    "{} exited with {}: {}",
                    ESPEAK,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let audio = wav::parse_wav(&output.stdout).map_err(|e| SpeechError::Synthesis {
            message: format!("Unreadable {} output: {}", ESPEAK, e),
        })?;
        let mono = audio.into_mono(self.sample_rate);
        let mono = change_playback_rate(mono, residual_speed(speed), self.sample_rate);
        Ok(wav::i16_to_f32(&mono))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn supports_voice(&self, voice: &str) -> bool {
        self.espeak_voice(voice).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn espeak_or_skip() -> Option<EspeakSynthesizer> {
        match EspeakSynthesizer::new("a") {
            Ok(synth) => Some(synth),
            Err(e) => {
                eprintln!("Skipping: {}", e);
                None
            }
        }
    }

    #[test]
    fn test_words_per_minute_scales_and_clamps() {
        assert_eq!(words_per_minute(1.0), 175);
        assert_eq!(words_per_minute(2.0), 350);
        assert_eq!(words_per_minute(0.25), 80);
        assert_eq!(words_per_minute(4.0), 450);
    }

    #[test]
    fn test_speed_is_linear_across_accepted_range() {
        for speed in [0.25f32, 0.4, 1.0, 2.0, 3.0, 4.0] {
            let effective = words_per_minute(speed) as f32 * residual_speed(speed);
            assert!(
                (effective - BASE_WPM * speed).abs() < 1e-3,
                "speed {speed}: effective {effective}"
            );
        }
        assert_eq!(residual_speed(1.0), 1.0);
        assert_eq!(residual_speed(2.0), 1.0);
    }

    #[test]
    fn test_playback_rate_change_scales_duration() {
        let samples = vec![1000i16; 24000];
        let faster = change_playback_rate(samples.clone(), residual_speed(4.0), 24000);
        // 700 wpm wanted, 450 spoken: the rest is a 1.556x rate change
        let expected = 24000.0 * 450.0 / 700.0;
        assert!((faster.len() as f32 - expected).abs() < 2.0, "got {}", faster.len());

        let slower = change_playback_rate(samples.clone(), residual_speed(0.25), 24000);
        let expected = 24000.0 * 80.0 / 43.75;
        assert!((slower.len() as f32 - expected).abs() < 2.0, "got {}", slower.len());

        assert_eq!(change_playback_rate(samples, 1.0, 24000).len(), 24000);
    }

    #[test]
    fn test_rejects_unknown_lang_code() {
        match EspeakSynthesizer::new("q") {
            Err(SpeechError::LoadFailed { message, .. }) => assert!(message.contains("'q'")),
            other => panic!("Expected LoadFailed, got {other:?}"),
        }
        assert!(EspeakSynthesizer::new("ab").is_err());
    }

    #[test]
    fn test_voice_mapping() {
        let synth = EspeakSynthesizer {
            model_name: ESPEAK.to_string(),
            lang_code: 'a',
            sample_rate: 24000,
        };
        assert_eq!(synth.espeak_voice("bf_emma").as_deref(), Some("en-gb+f3"));
        assert_eq!(synth.espeak_voice("onyx").as_deref(), Some("en-us+m3"));
        assert_eq!(synth.espeak_voice("robot"), None);
        assert!(!synth.supports_voice("robot"));
    }

    #[test]
    fn test_synthesizes_audio_when_installed() {
        let Some(synth) = espeak_or_skip() else {
            return;
        };
        let samples = synth.synthesize("Hello world.", "af_heart", 1.0).unwrap();
        // At least a quarter second of audio
        assert!(samples.len() > 6000, "got {} samples", samples.len());
    }

    #[test]
    fn test_faster_speed_is_shorter_when_installed() {
        let Some(synth) = espeak_or_skip() else {
            return;
        };
        let text = "The quick brown fox jumps over the lazy dog.";
        let normal = synth.synthesize(text, "am_adam", 1.0).unwrap();
        let fast = synth.synthesize(text, "am_adam", 2.0).unwrap();
        assert!(fast.len() < normal.len());
    }
}
