//! Audio formats, encoding and upload decoding.

pub mod encoder;
pub mod ffmpeg;
pub mod format;
pub mod wav;

pub use encoder::{EncodedFrame, FrameEncoder, FrameStream, Framing, encoder_for};
pub use format::AudioFormat;

use crate::defaults;
use crate::error::{Result, SpeechError};

/// Decode an uploaded file to 16 kHz mono i16 for the STT engine.
///
/// WAV is parsed in-process; other containers go through ffmpeg when it
/// is installed.
///
/// # Errors
/// `InvalidAudio` when the bytes cannot be decoded, hold no samples, or
/// decode to more than `MAX_UPLOAD_DURATION_SECS` of audio.
pub async fn decode_upload(bytes: Vec<u8>) -> Result<Vec<i16>> {
    decode_within(bytes, defaults::MAX_UPLOAD_DURATION_SECS).await
}

async fn decode_within(bytes: Vec<u8>, max_secs: u64) -> Result<Vec<i16>> {
    if bytes.is_empty() {
        return Err(SpeechError::InvalidAudio {
            message: "uploaded file is empty".to_string(),
        });
    }

    if bytes.starts_with(b"RIFF") {
        match wav::parse_wav(&bytes) {
            Ok(audio) => {
                wav::check_sample_rate(audio.sample_rate)?;
                if audio.duration_secs() > max_secs as f64 {
                    return Err(too_long(max_secs));
                }
                let samples = audio.into_mono(defaults::STT_SAMPLE_RATE);
                if samples.is_empty() {
                    return Err(SpeechError::InvalidAudio {
                        message: "audio contains no samples".to_string(),
                    });
                }
                return Ok(samples);
            }
            Err(e) if !ffmpeg::ffmpeg_available() => return Err(e),
            Err(e) => tracing::debug!("WAV parse failed, trying ffmpeg: {}", e),
        }
    }

    let max_samples = max_secs as usize * defaults::STT_SAMPLE_RATE as usize;
    ffmpeg::decode_to_pcm16(bytes, defaults::STT_SAMPLE_RATE, max_samples).await
}

fn too_long(max_secs: u64) -> SpeechError {
    SpeechError::InvalidAudio {
        message: format!("audio is longer than {} seconds", max_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_wav_upload_resamples_to_16k() {
        let samples = vec![1000i16; 24000];
        let bytes = wav::encode_wav(&samples, 24000).unwrap();

        let decoded = decode_upload(bytes).await.unwrap();
        assert_eq!(decoded.len(), 16000);
        assert!(decoded.iter().all(|&s| (999..=1001).contains(&s)));
    }

    #[tokio::test]
    async fn test_decode_rejects_empty_upload() {
        match decode_upload(Vec::new()).await {
            Err(SpeechError::InvalidAudio { message }) => assert!(message.contains("empty")),
            other => panic!("Expected InvalidAudio, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        let result = decode_upload(b"definitely not audio".to_vec()).await;
        assert!(matches!(result, Err(SpeechError::InvalidAudio { .. })));
    }

    #[tokio::test]
    async fn test_decode_rejects_bogus_sample_rate() {
        // Claims 1 Hz: resampling to 16 kHz would expand it 16000 times
        let bytes = wav::encode_wav(&[100i16; 2000], 1).unwrap();
        match decode_upload(bytes).await {
            Err(SpeechError::InvalidAudio { message }) => assert!(message.contains("sample rate")),
            other => panic!("Expected InvalidAudio, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decode_rejects_overlong_wav() {
        let bytes = wav::encode_wav(&vec![0i16; 3 * 8000], 8000).unwrap();
        match decode_within(bytes, 2).await {
            Err(SpeechError::InvalidAudio { message }) => assert!(message.contains("longer")),
            other => panic!("Expected InvalidAudio, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decode_rejects_truncated_wav() {
        let result = decode_upload(b"RIFF\x00\x00\x00\x00WAVE".to_vec()).await;
        assert!(matches!(result, Err(SpeechError::InvalidAudio { .. })));
    }
}
