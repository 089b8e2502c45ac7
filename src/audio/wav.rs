//! WAV parsing and writing.
//!
//! Uploads are normalized to 16kHz mono i16 for the STT engine; synthesized
//! audio is written either as a finalized file or as a streaming header
//! followed by raw PCM.

use crate::defaults;
use crate::error::{Result, SpeechError};
use std::io::Cursor;

/// Size of the canonical PCM WAV header.
pub const WAV_HEADER_LEN: usize = 44;

/// Size placeholder for streams whose length is unknown up front.
const STREAMING_SIZE: u32 = 0xFFFF_FFFF;

/// Decoded PCM with its source layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmAudio {
    /// Playing time of the decoded frames.
    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        frames as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Downmix to mono and resample to `target_rate`.
    pub fn into_mono(self, target_rate: u32) -> Vec<i16> {
        let mono = downmix(&self.samples, self.channels);
        resample(&mono, self.sample_rate, target_rate)
    }
}

/// Parse WAV bytes into interleaved i16 samples.
///
/// Integer and float encodings are accepted. Files with placeholder sizes
/// (written by streaming producers) fall back to a lenient PCM16 reader.
pub fn parse_wav(bytes: &[u8]) -> Result<PcmAudio> {
    match parse_with_hound(bytes) {
        Ok(audio) => Ok(audio),
        Err(strict) => parse_pcm16_lenient(bytes).map_err(|_| strict),
    }
}

/// Accept only header rates in
/// `MIN_UPLOAD_SAMPLE_RATE..=MAX_UPLOAD_SAMPLE_RATE`.
pub fn check_sample_rate(rate: u32) -> Result<()> {
    let range = defaults::MIN_UPLOAD_SAMPLE_RATE..=defaults::MAX_UPLOAD_SAMPLE_RATE;
    if range.contains(&rate) {
        return Ok(());
    }
    Err(SpeechError::InvalidAudio {
        message: format!(
            "unsupported sample rate {} Hz (expected {}..={} Hz)",
            rate,
            range.start(),
            range.end()
        ),
    })
}

fn parse_with_hound(bytes: &[u8]) -> Result<PcmAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| SpeechError::InvalidAudio {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

    let spec = reader.spec();
    let read_error = |e: hound::Error| SpeechError::InvalidAudio {
        message: format!("Failed to read WAV samples: {}", e),
    };

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(f32_sample_to_i16))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
        (hound::SampleFormat::Int, bits) if bits <= 16 => reader
            .samples::<i16>()
            .map(|s| s.map(|v| if bits == 8 { v << 8 } else { v }))
            .collect::<std::result::Result<_, _>>()
            .map_err(read_error)?,
        (hound::SampleFormat::Int, bits) => {
            let shift = bits.saturating_sub(16) as u32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<_, _>>()
                .map_err(read_error)?
        }
    };

    if spec.channels == 0 {
        return Err(SpeechError::InvalidAudio {
            message: "WAV file declares zero channels".to_string(),
        });
    }

    Ok(PcmAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Read a 16-bit PCM WAV whose RIFF/data sizes may be placeholders.
pub fn parse_pcm16_lenient(bytes: &[u8]) -> Result<PcmAudio> {
    let invalid = |message: &str| SpeechError::InvalidAudio {
        message: message.to_string(),
    };

    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(invalid("missing RIFF/WAVE header"));
    }

    let mut pos = 12;
    let mut format: Option<(u16, u32, u16)> = None;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let len = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]);
        let body = pos + 8;
        if id == b"fmt " {
            if body + 16 > bytes.len() {
                return Err(invalid("truncated fmt chunk"));
            }
            let channels = u16::from_le_bytes([bytes[body + 2], bytes[body + 3]]);
            let sample_rate = u32::from_le_bytes([
                bytes[body + 4],
                bytes[body + 5],
                bytes[body + 6],
                bytes[body + 7],
            ]);
            let bits = u16::from_le_bytes([bytes[body + 14], bytes[body + 15]]);
            format = Some((channels, sample_rate, bits));
        } else if id == b"data" {
            let (channels, sample_rate, bits) = format.ok_or_else(|| invalid("data before fmt"))?;
            if bits != 16 || channels == 0 {
                return Err(invalid("only 16-bit PCM is supported here"));
            }
            let end = body.saturating_add(len as usize).min(bytes.len());
            let samples = bytes[body..end]
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect();
            return Ok(PcmAudio {
                samples,
                sample_rate,
                channels,
            });
        }
        // Chunks are word aligned
        pos = body.saturating_add(len as usize + (len as usize & 1));
    }

    Err(invalid("no data chunk"))
}

/// Average interleaved channels into mono.
pub fn downmix(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx.min(samples.len() - 1)]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

/// Convert a float sample to i16, clamping to [-1.0, 1.0].
pub fn f32_sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_sample_to_i16(s)).collect()
}

pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Little-endian byte view of 16-bit samples.
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// 44-byte PCM16 header for a stream of unknown length.
pub fn streaming_header(sample_rate: u32, channels: u16) -> [u8; WAV_HEADER_LEN] {
    let bits_per_sample: u16 = 16;
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&STREAMING_SIZE.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&STREAMING_SIZE.to_le_bytes());
    header
}

/// Write a complete mono PCM16 WAV file with exact sizes.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let encoding_error = |e: hound::Error| SpeechError::Encoding {
        message: format!("WAV write failed: {}", e),
    };

    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encoding_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(encoding_error)?;
    }
    writer.finalize().map_err(encoding_error)?;
    Ok(cursor.into_inner())
}
