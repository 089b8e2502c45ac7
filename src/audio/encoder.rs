//! Segment-to-bytes encoding.
//!
//! A [`FrameStream`] pulls [`AudioSegment`]s in order and turns them into
//! [`EncodedFrame`]s. Streamable formats emit bytes as each segment
//! arrives; everything else is withheld until the final segment and
//! emitted as one frame.

use crate::audio::ffmpeg::{self, FfmpegProcess};
use crate::audio::format::AudioFormat;
use crate::audio::wav;
use crate::error::{Result, SpeechError};
use crate::tts::chunker::SegmentStream;
use async_trait::async_trait;

/// How output may be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Emit bytes per segment when the format allows it.
    Progressive,
    /// Always produce one finished buffer.
    Whole,
}

/// Incremental encoder for mono i16 PCM.
#[async_trait]
pub trait FrameEncoder: Send {
    /// Bytes that precede all audio, if the container has a fixed header.
    fn header(&self) -> Vec<u8>;

    /// Encode more samples, returning whatever output is ready.
    async fn push(&mut self, samples: &[i16]) -> Result<Vec<u8>>;

    /// Flush and return the remaining output. Called once, last.
    async fn finish(&mut self) -> Result<Vec<u8>>;

    /// Input sample rate in Hz.
    fn sample_rate(&self) -> u32;
}

/// Raw 16-bit little-endian PCM.
#[derive(Debug)]
pub struct PcmEncoder {
    sample_rate: u32,
}

impl PcmEncoder {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[async_trait]
impl FrameEncoder for PcmEncoder {
    fn header(&self) -> Vec<u8> {
        Vec::new()
    }

    async fn push(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        Ok(wav::pcm_bytes(samples))
    }

    async fn finish(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Mono PCM16 WAV.
///
/// Progressive output is a streaming header followed by raw PCM; whole
/// output is buffered and written with exact RIFF sizes.
#[derive(Debug)]
pub struct WavEncoder {
    sample_rate: u32,
    framing: Framing,
    buffered: Vec<i16>,
}

impl WavEncoder {
    pub fn new(sample_rate: u32, framing: Framing) -> Self {
        Self {
            sample_rate,
            framing,
            buffered: Vec::new(),
        }
    }
}

#[async_trait]
impl FrameEncoder for WavEncoder {
    fn header(&self) -> Vec<u8> {
        match self.framing {
            Framing::Progressive => wav::streaming_header(self.sample_rate, 1).to_vec(),
            Framing::Whole => Vec::new(),
        }
    }

    async fn push(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        match self.framing {
            Framing::Progressive => Ok(wav::pcm_bytes(samples)),
            Framing::Whole => {
                self.buffered.extend_from_slice(samples);
                Ok(Vec::new())
            }
        }
    }

    async fn finish(&mut self) -> Result<Vec<u8>> {
        match self.framing {
            Framing::Progressive => Ok(Vec::new()),
            Framing::Whole => wav::encode_wav(&std::mem::take(&mut self.buffered), self.sample_rate),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Compressed formats through an ffmpeg subprocess.
pub struct FfmpegEncoder {
    process: FfmpegProcess,
    sample_rate: u32,
}

impl FfmpegEncoder {
    pub fn spawn(format: AudioFormat, sample_rate: u32) -> Result<Self> {
        Ok(Self {
            process: FfmpegProcess::spawn_encoder(format, sample_rate)?,
            sample_rate,
        })
    }
}

#[async_trait]
impl FrameEncoder for FfmpegEncoder {
    fn header(&self) -> Vec<u8> {
        Vec::new()
    }

    async fn push(&mut self, samples: &[i16]) -> Result<Vec<u8>> {
        self.process.push(&wav::pcm_bytes(samples)).await
    }

    async fn finish(&mut self) -> Result<Vec<u8>> {
        self.process.finish().await
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Build the encoder for `format`.
///
/// # Errors
/// `Encoding` when the format needs ffmpeg and none is installed.
pub fn encoder_for(
    format: AudioFormat,
    sample_rate: u32,
    framing: Framing,
) -> Result<Box<dyn FrameEncoder>> {
    match format {
        AudioFormat::Pcm => Ok(Box::new(PcmEncoder::new(sample_rate))),
        AudioFormat::Wav => Ok(Box::new(WavEncoder::new(sample_rate, framing))),
        _ if !ffmpeg::ffmpeg_available() => Err(SpeechError::Encoding {
            message: format!("{} output requires ffmpeg, which is not installed", format),
        }),
        _ => Ok(Box::new(FfmpegEncoder::spawn(format, sample_rate)?)),
    }
}

/// Encoded bytes for one or more segments.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// Position among the frames of this response, starting at 0.
    pub index: usize,
    pub bytes: Vec<u8>,
    pub is_final: bool,
}

/// Ordered frames for one synthesis run.
pub struct FrameStream {
    segments: SegmentStream,
    encoder: Box<dyn FrameEncoder>,
    progressive: bool,
    pending_header: Option<Vec<u8>>,
    buffered: Vec<u8>,
    next_index: usize,
    done: bool,
}

impl FrameStream {
    /// Encode `segments` with `encoder`.
    ///
    /// Output is progressive only when `framing` asks for it and `format`
    /// is streamable.
    pub fn new(
        segments: SegmentStream,
        encoder: Box<dyn FrameEncoder>,
        format: AudioFormat,
        framing: Framing,
    ) -> Self {
        let progressive = framing == Framing::Progressive && format.streamable();
        let header = encoder.header();
        Self {
            segments,
            encoder,
            progressive,
            pending_header: (!header.is_empty()).then_some(header),
            buffered: Vec::new(),
            next_index: 0,
            done: false,
        }
    }

    /// Whether frames are released per segment.
    pub fn is_progressive(&self) -> bool {
        self.progressive
    }

    /// Next frame, or `None` after the final frame or an error.
    pub async fn next(&mut self) -> Option<Result<EncodedFrame>> {
        if self.done {
            return None;
        }
        match self.advance().await {
            Ok(frame) => Some(Ok(frame)),
            Err(e) => {
                self.done = true;
                self.segments.cancel();
                Some(Err(e))
            }
        }
    }

    async fn advance(&mut self) -> Result<EncodedFrame> {
        loop {
            let segment = match self.segments.next().await {
                Some(item) => item?,
                None => {
                    return Err(SpeechError::Stream {
                        message: "synthesis ended before the final segment".to_string(),
                    });
                }
            };
            if segment.sample_rate != self.encoder.sample_rate() {
                return Err(SpeechError::Stream {
                    message: format!(
                        "segment sample rate {} does not match encoder rate {}",
                        segment.sample_rate,
                        self.encoder.sample_rate()
                    ),
                });
            }

            let mut bytes = self.encoder.push(&wav::f32_to_i16(&segment.samples)).await?;
            if segment.is_final {
                bytes.extend(self.encoder.finish().await?);
                self.done = true;
            }

            if self.progressive {
                if let Some(mut header) = self.pending_header.take() {
                    header.extend(bytes);
                    bytes = header;
                }
                if bytes.is_empty() && !segment.is_final {
                    continue;
                }
                return Ok(self.frame(bytes, segment.is_final));
            }

            self.buffered.extend(bytes);
            if segment.is_final {
                let mut all = self.pending_header.take().unwrap_or_default();
                all.extend(std::mem::take(&mut self.buffered));
                return Ok(self.frame(all, true));
            }
        }
    }

    fn frame(&mut self, bytes: Vec<u8>, is_final: bool) -> EncodedFrame {
        let index = self.next_index;
        self.next_index += 1;
        EncodedFrame {
            index,
            bytes,
            is_final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::chunker::AudioSegment;

    const RATE: u32 = 24000;

    fn segment(index: usize, len: usize, is_final: bool) -> Result<AudioSegment> {
        Ok(AudioSegment {
            index,
            samples: vec![0.25; len],
            sample_rate: RATE,
            is_final,
        })
    }

    fn segments(lens: &[usize]) -> SegmentStream {
        let last = lens.len() - 1;
        SegmentStream::from_segments(
            lens.iter()
                .enumerate()
                .map(|(i, &len)| segment(i, len, i == last))
                .collect(),
        )
    }

    async fn collect(mut frames: FrameStream) -> Vec<Result<EncodedFrame>> {
        let mut out = Vec::new();
        while let Some(frame) = frames.next().await {
            out.push(frame);
        }
        out
    }

    #[tokio::test]
    async fn test_pcm_emits_one_frame_per_segment() {
        let frames = FrameStream::new(
            segments(&[100, 50, 10]),
            Box::new(PcmEncoder::new(RATE)),
            AudioFormat::Pcm,
            Framing::Progressive,
        );
        let frames: Vec<_> = collect(frames).await.into_iter().map(|f| f.unwrap()).collect();

        let lens: Vec<_> = frames.iter().map(|f| f.bytes.len()).collect();
        assert_eq!(lens, vec![200, 100, 20]);
        let indices: Vec<_> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(frames[2].is_final && !frames[1].is_final);
    }

    #[tokio::test]
    async fn test_progressive_wav_prepends_streaming_header() {
        let frames = FrameStream::new(
            segments(&[10, 10]),
            Box::new(WavEncoder::new(RATE, Framing::Progressive)),
            AudioFormat::Wav,
            Framing::Progressive,
        );
        let frames: Vec<_> = collect(frames).await.into_iter().map(|f| f.unwrap()).collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].bytes[0..4], b"RIFF");
        assert_eq!(frames[0].bytes.len(), wav::WAV_HEADER_LEN + 20);
        assert_eq!(frames[1].bytes.len(), 20);
    }

    #[tokio::test]
    async fn test_whole_wav_is_single_finalized_file() {
        let frames = FrameStream::new(
            segments(&[100, 200]),
            Box::new(WavEncoder::new(RATE, Framing::Whole)),
            AudioFormat::Wav,
            Framing::Whole,
        );
        let frames: Vec<_> = collect(frames).await.into_iter().map(|f| f.unwrap()).collect();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_final);
        let audio = wav::parse_wav(&frames[0].bytes).unwrap();
        assert_eq!(audio.samples.len(), 300);
        assert_eq!(audio.sample_rate, RATE);
        // 0.25 * 32767
        assert_eq!(audio.samples[0], 8191);
    }

    #[tokio::test]
    async fn test_non_streamable_format_is_withheld_until_final() {
        let frames = FrameStream::new(
            segments(&[10, 10, 10]),
            Box::new(PcmEncoder::new(RATE)),
            AudioFormat::Flac,
            Framing::Progressive,
        );
        assert!(!frames.is_progressive());
        let frames: Vec<_> = collect(frames).await.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes.len(), 60);
        assert!(frames[0].is_final);
    }

    #[tokio::test]
    async fn test_missing_final_segment_is_stream_error() {
        let stream = SegmentStream::from_segments(vec![segment(0, 10, false)]);
        let frames = FrameStream::new(
            stream,
            Box::new(PcmEncoder::new(RATE)),
            AudioFormat::Pcm,
            Framing::Progressive,
        );
        let frames = collect(frames).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(matches!(frames[1], Err(SpeechError::Stream { .. })));
    }

    #[tokio::test]
    async fn test_segment_error_passes_through_and_ends() {
        let stream = SegmentStream::from_segments(vec![
            segment(0, 10, false),
            Err(SpeechError::Synthesis {
                message: "boom".to_string(),
            }),
            segment(2, 10, true),
        ]);
        let frames = FrameStream::new(
            stream,
            Box::new(PcmEncoder::new(RATE)),
            AudioFormat::Pcm,
            Framing::Progressive,
        );
        let frames = collect(frames).await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[1], Err(SpeechError::Synthesis { .. })));
    }

    #[tokio::test]
    async fn test_sample_rate_mismatch_is_rejected() {
        let frames = FrameStream::new(
            segments(&[10]),
            Box::new(PcmEncoder::new(16000)),
            AudioFormat::Pcm,
            Framing::Progressive,
        );
        let frames = collect(frames).await;
        assert!(matches!(frames[0], Err(SpeechError::Stream { .. })));
    }

    #[tokio::test]
    async fn test_mp3_through_ffmpeg_when_installed() {
        if !ffmpeg::ffmpeg_available() {
            eprintln!("Skipping: ffmpeg not installed");
            return;
        }
        let encoder = encoder_for(AudioFormat::Mp3, RATE, Framing::Progressive).unwrap();
        let frames = FrameStream::new(
            segments(&[24000, 24000]),
            encoder,
            AudioFormat::Mp3,
            Framing::Progressive,
        );
        let frames: Vec<_> = collect(frames).await.into_iter().map(|f| f.unwrap()).collect();
        assert!(frames.last().unwrap().is_final);
        let bytes: Vec<u8> = frames.into_iter().flat_map(|f| f.bytes).collect();
        assert!(bytes.len() > 1000, "got {} bytes", bytes.len());
    }

    #[test]
    fn test_encoder_for_builtin_formats_needs_no_ffmpeg() {
        assert!(encoder_for(AudioFormat::Pcm, RATE, Framing::Whole).is_ok());
        assert!(encoder_for(AudioFormat::Wav, RATE, Framing::Whole).is_ok());
    }
}
