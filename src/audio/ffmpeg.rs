//! ffmpeg subprocess plumbing for compressed formats.
//!
//! Both directions use raw s16le mono PCM on the ffmpeg side so the rest
//! of the crate only ever deals with i16 samples.

use crate::audio::format::AudioFormat;
use crate::defaults;
use crate::error::{Result, SpeechError};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

const FFMPEG: &str = "ffmpeg";
const READ_BUF: usize = 8192;

/// How long a push waits for the encoder's first bytes for that input.
const OUTPUT_WAIT: Duration = Duration::from_millis(250);
/// Silence on the output pipe that marks the encoder as caught up.
const OUTPUT_QUIET: Duration = Duration::from_millis(20);

/// Whether an `ffmpeg` binary is on PATH (probed once).
pub fn ffmpeg_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        std::process::Command::new(FFMPEG)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    })
}

/// Codec arguments for encoding s16le input into `format`.
pub fn encoder_args(format: AudioFormat) -> Vec<String> {
    match format {
        AudioFormat::Mp3 => vec![
            "-c:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            format!("{}k", defaults::MP3_BITRATE_KBPS),
            "-f".into(),
            "mp3".into(),
        ],
        AudioFormat::Aac => vec![
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", defaults::AAC_BITRATE_KBPS),
            "-f".into(),
            "adts".into(),
        ],
        AudioFormat::Opus => vec![
            "-c:a".into(),
            "libopus".into(),
            "-b:a".into(),
            format!("{}k", defaults::OPUS_BITRATE_KBPS),
            "-f".into(),
            "ogg".into(),
        ],
        AudioFormat::Flac => vec!["-c:a".into(), "flac".into(), "-f".into(), "flac".into()],
        AudioFormat::Wav => vec!["-f".into(), "wav".into()],
        AudioFormat::Pcm => vec!["-f".into(), "s16le".into()],
    }
}

fn base_command() -> Command {
    let mut command = Command::new(FFMPEG);
    command
        .args(["-hide_banner", "-loglevel", "error"])
        .kill_on_drop(true);
    command
}

/// A running ffmpeg encoder fed incrementally with PCM.
pub struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    output: mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>,
}

impl FfmpegProcess {
    /// Spawn an encoder reading s16le mono at `sample_rate` from stdin.
    pub fn spawn_encoder(format: AudioFormat, sample_rate: u32) -> Result<Self> {
        let mut command = base_command();
        command
            .args(["-f", "s16le", "-ar", &sample_rate.to_string(), "-ac", "1"])
            .args(["-i", "pipe:0"])
            .args(encoder_args(format))
            .args(["-flush_packets", "1"])
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| SpeechError::Encoding {
            message: format!("Failed to start ffmpeg for {}: {}", format, e),
        })?;

        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take().ok_or_else(|| SpeechError::Encoding {
            message: "ffmpeg stdout unavailable".to_string(),
        })?;

        // Drain stdout continuously so ffmpeg never blocks on a full pipe
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUF];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if tx.send(Err(e)).is_err() {
                            tracing::debug!("ffmpeg reader closed before error could be reported");
                        }
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            output: rx,
        })
    }

    /// Write PCM and return the bytes ffmpeg encodes from it.
    ///
    /// Waits up to `OUTPUT_WAIT` for the first output, then collects until
    /// the pipe has been quiet for `OUTPUT_QUIET`. Whatever the encoder
    /// still holds back comes out of a later push or [`finish`](Self::finish).
    pub async fn push(&mut self, pcm: &[u8]) -> Result<Vec<u8>> {
        let stdin = self.stdin.as_mut().ok_or_else(|| SpeechError::Encoding {
            message: "ffmpeg input already closed".to_string(),
        })?;
        stdin
            .write_all(pcm)
            .await
            .map_err(|e| SpeechError::Encoding {
                message: format!("Failed to write to ffmpeg: {}", e),
            })?;

        let mut ready = Vec::new();
        let mut wait = OUTPUT_WAIT;
        while let Ok(Some(chunk)) = tokio::time::timeout(wait, self.output.recv()).await {
            ready.extend(chunk.map_err(read_error)?);
            wait = OUTPUT_QUIET;
        }
        Ok(ready)
    }

    /// Close the input and collect the remaining output.
    pub async fn finish(&mut self) -> Result<Vec<u8>> {
        if let Some(mut stdin) = self.stdin.take()
            && let Err(e) = stdin.shutdown().await
        {
            tracing::debug!("ffmpeg stdin shutdown failed: {}", e);
        }

        let mut rest = Vec::new();
        while let Some(chunk) = self.output.recv().await {
            rest.extend(chunk.map_err(read_error)?);
        }

        let status = self.child.wait().await.map_err(|e| SpeechError::Encoding {
            message: format!("Failed to wait for ffmpeg: {}", e),
        })?;
        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = self.child.stderr.take()
                && let Err(e) = pipe.read_to_string(&mut stderr).await
            {
                tracing::debug!("Failed to read ffmpeg stderr: {}", e);
            }
            return Err(SpeechError::Encoding {
                message: format!("ffmpeg exited with {}: {}", status, stderr.trim()),
            });
        }
        Ok(rest)
    }
}

fn read_error(e: std::io::Error) -> SpeechError {
    SpeechError::Encoding {
        message: format!("Failed to read ffmpeg output: {}", e),
    }
}

/// Decode any container ffmpeg understands into mono i16 at `sample_rate`.
///
/// Decoding stops with `InvalidAudio` once the output passes `max_samples`.
pub async fn decode_to_pcm16(
    bytes: Vec<u8>,
    sample_rate: u32,
    max_samples: usize,
) -> Result<Vec<i16>> {
    if !ffmpeg_available() {
        return Err(SpeechError::InvalidAudio {
            message: "unsupported audio container (only WAV is accepted without ffmpeg)"
                .to_string(),
        });
    }

    let mut command = base_command();
    command
        .args(["-i", "pipe:0", "-f", "s16le", "-ac", "1"])
        .args(["-ar", &sample_rate.to_string()])
        .arg("pipe:1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| SpeechError::InvalidAudio {
        message: format!("Failed to start ffmpeg: {}", e),
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            // ffmpeg may stop reading early on a bad header; the exit status reports it
            if let Err(e) = stdin.write_all(&bytes).await {
                tracing::debug!("ffmpeg closed its input early: {}", e);
                return;
            }
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!("ffmpeg stdin shutdown failed: {}", e);
            }
        });
    }

    let failed = |e: std::io::Error| SpeechError::InvalidAudio {
        message: format!("ffmpeg failed: {}", e),
    };
    let mut stdout = child.stdout.take().ok_or_else(|| SpeechError::InvalidAudio {
        message: "ffmpeg stdout unavailable".to_string(),
    })?;
    let max_bytes = max_samples.saturating_mul(2);
    let mut pcm = Vec::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = stdout.read(&mut buf).await.map_err(failed)?;
        if n == 0 {
            break;
        }
        if pcm.len() + n > max_bytes {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Failed to stop ffmpeg: {}", e);
            }
            return Err(SpeechError::InvalidAudio {
                message: format!(
                    "audio is longer than {} seconds",
                    max_samples / sample_rate.max(1) as usize
                ),
            });
        }
        pcm.extend_from_slice(&buf[..n]);
    }

    let status = child.wait().await.map_err(failed)?;
    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take()
            && let Err(e) = pipe.read_to_string(&mut stderr).await
        {
            tracing::debug!("Failed to read ffmpeg stderr: {}", e);
        }
        return Err(SpeechError::InvalidAudio {
            message: format!("could not decode audio: {}", stderr.trim()),
        });
    }

    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    if samples.is_empty() {
        return Err(SpeechError::InvalidAudio {
            message: "audio contains no samples".to_string(),
        });
    }
    Ok(samples)
}
