//! Text splitting and segment production for synthesis.
//!
//! Input text is split at sentence boundaries (then clause breaks, then
//! words) and each piece is synthesized in order on a blocking worker.
//! Segments flow to the consumer through a bounded channel, so the worker
//! runs at most `capacity` segments ahead and stops once the consumer goes
//! away.

use crate::error::{Result, SpeechError};
use crate::slots::PinnedHandle;
use crate::tts::synthesizer::Synthesizer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];
/// Full-width terminators end a sentence without trailing whitespace.
const CJK_TERMINATORS: &[char] = &['。', '！', '？'];
const CLAUSE_BREAKS: &[char] = &[',', ';', ':', '—', '，', '；', '：'];

/// One synthesized piece of the input, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Position in the run, starting at 0.
    pub index: usize,
    /// Mono samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub is_final: bool,
}

/// Parameters of one synthesis run.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub text: String,
    pub voice: String,
    pub speed: f32,
    /// Longest text piece handed to the engine in one call.
    pub max_chars: usize,
    /// Segments the worker may produce ahead of the consumer.
    pub capacity: usize,
    /// Upper bound on the whole run; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl SynthesisJob {
    pub fn new(text: impl Into<String>, voice: impl Into<String>, speed: f32) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            speed,
            max_chars: crate::defaults::CHUNK_MAX_CHARS,
            capacity: crate::defaults::SEGMENT_BUFFER,
            timeout: None,
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into pieces of at most `max_chars` characters.
///
/// Each sentence becomes its own piece. Longer sentences are packed from
/// clauses, then from words; a single word longer than the limit is the
/// only thing ever cut mid-word.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut pieces = Vec::new();

    for sentence in split_sentences(text) {
        if char_len(sentence) <= max_chars {
            pieces.push(sentence.to_string());
        } else {
            split_long_sentence(sentence, max_chars, &mut pieces);
        }
    }
    pieces
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let cut = if CJK_TERMINATORS.contains(&c) {
            true
        } else if SENTENCE_TERMINATORS.contains(&c) {
            chars.peek().is_none_or(|(_, next)| next.is_whitespace())
        } else {
            false
        };
        if cut {
            let end = i + c.len_utf8();
            sentences.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Greedy joiner: appends parts with a single space while they fit.
struct Packer {
    max_chars: usize,
    current: String,
    current_len: usize,
}

impl Packer {
    fn push(&mut self, part: &str, out: &mut Vec<String>) {
        let part = part.trim();
        if part.is_empty() {
            return;
        }
        let len = char_len(part);
        if self.current_len > 0 && self.current_len + 1 + len > self.max_chars {
            self.flush(out);
        }
        if self.current_len > 0 {
            self.current.push(' ');
            self.current_len += 1;
        }
        self.current.push_str(part);
        self.current_len += len;
    }

    fn flush(&mut self, out: &mut Vec<String>) {
        if self.current_len > 0 {
            out.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }
}

fn split_long_sentence(sentence: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut packer = Packer {
        max_chars,
        current: String::new(),
        current_len: 0,
    };

    for clause in sentence.split_inclusive(|c: char| CLAUSE_BREAKS.contains(&c)) {
        if char_len(clause.trim()) <= max_chars {
            packer.push(clause, out);
            continue;
        }
        for word in clause.split_whitespace() {
            if char_len(word) <= max_chars {
                packer.push(word, out);
                continue;
            }
            packer.flush(out);
            let chars: Vec<char> = word.chars().collect();
            out.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
        }
    }
    packer.flush(out);
}

/// Start synthesizing `job` with the pinned engine.
///
/// The handle moves into the worker and is released when the worker
/// exits: after the final segment, after an engine error, or once the
/// returned stream is cancelled or dropped.
pub fn synthesize(handle: PinnedHandle<dyn Synthesizer>, job: SynthesisJob) -> SegmentStream {
    let pieces = split_text(&job.text, job.max_chars);
    let (tx, rx) = mpsc::channel(job.capacity.max(1));
    let cancel = Arc::new(AtomicBool::new(false));
    let timeout = job.timeout;

    let worker_cancel = Arc::clone(&cancel);
    tokio::task::spawn_blocking(move || {
        run_worker(handle, pieces, &job.voice, job.speed, &tx, &worker_cancel);
    });

    SegmentStream {
        rx,
        cancel,
        deadline: timeout.map(|t| (Instant::now() + t, t)),
        finished: false,
    }
}

fn run_worker(
    handle: PinnedHandle<dyn Synthesizer>,
    pieces: Vec<String>,
    voice: &str,
    speed: f32,
    tx: &mpsc::Sender<Result<AudioSegment>>,
    cancel: &AtomicBool,
) {
    let sample_rate = handle.sample_rate();

    if pieces.is_empty() {
        let segment = AudioSegment {
            index: 0,
            samples: Vec::new(),
            sample_rate,
            is_final: true,
        };
        if tx.blocking_send(Ok(segment)).is_err() {
            tracing::debug!("Segment consumer gone before empty result");
        }
        return;
    }

    let last = pieces.len() - 1;
    for (index, piece) in pieces.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            tracing::debug!(index, total = pieces.len(), "Synthesis cancelled");
            return;
        }

        let item = handle
            .synthesize(piece, voice, speed)
            .map(|samples| AudioSegment {
                index,
                samples,
                sample_rate,
                is_final: index == last,
            });
        let failed = item.is_err();
        if let Err(e) = &item {
            tracing::warn!(index, model = handle.model_id(), "Synthesis failed: {}", e);
        }

        if tx.blocking_send(item).is_err() {
            tracing::debug!(index, "Segment consumer gone, stopping synthesis");
            return;
        }
        if failed {
            return;
        }
    }
    tracing::debug!(segments = pieces.len(), "Synthesis finished");
}

/// Single-pass sequence of [`AudioSegment`]s from one synthesis run.
pub struct SegmentStream {
    rx: mpsc::Receiver<Result<AudioSegment>>,
    cancel: Arc<AtomicBool>,
    deadline: Option<(Instant, Duration)>,
    finished: bool,
}

impl SegmentStream {
    /// Stream over already-produced items, with no worker behind it.
    pub fn from_segments(items: Vec<Result<AudioSegment>>) -> Self {
        let (tx, rx) = mpsc::channel(items.len().max(1));
        for item in items {
            if tx.try_send(item).is_err() {
                break;
            }
        }
        Self {
            rx,
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
            finished: false,
        }
    }

    /// Next segment in order, or `None` once the run has ended.
    ///
    /// Ends after the final segment or the first error. Exceeding the run
    /// timeout yields a `Stream` error and cancels the worker.
    pub async fn next(&mut self) -> Option<Result<AudioSegment>> {
        if self.finished {
            return None;
        }

        let item = match self.deadline {
            Some((deadline, timeout)) => {
                match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                    Ok(item) => item,
                    Err(_) => {
                        self.cancel();
                        self.finished = true;
                        return Some(Err(SpeechError::Stream {
                            message: format!(
                                "synthesis timed out after {}s",
                                timeout.as_secs_f32()
                            ),
                        }));
                    }
                }
            }
            None => self.rx.recv().await,
        };

        match &item {
            Some(Ok(segment)) if !segment.is_final => {}
            _ => self.finished = true,
        }
        item
    }

    /// Stop the worker before its next engine call.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

impl Drop for SegmentStream {
    fn drop(&mut self) {
        self.cancel();
    }
}
