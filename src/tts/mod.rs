//! Text-to-speech: engines, voice naming and segment production.

pub mod chunker;
pub mod espeak;
pub mod synthesizer;
pub mod voices;

pub use chunker::{AudioSegment, SegmentStream, SynthesisJob};
pub use synthesizer::{MockSynthesizer, Synthesizer};
