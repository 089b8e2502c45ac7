//! Speech-to-text: the engine trait, the Whisper backend and the request
//! path that feeds uploads to the serving engine.

pub mod service;
pub mod transcriber;
pub mod whisper;

pub use transcriber::{MockTranscriber, TranscribeOptions, Transcriber};
