//! voxserve - OpenAI-compatible speech server
//!
//! Speech-to-text and text-to-speech behind the OpenAI audio API, with
//! models that can be swapped at runtime without dropping requests.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod models;
pub mod server;
pub mod slots;
pub mod stream;
pub mod stt;
pub mod tts;

// Engine seams
pub use engine::{EngineFactory, LocalEngineFactory, MockEngineFactory};
pub use stt::transcriber::Transcriber;
pub use tts::synthesizer::Synthesizer;

// Model lifecycle
pub use slots::{ModelKind, ModelSpec, PinnedHandle, SlotManager, SlotStatus};

// HTTP surface
pub use server::{AppState, create_router};

// Error handling
pub use error::{Result, SpeechError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
