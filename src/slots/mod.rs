//! Runtime model lifecycle.
//!
//! Each model kind lives in a versioned [`ModelSlot`]. Requests pin the
//! current version through a [`PinnedHandle`]; a swap loads the replacement
//! in the background and installs it atomically, while superseded versions
//! drain until their last handle is released.

pub mod manager;
pub mod slot;

pub use manager::SlotManager;
pub use slot::{ModelSlot, PinnedHandle, SwapOutcome, SwapTicket};

use serde::Serialize;
use std::fmt;

/// Which engine a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Stt,
    Tts,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Stt => f.write_str("stt"),
            ModelKind::Tts => f.write_str("tts"),
        }
    }
}

/// Serving state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Nothing loaded and nothing loading.
    Unloaded,
    /// First load in progress; no engine to serve yet.
    Loading,
    /// An engine is installed and serving.
    Ready,
    /// The last load failed and there is no engine to fall back to.
    Failed,
}

/// Identity of a loaded model: the id plus the parameter that shapes it
/// (compute type for STT, language code for TTS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub model_id: String,
    pub variant: String,
}

impl ModelSpec {
    pub fn new(model_id: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model_id, self.variant)
    }
}

/// A superseded version still serving requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainingStatus {
    pub version: u64,
    pub model_id: String,
    pub in_flight: usize,
}

/// Point-in-time view of a slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    pub kind: ModelKind,
    pub state: SlotState,
    pub model_id: Option<String>,
    pub variant: Option<String>,
    pub version: Option<u64>,
    pub in_flight: usize,
    /// Model id of the load currently in progress.
    pub loading: Option<String>,
    pub draining: Vec<DrainingStatus>,
    pub last_error: Option<String>,
}

impl SlotStatus {
    pub fn is_ready(&self) -> bool {
        self.state == SlotState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_display_and_serde() {
        assert_eq!(ModelKind::Stt.to_string(), "stt");
        assert_eq!(serde_json::to_string(&ModelKind::Tts).unwrap(), "\"tts\"");
    }

    #[test]
    fn slot_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SlotState::Unloaded).unwrap(),
            "\"unloaded\""
        );
        assert_eq!(serde_json::to_string(&SlotState::Ready).unwrap(), "\"ready\"");
    }

    #[test]
    fn model_spec_equality_includes_variant() {
        assert_eq!(ModelSpec::new("a", "x"), ModelSpec::new("a", "x"));
        assert_ne!(ModelSpec::new("a", "x"), ModelSpec::new("a", "y"));
        assert_eq!(ModelSpec::new("tiny", "int8").to_string(), "tiny (int8)");
    }
}
