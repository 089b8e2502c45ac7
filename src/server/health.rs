//! `GET /health`

use crate::server::AppState;
use crate::slots::{ModelKind, SlotStatus};
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy with both engines serving, degraded with one, unhealthy with none.
    pub fn from_slots(stt: &SlotStatus, tts: &SlotStatus) -> Self {
        match (stt.is_ready(), tts.is_ready()) {
            (true, true) => HealthStatus::Healthy,
            (false, false) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub stt_model: &'static str,
    pub tts_model: &'static str,
    pub stt: SlotStatus,
    pub tts: SlotStatus,
}

fn loaded_label(status: &SlotStatus) -> &'static str {
    if status.is_ready() { "ok" } else { "not_loaded" }
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stt = state.slots.status(ModelKind::Stt);
    let tts = state.slots.status(ModelKind::Tts);

    Json(HealthResponse {
        status: HealthStatus::from_slots(&stt, &tts),
        version: env!("CARGO_PKG_VERSION"),
        stt_model: loaded_label(&stt),
        tts_model: loaded_label(&tts),
        stt,
        tts,
    })
}
