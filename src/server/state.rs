use crate::config::Config;
use crate::error::SpeechError;
use crate::slots::SlotManager;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared handler state; cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub slots: Arc<SlotManager>,
    pub config: Arc<Config>,
    /// Bounds concurrent inference requests.
    pub request_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(slots: Arc<SlotManager>, config: Config) -> Self {
        let permits = config.server.max_concurrent_requests.max(1);
        Self {
            slots,
            config: Arc::new(config),
            request_semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Wait for an inference slot. The permit may outlive the handler, e.g.
    /// inside a streaming body.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, SpeechError> {
        Arc::clone(&self.request_semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SpeechError::Other("server is shutting down".to_string()))
    }
}
