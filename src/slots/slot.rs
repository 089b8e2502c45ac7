use crate::error::{Result, SpeechError};
use crate::slots::{DrainingStatus, ModelKind, ModelSpec, SlotState, SlotStatus};
use parking_lot::Mutex;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

/// One installed engine and its lease count.
struct Generation<E: ?Sized> {
    version: u64,
    spec: ModelSpec,
    engine: Arc<E>,
    in_flight: AtomicUsize,
}

impl<E: ?Sized> Generation<E> {
    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

struct SlotInner<E: ?Sized> {
    current: Option<Arc<Generation<E>>>,
    loading: Option<ModelSpec>,
    failed: bool,
    last_error: Option<String>,
    draining: Vec<Arc<Generation<E>>>,
    next_version: u64,
}

/// Versioned holder for one engine kind.
///
/// The mutex only guards metadata; it is never held across an engine call
/// or an await.
pub struct ModelSlot<E: ?Sized> {
    kind: ModelKind,
    inner: Mutex<SlotInner<E>>,
}

/// Result of a completed swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOutcome {
    pub kind: ModelKind,
    pub model_id: String,
    pub version: u64,
    /// False when the requested model was already serving and nothing was loaded.
    pub reloaded: bool,
}

/// Handle on a background swap.
pub struct SwapTicket {
    kind: ModelKind,
    rx: oneshot::Receiver<Result<SwapOutcome>>,
}

impl SwapTicket {
    fn ready(kind: ModelKind, outcome: Result<SwapOutcome>) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive in `rx`, so this cannot fail
        if tx.send(outcome).is_err() {
            tracing::debug!("swap ticket receiver dropped early");
        }
        Self { kind, rx }
    }

    /// Wait for the load to finish.
    ///
    /// Dropping the ticket does not cancel the swap.
    pub async fn wait(self) -> Result<SwapOutcome> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(SpeechError::LoadFailed {
                model: self.kind.to_string(),
                message: "load task ended unexpectedly".to_string(),
            }),
        }
    }
}

/// Lease on one slot version.
///
/// While a handle is alive its engine stays loaded, even if a swap installs
/// a newer version. Dropping the handle releases it.
pub struct PinnedHandle<E: ?Sized> {
    generation: Arc<Generation<E>>,
    slot: Arc<ModelSlot<E>>,
}

impl<E: ?Sized> PinnedHandle<E> {
    pub fn version(&self) -> u64 {
        self.generation.version
    }

    pub fn model_id(&self) -> &str {
        &self.generation.spec.model_id
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.generation.spec
    }

    pub fn kind(&self) -> ModelKind {
        self.slot.kind
    }

    /// Release the lease now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<E: ?Sized> Deref for PinnedHandle<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.generation.engine
    }
}

impl<E: ?Sized> Drop for PinnedHandle<E> {
    fn drop(&mut self) {
        let previous = self.generation.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            self.slot.retire_if_drained(self.generation.version);
        }
    }
}

impl<E: ?Sized> std::fmt::Debug for PinnedHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedHandle")
            .field("kind", &self.slot.kind)
            .field("version", &self.generation.version)
            .field("model_id", &self.generation.spec.model_id)
            .finish()
    }
}

/// Clears the loading flag if the load task unwinds.
struct LoadGuard<E: ?Sized> {
    slot: Arc<ModelSlot<E>>,
    armed: bool,
}

impl<E: ?Sized> Drop for LoadGuard<E> {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = self.slot.finish_load(Err(SpeechError::LoadFailed {
                model: self.slot.kind.to_string(),
                message: "load task aborted".to_string(),
            }))
        {
            tracing::error!(kind = %self.slot.kind, "Model load task aborted: {}", e);
        }
    }
}

impl<E: ?Sized> ModelSlot<E> {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(SlotInner {
                current: None,
                loading: None,
                failed: false,
                last_error: None,
                draining: Vec::new(),
                next_version: 1,
            }),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Pin the serving version.
    ///
    /// # Errors
    /// `ModelNotReady` when no engine is installed. A load in progress does
    /// not block acquisition of the previous version.
    pub fn acquire(self: &Arc<Self>) -> Result<PinnedHandle<E>> {
        let inner = self.inner.lock();
        let generation = inner
            .current
            .clone()
            .ok_or_else(|| SpeechError::ModelNotReady {
                kind: self.kind.to_string(),
            })?;
        generation.in_flight.fetch_add(1, Ordering::SeqCst);
        drop(inner);

        Ok(PinnedHandle {
            generation,
            slot: Arc::clone(self),
        })
    }

    fn finish_load(&self, loaded: Result<Arc<E>>) -> Result<SwapOutcome> {
        let mut inner = self.inner.lock();
        let spec = inner.loading.take();

        let (engine, spec) = match (loaded, spec) {
            (Ok(engine), Some(spec)) => (engine, spec),
            (Ok(_), None) => {
                return Err(SpeechError::Other(format!(
                    "{} load finished without a pending request",
                    self.kind
                )));
            }
            (Err(e), _) => {
                inner.last_error = Some(e.to_string());
                if inner.current.is_none() {
                    inner.failed = true;
                }
                tracing::warn!(
                    kind = %self.kind,
                    serving = ?inner.current.as_ref().map(|g| g.spec.model_id.clone()),
                    "Model load failed: {}",
                    e
                );
                return Err(e);
            }
        };

        let version = inner.next_version;
        inner.next_version += 1;
        let generation = Arc::new(Generation {
            version,
            spec: spec.clone(),
            engine,
            in_flight: AtomicUsize::new(0),
        });

        if let Some(old) = inner.current.replace(generation) {
            let in_flight = old.in_flight();
            if in_flight > 0 {
                tracing::info!(
                    kind = %self.kind,
                    version = old.version,
                    in_flight,
                    "Draining superseded model"
                );
                inner.draining.push(old);
            } else {
                tracing::info!(kind = %self.kind, version = old.version, "Retired superseded model");
            }
        }
        inner.failed = false;
        inner.last_error = None;

        tracing::info!(kind = %self.kind, model = %spec, version, "Model ready");
        Ok(SwapOutcome {
            kind: self.kind,
            model_id: spec.model_id,
            version,
            reloaded: true,
        })
    }

    fn retire_if_drained(&self, version: u64) {
        let mut inner = self.inner.lock();
        let before = inner.draining.len();
        inner
            .draining
            .retain(|g| g.version != version || g.in_flight() > 0);
        if inner.draining.len() < before {
            tracing::info!(kind = %self.kind, version, "Retired drained model");
        }
    }

    /// Snapshot of the slot for health and admin endpoints.
    pub fn status(&self) -> SlotStatus {
        let inner = self.inner.lock();
        let state = if inner.current.is_some() {
            SlotState::Ready
        } else if inner.loading.is_some() {
            SlotState::Loading
        } else if inner.failed {
            SlotState::Failed
        } else {
            SlotState::Unloaded
        };

        SlotStatus {
            kind: self.kind,
            state,
            model_id: inner.current.as_ref().map(|g| g.spec.model_id.clone()),
            variant: inner.current.as_ref().map(|g| g.spec.variant.clone()),
            version: inner.current.as_ref().map(|g| g.version),
            in_flight: inner.current.as_ref().map_or(0, |g| g.in_flight()),
            loading: inner.loading.as_ref().map(|s| s.model_id.clone()),
            draining: inner
                .draining
                .iter()
                .map(|g| DrainingStatus {
                    version: g.version,
                    model_id: g.spec.model_id.clone(),
                    in_flight: g.in_flight(),
                })
                .collect(),
            last_error: inner.last_error.clone(),
        }
    }

    /// Model id of the serving version.
    pub fn current_model_id(&self) -> Option<String> {
        self.inner
            .lock()
            .current
            .as_ref()
            .map(|g| g.spec.model_id.clone())
    }
}

impl<E: ?Sized + Send + Sync + 'static> ModelSlot<E> {
    /// Start loading `spec` in the background.
    ///
    /// The load runs in its own task bounded by `timeout`; it is not tied to
    /// the caller, so a dropped ticket or disconnected client does not cancel
    /// it. Requesting the spec that is already serving completes immediately.
    ///
    /// # Errors
    /// `SwapInProgress` if a load for this slot is already running.
    pub fn begin_swap<F, Fut>(
        self: &Arc<Self>,
        spec: ModelSpec,
        timeout: Duration,
        load: F,
    ) -> Result<SwapTicket>
    where
        F: FnOnce(ModelSpec) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Arc<E>>> + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if let Some(loading) = &inner.loading {
                return Err(SpeechError::SwapInProgress {
                    kind: self.kind.to_string(),
                    model: loading.model_id.clone(),
                });
            }
            if let Some(current) = &inner.current
                && current.spec == spec
            {
                tracing::info!(kind = %self.kind, model = %spec, "Model already loaded, skipping reload");
                let outcome = SwapOutcome {
                    kind: self.kind,
                    model_id: spec.model_id,
                    version: current.version,
                    reloaded: false,
                };
                return Ok(SwapTicket::ready(self.kind, Ok(outcome)));
            }
            inner.loading = Some(spec.clone());
        }

        tracing::info!(kind = %self.kind, model = %spec, "Loading model");
        let (tx, rx) = oneshot::channel();
        let slot = Arc::clone(self);
        tokio::spawn(async move {
            let mut guard = LoadGuard {
                slot: Arc::clone(&slot),
                armed: true,
            };
            let model_id = spec.model_id.clone();
            let loaded = match tokio::time::timeout(timeout, load(spec)).await {
                Ok(result) => result,
                Err(_) => Err(SpeechError::LoadFailed {
                    model: model_id,
                    message: format!("load timed out after {}s", timeout.as_secs_f32()),
                }),
            };
            guard.armed = false;
            let outcome = slot.finish_load(loaded);
            if tx.send(outcome).is_err() {
                tracing::debug!(kind = %slot.kind, "Swap finished with nobody waiting");
            }
        });

        Ok(SwapTicket { kind: self.kind, rx })
    }
}
