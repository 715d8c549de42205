//! Background tracking of a server-side batch analysis.
//!
//! [`BatchPoller`] feeds server responses into the pure batch state machine from
//! `monitor_core` and carries out the effects it asks for: per-tab storage of the
//! batch id, the fixed-interval poll task, and best-effort cancel requests.
//! Poll failures never reach the caller; they only end the loop.

use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use monitor_core::{
    update, BatchAccepted, BatchEffect, BatchMsg, BatchProgress, BatchState, BatchView,
    BATCH_ID_KEY,
};
use monitor_logging::{monitor_debug, monitor_info, monitor_warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::KeyValueStore;
use crate::{ApiClient, ApiError};

/// Server operations the poller drives. [`ApiClient`] is the production backend.
#[async_trait::async_trait]
pub trait BatchBackend: Send + Sync {
    async fn start(&self, job_ids: &[String]) -> Result<BatchAccepted, ApiError>;
    async fn progress(&self, batch_id: &str) -> Result<BatchProgress, ApiError>;
    async fn cancel(&self, batch_id: &str) -> Result<(), ApiError>;
}

#[async_trait::async_trait]
impl BatchBackend for ApiClient {
    async fn start(&self, job_ids: &[String]) -> Result<BatchAccepted, ApiError> {
        self.jobs().start_batch_analysis(job_ids).await
    }

    async fn progress(&self, batch_id: &str) -> Result<BatchProgress, ApiError> {
        self.jobs().batch_progress(batch_id).await
    }

    async fn cancel(&self, batch_id: &str) -> Result<(), ApiError> {
        self.jobs().cancel_batch_analysis(batch_id).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// A fresh snapshot replaced the previous one; the batch is still running.
    Progress(BatchProgress),
    /// The batch reached `done` or `cancelled`; polling has stopped.
    Finished(BatchProgress),
    /// A progress fetch failed and tracking was given up.
    Abandoned { batch_id: String },
}

pub trait BatchEventSink: Send + Sync {
    fn emit(&self, event: BatchEvent);
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<BatchEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<BatchEvent>) -> Self {
        Self { tx }
    }
}

impl BatchEventSink for ChannelEventSink {
    fn emit(&self, event: BatchEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl BatchEventSink for NullEventSink {
    fn emit(&self, _event: BatchEvent) {}
}

/// Owned handle to a running poll task. Dropping it stops the task.
struct PollHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl PollHandle {
    fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop the task and wait until it has exited.
    async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Shared {
    backend: Arc<dyn BatchBackend>,
    tab_storage: Arc<dyn KeyValueStore>,
    sink: Arc<dyn BatchEventSink>,
    interval: Duration,
    state: Mutex<BatchState>,
    handle: Mutex<Option<PollHandle>>,
    polling: watch::Sender<bool>,
}

pub struct BatchPoller {
    shared: Arc<Shared>,
}

impl BatchPoller {
    /// Poll through `client` at its configured interval.
    ///
    /// `tab_storage` holds the batch id across reloads of the same tab.
    pub fn new(
        client: ApiClient,
        tab_storage: Arc<dyn KeyValueStore>,
        sink: Arc<dyn BatchEventSink>,
    ) -> Self {
        let interval = client.settings().poll_interval;
        Self::with_backend(Arc::new(client), interval, tab_storage, sink)
    }

    pub fn with_backend(
        backend: Arc<dyn BatchBackend>,
        interval: Duration,
        tab_storage: Arc<dyn KeyValueStore>,
        sink: Arc<dyn BatchEventSink>,
    ) -> Self {
        let (polling, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                backend,
                tab_storage,
                sink,
                interval,
                state: Mutex::new(BatchState::new()),
                handle: Mutex::new(None),
                polling,
            }),
        }
    }

    pub fn view(&self) -> BatchView {
        self.shared.lock_state().view()
    }

    pub fn progress(&self) -> Option<BatchProgress> {
        self.shared.lock_state().progress().cloned()
    }

    pub fn batch_id(&self) -> Option<String> {
        self.shared.lock_state().batch_id().map(str::to_string)
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock_state().is_polling()
    }

    /// Submit `job_ids` for analysis and start tracking the returned batch.
    ///
    /// Submission errors propagate and leave nothing tracked.
    pub async fn submit(&self, job_ids: &[String]) -> Result<String, ApiError> {
        let accepted = self.shared.backend.start(job_ids).await?;
        monitor_info!(
            "Batch {} accepted for {} jobs",
            accepted.batch_id,
            job_ids.len()
        );
        self.shared.dispatch(BatchMsg::Submitted {
            batch_id: accepted.batch_id.clone(),
            total: job_ids.len() as u64,
        });
        Ok(accepted.batch_id)
    }

    /// Resume tracking a batch whose id survived a reload.
    ///
    /// Fetches once; polling resumes only if the batch is still running. Returns
    /// the snapshot observed, if any.
    pub async fn recover(&self) -> Option<BatchProgress> {
        let batch_id = self
            .shared
            .tab_storage
            .get(BATCH_ID_KEY)
            .filter(|id| !id.trim().is_empty())?;
        monitor_info!("Recovering batch {}", batch_id);
        let deferred = self.shared.dispatch(BatchMsg::Restored { batch_id });
        self.run_deferred(deferred).await;
        self.progress()
    }

    /// Ask the server to cancel the tracked batch.
    ///
    /// Polling continues; the next tick observes `cancelled` and ends tracking.
    pub async fn cancel(&self) {
        let deferred = self.shared.dispatch(BatchMsg::CancelRequested);
        self.run_deferred(deferred).await;
    }

    /// Stop polling without forgetting the batch; `recover` can pick it up again.
    pub fn stop(&self) {
        self.shared.dispatch(BatchMsg::Detached);
    }

    /// Like [`stop`](Self::stop), but also waits for the poll task to exit.
    pub async fn shutdown(&self) {
        let handle = self.shared.lock_handle().take();
        self.stop();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    /// Wait until no poll task is running.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.polling.subscribe();
        let _ = rx.wait_for(|polling| !*polling).await;
    }

    async fn run_deferred(&self, effects: Vec<BatchEffect>) {
        let mut pending: VecDeque<BatchEffect> = effects.into();
        while let Some(effect) = pending.pop_front() {
            match effect {
                BatchEffect::FetchOnce { batch_id } => {
                    let msg = self.shared.fetch(&batch_id).await;
                    pending.extend(self.shared.dispatch(msg));
                }
                BatchEffect::SendCancel { batch_id } => {
                    match self.shared.backend.cancel(&batch_id).await {
                        Ok(()) => monitor_info!("Cancel requested for batch {}", batch_id),
                        Err(err) => {
                            monitor_warn!("Cancel request for batch {} failed: {}", batch_id, err)
                        }
                    }
                }
                other => monitor_debug!("Unexpected deferred effect {:?}", other),
            }
        }
    }
}

impl Drop for BatchPoller {
    fn drop(&mut self) {
        self.shared.stop_polling();
    }
}

impl Shared {
    /// Apply `msg`, run the effects that need no network, and return the rest.
    ///
    /// The state lock is held until the immediate effects have run, so effects
    /// computed for one batch never land on a batch submitted in between.
    /// Events go to the sink after the lock is released.
    fn dispatch(self: &Arc<Self>, msg: BatchMsg) -> Vec<BatchEffect> {
        let failed_batch = match &msg {
            BatchMsg::PollFailed { batch_id } => Some(batch_id.clone()),
            _ => None,
        };
        let carries_snapshot = matches!(
            msg,
            BatchMsg::Submitted { .. } | BatchMsg::ProgressFetched { .. }
        );

        let mut events = Vec::new();
        let deferred = {
            let mut guard = self.lock_state();
            let state = std::mem::take(&mut *guard);
            let (mut state, effects) = update(state, msg);
            let changed = state.consume_dirty();
            let progress = state.progress().cloned();
            *guard = state;

            if carries_snapshot && changed {
                if let Some(progress) = progress {
                    events.push(if progress.is_terminal() {
                        monitor_info!("Batch finished as {:?}", progress.status);
                        BatchEvent::Finished(progress)
                    } else {
                        BatchEvent::Progress(progress)
                    });
                }
            }
            if let Some(batch_id) = failed_batch {
                if effects.contains(&BatchEffect::ClearBatchId) {
                    events.push(BatchEvent::Abandoned { batch_id });
                }
            }

            let (deferred, immediate): (Vec<_>, Vec<_>) =
                effects.into_iter().partition(BatchEffect::is_async);
            for effect in immediate {
                self.run_immediate(effect);
            }
            deferred
        };

        for event in events {
            self.sink.emit(event);
        }
        // Idle is published only after the sink has seen the final event.
        let guard = self.lock_state();
        self.polling.send_replace(guard.is_polling());
        drop(guard);
        deferred
    }

    fn run_immediate(self: &Arc<Self>, effect: BatchEffect) {
        match effect {
            BatchEffect::PersistBatchId { batch_id } => {
                if let Err(err) = self.tab_storage.set(BATCH_ID_KEY, &batch_id) {
                    monitor_warn!("Failed to persist batch id {}: {}", batch_id, err);
                }
            }
            BatchEffect::ClearBatchId => {
                if let Err(err) = self.tab_storage.remove(BATCH_ID_KEY) {
                    monitor_warn!("Failed to clear batch id: {}", err);
                }
            }
            BatchEffect::StartPolling { batch_id } => self.start_polling(batch_id),
            BatchEffect::StopPolling => self.stop_polling(),
            BatchEffect::FetchOnce { .. } | BatchEffect::SendCancel { .. } => {}
        }
    }

    async fn fetch(&self, batch_id: &str) -> BatchMsg {
        match self.backend.progress(batch_id).await {
            Ok(progress) => {
                monitor_debug!(
                    "Batch {} progress {}/{} ({:?})",
                    batch_id,
                    progress.current,
                    progress.total,
                    progress.status
                );
                BatchMsg::ProgressFetched {
                    batch_id: batch_id.to_string(),
                    progress,
                }
            }
            Err(err) => {
                monitor_warn!("Progress fetch for batch {} failed: {}", batch_id, err);
                BatchMsg::PollFailed {
                    batch_id: batch_id.to_string(),
                }
            }
        }
    }

    fn start_polling(self: &Arc<Self>, batch_id: String) {
        self.stop_polling();
        monitor_debug!("Polling batch {} every {:?}", batch_id, self.interval);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(poll_loop(Arc::clone(self), batch_id, cancel.clone()));
        *self.lock_handle() = Some(PollHandle {
            cancel,
            join: Some(join),
        });
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.lock_handle().take() {
            handle.stop();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<PollHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn poll_loop(shared: Arc<Shared>, batch_id: String, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the first fetch happens one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        // Each fetch finishes before the next tick is awaited, so ticks never overlap.
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = shared.fetch(&batch_id) => msg,
        };
        let deferred = shared.dispatch(msg);
        if !deferred.is_empty() {
            monitor_debug!("Poll loop ignoring effects {:?}", deferred);
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    monitor_debug!("Poll loop for batch {} exited", batch_id);
}
