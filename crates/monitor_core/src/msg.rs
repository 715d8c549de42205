use crate::BatchProgress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchMsg {
    /// The server accepted a new batch of `total` items.
    Submitted { batch_id: String, total: u64 },
    /// A batch id was found in per-tab storage after a reload.
    Restored { batch_id: String },
    /// A progress fetch for `batch_id` succeeded.
    ProgressFetched {
        batch_id: String,
        progress: BatchProgress,
    },
    /// A progress fetch for `batch_id` failed (transport or server error).
    PollFailed { batch_id: String },
    /// User asked to cancel the tracked batch.
    CancelRequested,
    /// The owner went away; stop polling but keep the persisted id for recovery.
    Detached,
}
