#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEffect {
    /// Write the batch id to per-tab storage.
    PersistBatchId { batch_id: String },
    /// Remove the batch id from per-tab storage.
    ClearBatchId,
    /// Start the fixed-interval poll loop for `batch_id`.
    StartPolling { batch_id: String },
    /// Stop the poll loop, if one is running.
    StopPolling,
    /// Fetch progress once, outside the poll loop.
    FetchOnce { batch_id: String },
    /// Best-effort cancel request to the server.
    SendCancel { batch_id: String },
}

impl BatchEffect {
    /// Effects that need a network round trip and must be awaited by the caller.
    pub fn is_async(&self) -> bool {
        matches!(self, BatchEffect::FetchOnce { .. } | BatchEffect::SendCancel { .. })
    }
}
