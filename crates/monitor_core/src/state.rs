use crate::BatchProgress;

/// Client mirror of the tracked batch analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchState {
    batch_id: Option<String>,
    progress: Option<BatchProgress>,
    polling: bool,
    dirty: bool,
}

/// Read-only snapshot for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchView {
    pub batch_id: Option<String>,
    pub progress: Option<BatchProgress>,
    pub polling: bool,
    pub dirty: bool,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> BatchView {
        BatchView {
            batch_id: self.batch_id.clone(),
            progress: self.progress.clone(),
            polling: self.polling,
            dirty: self.dirty,
        }
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    pub fn progress(&self) -> Option<&BatchProgress> {
        self.progress.as_ref()
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    pub(crate) fn is_tracking(&self, batch_id: &str) -> bool {
        self.batch_id.as_deref() == Some(batch_id)
    }

    pub(crate) fn track(&mut self, batch_id: String, progress: Option<BatchProgress>) {
        self.batch_id = Some(batch_id);
        self.progress = progress;
        self.dirty = true;
    }

    pub(crate) fn replace_progress(&mut self, progress: BatchProgress) {
        self.progress = Some(progress);
        self.dirty = true;
    }

    pub(crate) fn set_polling(&mut self, polling: bool) {
        if self.polling != polling {
            self.polling = polling;
            self.dirty = true;
        }
    }

    /// Drop the tracked id; the last snapshot stays visible.
    pub(crate) fn forget(&mut self) {
        self.batch_id = None;
        self.polling = false;
        self.dirty = true;
    }

    /// Returns whether the state changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
