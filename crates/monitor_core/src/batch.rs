use serde::{Deserialize, Deserializer, Serialize};

/// Server-reported lifecycle of a batch analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Running,
    Done,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BatchStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub job_id: String,
    pub error: String,
}

/// Snapshot returned by `GET /jobs/batch-analyze/{batchId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub status: BatchStatus,
    pub total: u64,
    pub current: u64,
    pub success: u64,
    pub failed: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub failed_items: Vec<FailedItem>,
}

impl BatchProgress {
    /// Progress right after the server accepted `total` items.
    pub fn started(total: u64) -> Self {
        Self {
            status: BatchStatus::Running,
            total,
            current: 0,
            success: 0,
            failed: 0,
            failed_items: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Completed fraction in `0.0..=1.0`; an empty batch counts as complete.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.current.min(self.total) as f64) / (self.total as f64)
    }
}

/// Response of `POST /jobs/batch-analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAccepted {
    pub batch_id: String,
}

// The server encodes an empty failure list as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<FailedItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<FailedItem>>::deserialize(deserializer)?.unwrap_or_default())
}
