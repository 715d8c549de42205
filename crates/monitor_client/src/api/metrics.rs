use serde_json::Value;

use crate::gateway::segment;
use crate::{ApiClient, ApiError, ApiRequest};

/// Window for a metrics history query. Times are Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsRange {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: Option<u32>,
}

impl MetricsRange {
    fn to_pairs(self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start) = self.start_time {
            pairs.push(("startTime", start.to_string()));
        }
        if let Some(end) = self.end_time {
            pairs.push(("endTime", end.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

pub struct MetricsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> MetricsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn latest(&self, job_id: &str) -> Result<Value, ApiError> {
        let path = format!("/jobs/{}/metrics/latest", segment(job_id));
        self.client.send(ApiRequest::get(path)).await
    }

    pub async fn history(&self, job_id: &str, range: MetricsRange) -> Result<Vec<Value>, ApiError> {
        let path = format!("/jobs/{}/metrics", segment(job_id));
        self.client
            .send(ApiRequest::get(path).query(range.to_pairs()))
            .await
    }
}
