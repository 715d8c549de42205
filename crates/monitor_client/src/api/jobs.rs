use std::collections::BTreeMap;

use bytes::Bytes;
use monitor_core::model::{Job, JobAnalysis, JobDetail, JobGroup, JobStats, Page};
use monitor_core::{BatchAccepted, BatchProgress, JobListView};
use serde_json::{json, Value};

use crate::gateway::segment;
use crate::{ApiClient, ApiError, ApiRequest};

/// Which main jobs an analysis CSV export covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    /// Every job matching the current filters.
    Filtered,
    /// Only the current page.
    Page,
    /// The listed job ids.
    Selected(Vec<String>),
}

impl ExportScope {
    fn as_str(&self) -> &'static str {
        match self {
            ExportScope::Filtered => "filtered",
            ExportScope::Page => "page",
            ExportScope::Selected(_) => "selected",
        }
    }
}

pub struct JobsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> JobsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, view: &JobListView) -> Result<Page<Job>, ApiError> {
        let request = ApiRequest::get("/jobs").query(view.to_request_pairs());
        self.client.send(request).await
    }

    /// Jobs grouped by process group, one row per main process.
    pub async fn grouped(&self, view: &JobListView) -> Result<Page<JobGroup>, ApiError> {
        let request = ApiRequest::get("/jobs/grouped").query(view.to_request_pairs());
        self.client.send(request).await
    }

    pub async fn card_counts(&self) -> Result<Vec<u32>, ApiError> {
        self.client
            .send(ApiRequest::get("/jobs/grouped/card-counts"))
            .await
    }

    pub async fn stats(&self) -> Result<JobStats, ApiError> {
        self.client.send(ApiRequest::get("/jobs/stats")).await
    }

    /// Job detail; with `aggregate` the server folds child processes into the main job.
    pub async fn get(&self, job_id: &str, aggregate: bool) -> Result<JobDetail, ApiError> {
        let path = format!("/jobs/{}", segment(job_id));
        let mut request = ApiRequest::get(path);
        if !aggregate {
            request = request.query([("aggregate", "false")]);
        }
        self.client.send(request).await
    }

    pub async fn parameters(&self, job_id: &str) -> Result<Vec<Value>, ApiError> {
        let path = format!("/jobs/{}/parameters", segment(job_id));
        self.client.send(ApiRequest::get(path)).await
    }

    pub async fn code(&self, job_id: &str) -> Result<Vec<Value>, ApiError> {
        let path = format!("/jobs/{}/code", segment(job_id));
        self.client.send(ApiRequest::get(path)).await
    }

    /// Run AI analysis for one job and wait for the result.
    ///
    /// Uses the long analyze timeout rather than the client default.
    pub async fn analyze(&self, job_id: &str, model_id: Option<&str>) -> Result<Value, ApiError> {
        let path = format!("/jobs/{}/analyze", segment(job_id));
        let mut request =
            ApiRequest::post(path).timeout(self.client.settings().analyze_timeout);
        if let Some(model_id) = model_id.map(str::trim).filter(|id| !id.is_empty()) {
            request = request.json(&json!({ "modelId": model_id }))?;
        }
        self.client.send(request).await
    }

    pub async fn analysis(&self, job_id: &str) -> Result<JobAnalysis, ApiError> {
        let path = format!("/jobs/{}/analysis", segment(job_id));
        self.client.send(ApiRequest::get(path)).await
    }

    /// Stored analysis summaries keyed by job id; jobs without one are absent.
    pub async fn analyses(&self, job_ids: &[String]) -> Result<BTreeMap<String, Value>, ApiError> {
        if job_ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let request = ApiRequest::get("/jobs/analyses")
            .query(job_ids.iter().map(|id| ("jobIds", id.clone())));
        self.client.send(request).await
    }

    /// Analysis overview as CSV bytes.
    pub async fn export_analyses_csv(
        &self,
        view: &JobListView,
        scope: &ExportScope,
    ) -> Result<Bytes, ApiError> {
        if let ExportScope::Selected(ids) = scope {
            if ids.is_empty() {
                return Err(ApiError::Http {
                    status: 400,
                    message: "jobIds is required when scope=selected".to_string(),
                    details: None,
                });
            }
        }

        let mut request = ApiRequest::get("/jobs/analyses/export")
            .query([("scope", scope.as_str())])
            .query(view.to_request_pairs());
        if let ExportScope::Selected(ids) = scope {
            request = request.query(ids.iter().map(|id| ("jobIds", id.clone())));
        }
        self.client.send_bytes(request).await
    }

    pub async fn start_batch_analysis(&self, job_ids: &[String]) -> Result<BatchAccepted, ApiError> {
        let request = ApiRequest::post("/jobs/batch-analyze").json(&json!({ "jobIds": job_ids }))?;
        self.client.send(request).await
    }

    pub async fn batch_progress(&self, batch_id: &str) -> Result<BatchProgress, ApiError> {
        let path = format!("/jobs/batch-analyze/{}", segment(batch_id));
        self.client.send(ApiRequest::get(path)).await
    }

    pub async fn cancel_batch_analysis(&self, batch_id: &str) -> Result<(), ApiError> {
        let path = format!("/jobs/batch-analyze/{}/cancel", segment(batch_id));
        let _: Value = self.client.send(ApiRequest::post(path)).await?;
        Ok(())
    }
}
