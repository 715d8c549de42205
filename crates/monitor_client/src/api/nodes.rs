use monitor_core::model::{Node, NodeStats};

use crate::gateway::segment;
use crate::{ApiClient, ApiError, ApiRequest};

pub struct NodesApi<'a> {
    client: &'a ApiClient,
}

impl<'a> NodesApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// All nodes, optionally narrowed to one status (`active`, `inactive`, `error`).
    pub async fn list(&self, status: Option<&str>) -> Result<Vec<Node>, ApiError> {
        let request =
            ApiRequest::get("/nodes").query(status.map(|status| ("status", status.to_string())));
        self.client.send(request).await
    }

    pub async fn get(&self, node_id: &str) -> Result<Node, ApiError> {
        let path = format!("/nodes/{}", segment(node_id));
        self.client.send(ApiRequest::get(path)).await
    }

    pub async fn stats(&self) -> Result<NodeStats, ApiError> {
        self.client.send(ApiRequest::get("/nodes/stats")).await
    }
}
