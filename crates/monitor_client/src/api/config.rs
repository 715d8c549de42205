use monitor_core::model::{LlmConfig, LlmConfigUpdate};

use crate::{ApiClient, ApiError, ApiRequest};

pub struct ConfigApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ConfigApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn llm(&self) -> Result<LlmConfig, ApiError> {
        self.client.send(ApiRequest::get("/config/llm")).await
    }

    pub async fn update_llm(&self, update: &LlmConfigUpdate) -> Result<LlmConfig, ApiError> {
        let request = ApiRequest::put("/config/llm").json(update)?;
        self.client.send(request).await
    }
}
