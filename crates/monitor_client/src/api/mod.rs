//! Typed wrappers for the monitoring API endpoints.
mod auth;
mod config;
mod jobs;
mod metrics;
mod nodes;

pub use auth::AuthApi;
pub use config::ConfigApi;
pub use jobs::{ExportScope, JobsApi};
pub use metrics::{MetricsApi, MetricsRange};
pub use nodes::NodesApi;

use crate::ApiClient;

impl ApiClient {
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn jobs(&self) -> JobsApi<'_> {
        JobsApi::new(self)
    }

    pub fn nodes(&self) -> NodesApi<'_> {
        NodesApi::new(self)
    }

    pub fn metrics(&self) -> MetricsApi<'_> {
        MetricsApi::new(self)
    }

    pub fn config(&self) -> ConfigApi<'_> {
        ConfigApi::new(self)
    }
}
