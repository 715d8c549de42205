use std::time::Duration;

/// Environment variable overriding [`ClientSettings::base_url`].
pub const BASE_URL_ENV: &str = "TASK_MONITOR_API_BASE_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Absolute URL of the API root, e.g. `http://host:8080/api/v1`.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applied to every call unless the call overrides it.
    pub request_timeout: Duration,
    /// Used by the single-job analyze call, which waits on the LLM.
    pub analyze_timeout: Duration,
    /// Period of the batch-analysis progress poll.
    pub poll_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            analyze_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl ClientSettings {
    /// Defaults, with the base URL taken from the environment when set.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            let base_url = base_url.trim();
            if !base_url.is_empty() {
                settings.base_url = base_url.to_string();
            }
        }
        settings
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
