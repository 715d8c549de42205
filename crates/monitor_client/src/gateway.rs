use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use monitor_core::is_auth_path;
use monitor_logging::{monitor_debug, monitor_warn};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::map_reqwest_error;
use crate::session::{Expiry, SessionContext};
use crate::{ApiError, ClientSettings};

/// One outbound call, described before the gateway decides whether to send it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append query pairs; repeated keys are sent repeated.
    pub fn query<K, V, I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body).map_err(|err| ApiError::Decode {
            message: err.to_string(),
        })?;
        self.body = Some(body);
        Ok(self)
    }

    /// Override the client-wide timeout for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

// Success body shape of every JSON endpoint: `{code, message, data}`. Only `data`
// reaches callers; an absent `data` decodes as `null`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Value,
}

/// Session-aware HTTP gateway. Every API call goes through [`ApiClient::send`]
/// or [`ApiClient::send_bytes`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    settings: ClientSettings,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(settings: ClientSettings, session: Arc<SessionContext>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            http,
            settings,
            session,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Send a JSON call and return the envelope's `data` decoded as `T`.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(&request).await?;
        let envelope: Envelope = response.json().await.map_err(map_reqwest_error)?;
        serde_json::from_value(envelope.data).map_err(|err| ApiError::Decode {
            message: format!("{} {}: {}", request.method, request.path, err),
        })
    }

    /// Send a call whose success body is binary; the body is returned unmodified.
    pub async fn send_bytes(&self, request: ApiRequest) -> Result<Bytes, ApiError> {
        let response = self.execute(&request).await?;
        response.bytes().await.map_err(map_reqwest_error)
    }

    async fn execute(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        // The token is captured now so a late 401 can be matched against the session it was sent under.
        let request_token = self.session.stored_token();
        if request_token.is_none() && !is_auth_path(&request.path) {
            monitor_warn!(
                "Blocked {} {}: no session token",
                request.method,
                request.path
            );
            return Err(ApiError::NotAuthenticated);
        }

        let mut builder = self
            .http
            .request(request.method.clone(), self.url_for(&request.path))
            .timeout(request.timeout.unwrap_or(self.settings.request_timeout));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = &request_token {
            builder = builder.bearer_auth(token);
        }

        monitor_debug!("{} {}", request.method, request.path);
        let response = builder.send().await.map_err(|err| {
            let err = map_reqwest_error(err);
            monitor_warn!("{} {} failed: {}", request.method, request.path, err);
            err
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // Error bodies are best effort: a missing or non-JSON body only loses the details.
        let details: Option<Value> = match response.bytes().await {
            Ok(body) => serde_json::from_slice(&body).ok(),
            Err(_) => None,
        };
        let server_message = details
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_string);

        if status == StatusCode::UNAUTHORIZED {
            return Err(self.unauthorized(request, request_token.as_deref(), server_message));
        }

        let message = server_message
            .unwrap_or_else(|| format!("request failed with status code {}", status.as_u16()));
        monitor_warn!(
            "{} {} returned {}: {}",
            request.method,
            request.path,
            status.as_u16(),
            message
        );
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
            details,
        })
    }

    fn unauthorized(
        &self,
        request: &ApiRequest,
        request_token: Option<&str>,
        server_message: Option<String>,
    ) -> ApiError {
        if is_auth_path(&request.path) {
            // The user is already on the login screen; this is a bad password, not an expiry.
            return ApiError::InvalidCredentials {
                message: server_message
                    .unwrap_or_else(|| "invalid username or password".to_string()),
            };
        }

        match self.session.expire(request_token) {
            Expiry::Stale => ApiError::RequestExpired,
            Expiry::Expired { .. } => ApiError::SessionExpired,
        }
    }

    fn url_for(&self, path: &str) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

/// Percent-encode a value for use as a single path segment.
pub(crate) fn segment(value: &str) -> String {
    monitor_core::encode_uri_component(value)
}
