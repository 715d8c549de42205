/// Durable storage key holding the bearer token.
pub const TOKEN_KEY: &str = "token";
/// Durable storage key holding the signed-in user name.
pub const USERNAME_KEY: &str = "username";
/// Per-tab storage key holding the in-flight batch analysis id.
pub const BATCH_ID_KEY: &str = "batch-analysis-id";

/// Client-side view of the signed-in user.
///
/// `token` is present exactly when the session is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    token: Option<String>,
    username: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            username: Some(username.into()),
        }
    }

    /// Rebuild a session from persisted fields. Both must be present.
    pub fn restore(token: Option<String>, username: Option<String>) -> Self {
        match (token, username) {
            (Some(token), Some(username)) => Self::authenticated(token, username),
            _ => Self::new(),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn clear(&mut self) {
        self.token = None;
        self.username = None;
    }
}
