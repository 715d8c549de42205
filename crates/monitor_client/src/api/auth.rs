use monitor_core::model::{LoginRequest, LoginResponse, User};
use serde_json::{json, Value};

use crate::{ApiClient, ApiError, ApiRequest};

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Sign in and make the returned token the active session.
    ///
    /// A rejected password surfaces as [`ApiError::InvalidCredentials`] and leaves
    /// the current session untouched.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest::post("/auth/login").json(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let response: LoginResponse = self.client.send(request).await?;
        self.client
            .session()
            .establish(&response.token, &response.username)?;
        Ok(response)
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        self.client.session().logout()?;
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.client.send(ApiRequest::get("/auth/me")).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.client.send(ApiRequest::get("/users")).await
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let request = ApiRequest::post("/users").json(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        self.client.send(request).await
    }

    pub async fn change_password(&self, user_id: u64, password: &str) -> Result<(), ApiError> {
        let path = format!("/users/{user_id}/password");
        let request = ApiRequest::put(path).json(&json!({ "password": password }))?;
        let _: Value = self.client.send(request).await?;
        Ok(())
    }

    pub async fn delete_user(&self, user_id: u64) -> Result<(), ApiError> {
        let path = format!("/users/{user_id}");
        let _: Value = self.client.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}
