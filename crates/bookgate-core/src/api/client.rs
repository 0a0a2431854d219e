//! API client for communicating with the library server's REST API.
//!
//! This module provides the `ApiClient` struct. Protected calls go through
//! the request pipeline; the login and registration endpoints are public and
//! bypass it.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, Request};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::auth::{Credential, Identity, SessionHandle};
use crate::config::Config;

use super::endpoints::{
    ApiMessage, AuthApi, LoginRequest, LoginResponse, RegisterRequest, LOGIN_PATH, REGISTER_PATH,
    USER_INFO_PATH,
};
use super::pipeline::{AuthEvent, Pipeline};
use super::ApiError;

/// Whether a call carries the session credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Stamped on the way out, watched for rejection on the way back
    Protected,
    /// Sent as-is; a 401 is an ordinary failure
    Public,
}

/// API client for the library server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    pipeline: Pipeline,
}

impl ApiClient {
    /// Create a new API client bound to `session`
    pub fn new(config: &Config, session: SessionHandle) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pipeline: Pipeline::new(session),
        })
    }

    /// Receive session events such as [`AuthEvent::LoginRequired`].
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.pipeline.subscribe()
    }

    pub fn session(&self) -> &SessionHandle {
        self.pipeline.session()
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn build<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Request, ApiError> {
        let mut builder = self.client.request(method, self.url(path));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn dispatch<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
        let url = request.url().to_string();
        let response = self.client.execute(request).await?;
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        // Empty bodies decode as JSON null so unit and Option targets work.
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: Request,
        access: Access,
    ) -> Result<T, ApiError> {
        match access {
            Access::Protected => {
                let (request, sent_with) = self.pipeline.outbound(request);
                debug!(
                    method = %request.method(),
                    url = %request.url(),
                    authenticated = sent_with.is_some(),
                    "Sending request"
                );
                let result = self.dispatch(request).await;
                self.pipeline.handle(result, sent_with.as_ref())
            }
            Access::Public => {
                debug!(method = %request.method(), url = %request.url(), "Sending public request");
                self.dispatch(request).await
            }
        }
    }

    // ===== Protected calls =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.build::<()>(Method::GET, path, None)?;
        self.execute(request, Access::Protected).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.build(Method::POST, path, Some(body))?;
        self.execute(request, Access::Protected).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.build(Method::PUT, path, Some(body))?;
        self.execute(request, Access::Protected).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.build::<()>(Method::DELETE, path, None)?;
        self.execute(request, Access::Protected).await
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn authenticate(&self, request: &LoginRequest) -> Result<Credential, ApiError> {
        let http = self.build(Method::POST, LOGIN_PATH, Some(request))?;
        let response: LoginResponse = self.execute(http, Access::Public).await?;
        Credential::new(response.token)
            .map_err(|e| ApiError::InvalidResponse(format!("Login response: {}", e)))
    }

    async fn register(&self, request: &RegisterRequest) -> Result<Option<String>, ApiError> {
        let http = self.build(Method::POST, REGISTER_PATH, Some(request))?;
        let response: Option<ApiMessage> = self.execute(http, Access::Public).await?;
        Ok(response.and_then(|m| m.message))
    }

    async fn fetch_identity(&self) -> Result<Identity, ApiError> {
        self.get(USER_INFO_PATH).await
    }
}
