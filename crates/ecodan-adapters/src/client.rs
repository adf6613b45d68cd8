// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::errors::{AdapterError, AdapterResult};

/// Base URL and basic auth credentials of one service
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl ServiceEndpoint {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Override fields from `{prefix}_BASE_URL`, `{prefix}_USERNAME` and `{prefix}_PASSWORD`
    pub fn apply_env(&mut self, prefix: &str) {
        if let Ok(url) = std::env::var(format!("{prefix}_BASE_URL")) {
            self.base_url = url;
        }
        if let Ok(username) = std::env::var(format!("{prefix}_USERNAME")) {
            self.username = username;
        }
        if let Ok(password) = std::env::var(format!("{prefix}_PASSWORD")) {
            self.password = password;
        }
    }
}

/// JSON over HTTP with basic auth, shared by all service adapters
#[derive(Clone)]
pub struct ServiceClient {
    service: String,
    base_url: String,
    username: String,
    password: String,
    client: Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub fn new(service: impl Into<String>, endpoint: &ServiceEndpoint) -> AdapterResult<Self> {
        let service = service.into();
        if endpoint.base_url.is_empty() {
            return Err(AdapterError::ConfigError(format!(
                "No base URL configured for {service}"
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AdapterError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            service,
            base_url: endpoint.base_url.trim_end_matches('/').to_owned(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone(),
            client,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Set custom retry configuration
    #[must_use]
    pub fn with_retry_config(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET a JSON document
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AdapterResult<T> {
        self.get_optional_json(path, query)
            .await?
            .ok_or_else(|| AdapterError::NotFound(format!("{} {path}", self.service)))
    }

    /// GET a JSON document, `None` on 404
    pub async fn get_optional_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AdapterResult<Option<T>> {
        let url = self.url(path);
        debug!("🔍 [{}] GET {url}", self.service);
        trace!("   Query: {query:?}");

        let response = self
            .retry_request(|| async {
                self.client
                    .get(&url)
                    .basic_auth(&self.username, Some(&self.password))
                    .query(query)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                trace!("   Body: {body}");
                Ok(Some(serde_json::from_str(&body)?))
            }
            StatusCode::NOT_FOUND => {
                debug!("[{}] {path} not found", self.service);
                Ok(None)
            }
            status => Err(self.status_error(status, response).await),
        }
    }

    /// PUT a JSON body, expecting any success status
    pub async fn put_json(&self, path: &str, body: &Value) -> AdapterResult<()> {
        let url = self.url(path);
        debug!("📞 [{}] PUT {url} {body}", self.service);

        let response = self
            .retry_request(|| async {
                self.client
                    .put(&url)
                    .basic_auth(&self.username, Some(&self.password))
                    .json(body)
                    .send()
                    .await
            })
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(self.status_error(status, response).await)
    }

    async fn status_error(&self, status: StatusCode, response: reqwest::Response) -> AdapterError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!("❌ [{}] Authentication failed", self.service);
                AdapterError::AuthenticationFailed(self.service.clone())
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                error!("❌ [{}] Status {status}: {message}", self.service);
                AdapterError::ApiError {
                    service: self.service.clone(),
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut>(&self, mut request_fn: F) -> AdapterResult<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempts = 0;
        let mut delay = self.retry_delay;

        loop {
            attempts += 1;
            match request_fn().await {
                Ok(response) => return Ok(response),
                Err(e) if attempts >= self.max_retries => {
                    error!(
                        "[{}] Request failed after {attempts} attempts: {e}",
                        self.service
                    );
                    return Err(AdapterError::HttpError(e));
                }
                Err(e) => {
                    warn!(
                        "[{}] Request failed (attempt {attempts}/{}): {e}. Retrying in {delay:?}",
                        self.service, self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}
