//! Remote automation driver
//!
//! The engine never touches a browser directly; it issues commands to a
//! remote automation endpoint (a headless-browser service reached through
//! the resolved proxy credentials) and consumes command results. Every
//! command carries a caller-specified timeout, and exceeding it is reported
//! as a timeout distinct from a remote-side error.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::DriverError;

/// Command/result interface to the remote browser driver.
///
/// `search` returns the ordered candidate result hrefs; `click` and
/// `navigate` return the final page URL so the caller can verify arrival.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    async fn search(&self, keyword: &str, timeout: Duration) -> Result<Vec<String>, DriverError>;
    async fn click(&self, url: &str, timeout: Duration) -> Result<String, DriverError>;
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<String, DriverError>;
    async fn health(&self, timeout: Duration) -> Result<(), DriverError>;
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    links: Vec<String>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationResponse {
    final_url: String,
}

/// HTTP implementation of [`AutomationDriver`] against the remote
/// automation endpoint.
pub struct HttpDriver {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpDriver {
    /// Create a driver for one session's resolved endpoint and credentials.
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DriverError::Connection(format!("failed to create client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn classify(err: reqwest::Error) -> DriverError {
        if err.is_timeout() {
            DriverError::Timeout(err.to_string())
        } else if err.is_connect() {
            DriverError::Connection(err.to_string())
        } else {
            DriverError::Remote(err.to_string())
        }
    }

    async fn post_command(
        &self,
        path: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<reqwest::Response, DriverError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Automation command POST {} ({:?})", url, timeout);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;

        if !response.status().is_success() {
            return Err(DriverError::Remote(format!(
                "{} returned HTTP {}",
                path,
                response.status()
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl AutomationDriver for HttpDriver {
    async fn search(&self, keyword: &str, timeout: Duration) -> Result<Vec<String>, DriverError> {
        let response = self
            .post_command(
                "/api/search",
                serde_json::json!({ "keyword": keyword }),
                timeout,
            )
            .await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| DriverError::InvalidResponse(format!("search response: {}", e)))?;

        Ok(parsed.links)
    }

    async fn click(&self, url: &str, timeout: Duration) -> Result<String, DriverError> {
        let response = self
            .post_command("/api/click", serde_json::json!({ "url": url }), timeout)
            .await?;

        let parsed: NavigationResponse = response
            .json()
            .await
            .map_err(|e| DriverError::InvalidResponse(format!("click response: {}", e)))?;

        Ok(parsed.final_url)
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<String, DriverError> {
        let response = self
            .post_command("/api/navigate", serde_json::json!({ "url": url }), timeout)
            .await?;

        let parsed: NavigationResponse = response
            .json()
            .await
            .map_err(|e| DriverError::InvalidResponse(format!("navigate response: {}", e)))?;

        Ok(parsed.final_url)
    }

    async fn health(&self, timeout: Duration) -> Result<(), DriverError> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(timeout)
            .send()
            .await
            .map_err(Self::classify)?;

        if !response.status().is_success() {
            return Err(DriverError::Remote(format!(
                "health returned HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}
