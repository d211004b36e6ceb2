use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use workbench_core::{ServiceError, WorkbenchConfig};

use crate::errors::ConfigError;

const USER_AGENT: &str = concat!("workbench/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP plumbing for the service layer: one pooled client, the base
/// URL and the optional bearer token.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ServiceClient {
    pub fn new(config: &WorkbenchConfig) -> Result<Self, ConfigError> {
        if config.api_base_url.trim().is_empty() {
            return Err(ConfigError::Missing("WORKBENCH_API_BASE_URL"));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config
                .api_token
                .clone()
                .filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Posts `body` as JSON and returns the response once its status is a
    /// success.
    pub async fn send<B>(
        &self,
        service: &str,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ServiceError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        debug!(service, url = %url, "calling service");
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::transport(service, format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(status_error(service, status.as_u16(), &text))
    }

    /// Posts `body` and decodes the JSON response.
    pub async fn post_json<B, R>(&self, service: &str, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(service, path, body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::transport(service, format!("reading response failed: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::protocol(service, format!("unexpected response body: {e}")))
    }
}

/// Maps a non-success status to the service error taxonomy.
pub(crate) fn status_error(service: &str, status: u16, body: &str) -> ServiceError {
    if status == 401 || status == 403 {
        return ServiceError::unauthorized(service);
    }
    ServiceError::status(service, status, error_message(body))
}

/// Prefers the `error`/`message` field of a JSON error body.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = parsed.as_ref().and_then(|v| {
        v.get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(|m| m.as_str())))
            .or_else(|| v.get("message").and_then(|m| m.as_str()))
    });
    match field {
        Some(message) => message.to_string(),
        None if body.trim().is_empty() => "<empty body>".to_string(),
        None => body.trim().to_string(),
    }
}
