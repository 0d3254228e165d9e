//! REST adapter for the backend request surface (reqwest)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use robodeck_shared::{ApiRequest, HttpMethod, RequestBody};

use crate::ports::outbound::{ApiError, RawApiPort};

/// Executes [`ApiRequest`]s against the backend base URL.
#[derive(Clone)]
pub struct ApiAdapter {
    client: Client,
    base_url: Url,
}

impl ApiAdapter {
    /// Fails if the HTTP client cannot be built (e.g. no TLS backend), rather
    /// than falling back to a client without the request timeout.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve the request path against the base URL, percent-encoding each
    /// segment (ids may contain `/`, spaces, ...).
    pub fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::Request(format!("base URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(request.path_segments());
        Ok(url)
    }
}

fn map_send_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Request(error.to_string())
    }
}

#[async_trait]
impl RawApiPort for ApiAdapter {
    async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let url = self.url_for(request)?;
        tracing::debug!(request = %request, "Calling backend");

        let builder = match request.method() {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        let builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Text(text) => builder.header(CONTENT_TYPE, "text/plain").body(text),
        };

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            tracing::warn!(
                request = %request,
                status = status.as_u16(),
                "Backend rejected request"
            );
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            // Intents only need the status; tolerate non-JSON acknowledgements.
            Err(_) if request.method() == HttpMethod::Post => Ok(Value::Null),
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }
}
