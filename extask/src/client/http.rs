use super::engine::EngineClient;
use super::error::{ClientError, Result};
use crate::core::VariableDtoMap;
use crate::protocol::{
    BpmnErrorRequest, CompleteRequest, ErrorResponse, ExtendLockRequest, FailureRequest,
    FetchAndLockRequest, LockRequest, LockedExternalTaskDto, SetVariablesRequest,
};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Extra read time granted on top of the long-poll timeout.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to an engine's REST API with reqwest.
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEngineClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self::with_client(http, base_url))
    }

    /// Uses a preconfigured reqwest client (proxies, TLS roots, headers).
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Response> {
        let response = self
            .http
            .post(self.url(path))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    async fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.post(path, body, REQUEST_TIMEOUT).await.map(|_| ())
    }
}

fn transport_error(error: reqwest::Error) -> ClientError {
    if error.is_decode() {
        ClientError::Protocol(error.to_string())
    } else {
        ClientError::Connectivity(error.to_string())
    }
}

/// Maps non-2xx responses onto the client error taxonomy.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or_else(|_| if body.is_empty() { status.to_string() } else { body });
    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::LockConflict(message),
        StatusCode::BAD_REQUEST => ClientError::BadRequest(message),
        s if s.is_server_error() => ClientError::Engine(format!("{}: {}", s, message)),
        s => ClientError::Protocol(format!("unexpected status {}: {}", s, message)),
    })
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn fetch_and_lock(&self, request: FetchAndLockRequest) -> Result<Vec<LockedExternalTaskDto>> {
        let timeout = request
            .async_response_timeout
            .map(|ms| Duration::from_millis(ms) + LONG_POLL_GRACE)
            .unwrap_or(REQUEST_TIMEOUT);
        let sent = self
            .http
            .post(self.url("/external-task/fetchAndLock"))
            .timeout(timeout)
            .json(&request)
            .send()
            .await;
        let response = match sent {
            Ok(response) => check_status(response).await?,
            Err(e) if e.is_timeout() && request.async_response_timeout.is_some() => {
                // A timed out long poll means no work
                debug!("Fetch and lock returned no response in time: {}", e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(transport_error(e)),
        };
        response
            .json::<Vec<LockedExternalTaskDto>>()
            .await
            .map_err(|e| ClientError::Protocol(format!("malformed fetch and lock response: {}", e)))
    }

    async fn complete(&self, task_id: &str, request: CompleteRequest) -> Result<()> {
        self.post_empty(&format!("/external-task/{}/complete", task_id), &request)
            .await
    }

    async fn handle_failure(&self, task_id: &str, request: FailureRequest) -> Result<()> {
        self.post_empty(&format!("/external-task/{}/failure", task_id), &request)
            .await
    }

    async fn handle_bpmn_error(&self, task_id: &str, request: BpmnErrorRequest) -> Result<()> {
        self.post_empty(&format!("/external-task/{}/bpmnError", task_id), &request)
            .await
    }

    async fn extend_lock(&self, task_id: &str, request: ExtendLockRequest) -> Result<()> {
        self.post_empty(&format!("/external-task/{}/extendLock", task_id), &request)
            .await
    }

    async fn lock(&self, task_id: &str, request: LockRequest) -> Result<()> {
        self.post_empty(&format!("/external-task/{}/lock", task_id), &request)
            .await
    }

    async fn unlock(&self, task_id: &str) -> Result<()> {
        self.post_empty(&format!("/external-task/{}/unlock", task_id), &serde_json::json!({}))
            .await
    }

    async fn set_variables(&self, process_instance_id: &str, variables: VariableDtoMap) -> Result<()> {
        let body = SetVariablesRequest {
            modifications: variables,
        };
        self.post_empty(
            &format!("/process-instance/{}/variables", process_instance_id),
            &body,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_dropped() {
        let client = HttpEngineClient::new("http://localhost:8080/engine-rest/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/engine-rest");
        assert_eq!(
            client.url("/external-task/fetchAndLock"),
            "http://localhost:8080/engine-rest/external-task/fetchAndLock"
        );
    }
}
