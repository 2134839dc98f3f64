//! REST client for the backend's convenience endpoints.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use statelink_core::api::{CliError, State};

use crate::http::models::{ErrorBody, ErrorsResponse, SetStateRequest, StateResponse};
use crate::http::state::ErrorEntry;

const BODY_PREVIEW_LIMIT: usize = 256;

#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    server_url: String,
}

impl RemoteClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, CliError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CliError::Http(format!("build http client: {e}")))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET /api/state
    pub async fn get_state(&self) -> Result<State, CliError> {
        let url = format!("{}/api/state", self.server_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let body: StateResponse = decode(&url, response).await?;
        Ok(body.state)
    }

    /// POST /api/state. A rejection comes back as [`CliError::Http`] carrying
    /// the backend's own message.
    pub async fn set_state(&self, state: State) -> Result<State, CliError> {
        let url = format!("{}/api/state", self.server_url);
        tracing::debug!(target: "statelink.client", "POST {url} state={state}");

        let response = self
            .client
            .post(&url)
            .json(&SetStateRequest {
                state: state.to_string(),
            })
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let body: StateResponse = decode(&url, response).await?;
        Ok(body.state)
    }

    /// GET /api/errors
    pub async fn get_errors(&self) -> Result<Vec<ErrorEntry>, CliError> {
        let url = format!("{}/api/errors", self.server_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let body: ErrorsResponse = decode(&url, response).await?;
        Ok(body.errors)
    }

    pub async fn health_check(&self) -> Result<bool, CliError> {
        let url = format!("{}/health", self.server_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CliError::Http(format!("Health check failed: {e}")))?;

        Ok(response.status().is_success())
    }
}

fn send_error(url: &str, err: reqwest::Error) -> CliError {
    CliError::Http(format!("request to {url} failed: {err}"))
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, CliError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| CliError::Http(format!("read body from {url}: {e}")))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or_else(|_| preview_body(&text));
        return Err(CliError::Http(format!("{status}: {message}")));
    }

    serde_json::from_str(&text).map_err(|e| {
        CliError::Http(format!(
            "failed to decode response from {url}: {e} | body={}",
            preview_body(&text)
        ))
    })
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if trimmed.len() <= BODY_PREVIEW_LIMIT {
        return trimmed.to_string();
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use mockito::Server;
    use pretty_assertions::assert_eq;

    fn client_for(server: &Server) -> RemoteClient {
        RemoteClient::new(&server.url(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_remote_client_trims_trailing_slash() {
        let client = RemoteClient::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.server_url, "http://localhost:8000");
    }

    #[test]
    fn test_preview_body() {
        assert_eq!(preview_body("   "), "<empty body>");
        let long = "a".repeat(BODY_PREVIEW_LIMIT + 10);
        assert!(preview_body(&long).ends_with("..."));
    }

    #[tokio::test]
    async fn test_get_state() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/state")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"state":"READY"}"#)
            .create_async()
            .await;

        let state = client_for(&server).get_state().await.unwrap();
        assert_eq!(state, State::Ready);
    }

    #[tokio::test]
    async fn test_set_state_posts_name() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/api/state")
            .match_body(Matcher::Json(serde_json::json!({"state": "STANDBY"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"state":"STANDBY"}"#)
            .create_async()
            .await;

        let state = client_for(&server).set_state(State::Standby).await.unwrap();
        assert_eq!(state, State::Standby);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_state_surfaces_rejection() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api/state")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Invalid state transition from OFF to ACTIVE"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .set_state(State::Active)
            .await
            .unwrap_err();
        match err {
            CliError::Http(msg) => {
                assert!(msg.contains("400"));
                assert!(msg.contains("Invalid state transition from OFF to ACTIVE"));
            }
            other => panic!("Expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_errors() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/errors")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"errors":[{"timestamp":"2024-01-01T00:00:00","message":"Invalid state: WARP"}]}"#,
            )
            .create_async()
            .await;

        let errors = client_for(&server).get_errors().await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Invalid state: WARP");
    }

    #[tokio::test]
    async fn test_decode_failure_reports_body() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/state")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server).get_state().await.unwrap_err();
        assert!(err.to_string().contains("body=not json"));
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;

        assert!(!client_for(&server).health_check().await.unwrap());
    }
}
