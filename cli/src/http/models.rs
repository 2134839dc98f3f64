//! HTTP API data models, shared by the backend handlers and the REST client.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use statelink_core::api::State;

use super::state::{BackendError, ErrorEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResponse {
    pub state: State,
}

/// Body of `POST /api/state`. Kept as a raw string so unknown names reach the
/// error log instead of failing JSON extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateRequest {
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorsResponse {
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub state: State,
    pub observers: usize,
    pub uptime_seconds: f64,
    pub requests_handled: u64,
    pub requests_by_endpoint: HashMap<String, u64>,
    pub timestamp: String,
}

/// Error body returned with any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug)]
pub enum HttpServerError {
    InvalidState(String),
    InvalidTransition(String),
}

impl From<BackendError> for HttpServerError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::UnknownState(_) => Self::InvalidState(err.to_string()),
            BackendError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (error_code, message) = match self {
            Self::InvalidState(msg) => ("INVALID_STATE", msg),
            Self::InvalidTransition(msg) => ("INVALID_TRANSITION", msg),
        };

        let body = ErrorBody {
            error: message,
            error_code: Some(error_code.to_string()),
        };

        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
