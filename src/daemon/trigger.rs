use super::manager::Manager;
use super::webhook::authenticate;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use log::{debug, error, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::task;

#[derive(Debug, Clone)]
pub struct TriggerRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub status_code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerResponse {
    pub status: StatusCode,
}

impl TriggerResponse {
    fn new(status: StatusCode) -> TriggerResponse {
        TriggerResponse { status }
    }

    pub fn payload(&self) -> StatusPayload {
        StatusPayload { status_code: self.status.as_u16() }
    }
}

impl IntoResponse for TriggerResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.payload())).into_response()
    }
}

/// Looks `name` up, authenticates the request against its webhooks and runs
/// an update.
pub async fn handle_trigger(
    manager: &Manager,
    name: &str,
    request: TriggerRequest,
) -> TriggerResponse {
    debug!("Received update request for {}", name);

    let repo = match manager.lookup(name) {
        Ok(repo) => repo,
        Err(error) => {
            warn!("Update request rejected: {error}");
            return TriggerResponse::new(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if !repo.webhooks().is_empty() {
        match authenticate(repo.webhooks(), &request.method, &request.headers, &request.body) {
            Ok(webhook) => debug!("Webhook '{}' authenticated update of {}", webhook.name, name),
            Err(error) => {
                warn!("Webhook authentication failed for {}: {error}", name);
                return TriggerResponse::new(StatusCode::UNAUTHORIZED);
            }
        }
    }

    let worker = Arc::clone(&repo);
    match task::spawn_blocking(move || worker.update()).await {
        Ok(Ok(())) => TriggerResponse::new(StatusCode::OK),
        Ok(Err(error)) => {
            warn!("Failed updating {}: {error}", name);
            TriggerResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(error) => {
            error!("Update task for {} panicked: {error}", name);
            TriggerResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
