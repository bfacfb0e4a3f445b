//! API-visible error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failures a chat or clear request can surface to the client.
///
/// Only pre-stream failures reach the client as status codes; once the
/// event stream is open, errors finalize the stream instead.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("message is required")]
    InvalidRequest,

    #[error("conversation storage failed")]
    Storage(anyhow::Error),

    #[error("inference backend request failed")]
    Backend(anyhow::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::InvalidRequest => StatusCode::BAD_REQUEST,
            RelayError::Storage(_) | RelayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.to_string();
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_maps_to_400() {
        let response = RelayError::InvalidRequest.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_and_backend_failures_map_to_500() {
        let storage = RelayError::Storage(anyhow::anyhow!("disk full")).into_response();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let backend = RelayError::Backend(anyhow::anyhow!("connect refused")).into_response();
        assert_eq!(backend.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
