//! Session maintenance endpoint.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use tracing::{error, info};

use crate::AppState;
use crate::error::RelayError;

use super::chat::session_id_or_default;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /api/clear - reset one session's conversation history.
pub async fn clear_handler(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let session_id = session_id_or_default(request.session_id);

    state.store.clear(&session_id).await.map_err(|err| {
        error!(session_id = %session_id, "failed to clear conversation: {err:#}");
        RelayError::Storage(err)
    })?;

    state.metrics.record_session_cleared();
    info!(session_id = %session_id, "conversation cleared");
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_camel_case_session_id() {
        let request: ClearRequest = serde_json::from_str(r#"{"sessionId":"reef"}"#).unwrap();
        assert_eq!(request.session_id.as_deref(), Some("reef"));
    }

    #[test]
    fn empty_body_clears_the_default_session() {
        let request: ClearRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.session_id, None);
    }
}
