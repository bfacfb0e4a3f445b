//! Streaming chat endpoint.

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::error;

use crate::AppState;
use crate::error::RelayError;
use crate::relay::{RelayEvent, RelaySession};

/// Session used when a client does not name one.
pub const DEFAULT_SESSION_ID: &str = "default-session";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub(crate) fn session_id_or_default(explicit: Option<String>) -> String {
    explicit
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
}

/// POST /api/chat - relay one message and stream the reply.
///
/// Deltas go out as `data: {"content": ...}` events followed by a
/// terminal `data: [DONE]`. Failures before the backend accepts the call
/// surface as plain status codes instead of a stream.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, RelayError> {
    let session_id = session_id_or_default(request.session_id);
    let session = RelaySession::new(
        state.store.clone(),
        state.backend.clone(),
        state.metrics.clone(),
        state.system_prompt.clone(),
        session_id,
    );

    let events = session.run(request.message).await.map_err(|err| {
        if let RelayError::Storage(source) | RelayError::Backend(source) = &err {
            error!("chat request failed: {source:#}");
        }
        err
    })?;

    // Delta text rides inside a JSON object, so the payload never
    // contains a raw newline and each event stays a single data line.
    let stream = events.map(|event| {
        let event = match event {
            RelayEvent::Delta(text) => {
                Event::default().data(serde_json::json!({ "content": text }).to_string())
            }
            RelayEvent::Done => Event::default().data("[DONE]"),
        };
        Ok(event)
    });
    Ok(Sse::new(stream))
}
