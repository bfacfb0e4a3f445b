//! Inference backend client.
//!
//! The relay only ever sees [`ChatBackend`]: hand it a turn list, get
//! back a stream of raw byte chunks speaking the line-delimited `data:`
//! protocol. [`HttpChatBackend`] is the real implementation over HTTP.

use std::pin::Pin;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::debug;

use crate::config::BackendConfig;
use crate::store::{Role, Turn};

/// Raw backend output, chunked however the transport felt like chunking
/// it. Frame boundaries are the reassembler's problem.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Prompt-facing view of a turn: role and content only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// A streaming text-generation backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open one streaming generation over the given turn list.
    ///
    /// Resolves once the backend has accepted the call, so failures before
    /// any byte of output surface here rather than mid-stream.
    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream>;
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// HTTP implementation speaking the streaming generation protocol:
/// JSON request in, `data:`-framed chunks out.
pub struct HttpChatBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpChatBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        debug!(
            url = %self.config.url,
            messages = messages.len(),
            "opening backend stream"
        );

        let body = GenerationRequest {
            messages,
            stream: true,
            model: self.config.model.as_deref(),
        };
        let mut request = self.client.post(&self.config.url).json(&body);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Inference request to {} failed", self.config.url))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Inference backend returned {status}: {detail}");
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(anyhow::Error::from));
        Ok(Box::pin(stream))
    }
}

/// Scripted backend for tests: replays canned chunks and records every
/// turn list it was asked to generate from.
#[cfg(test)]
pub(crate) struct ScriptedBackend {
    chunks: Vec<std::result::Result<Vec<u8>, String>>,
    fail_open: bool,
    pub(crate) seen_messages: std::sync::Mutex<Vec<Vec<ChatMessage>>>,
}

#[cfg(test)]
impl ScriptedBackend {
    pub(crate) fn streaming(chunks: &[&[u8]]) -> Self {
        Self {
            chunks: chunks.iter().map(|chunk| Ok(chunk.to_vec())).collect(),
            fail_open: false,
            seen_messages: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Replays `chunks`, then fails the stream.
    pub(crate) fn failing_after(chunks: &[&[u8]], error: &str) -> Self {
        let mut scripted: Vec<std::result::Result<Vec<u8>, String>> =
            chunks.iter().map(|chunk| Ok(chunk.to_vec())).collect();
        scripted.push(Err(error.to_string()));
        Self {
            chunks: scripted,
            fail_open: false,
            seen_messages: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Refuses the request before any stream opens.
    pub(crate) fn refusing() -> Self {
        Self {
            chunks: Vec::new(),
            fail_open: true,
            seen_messages: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn last_seen_messages(&self) -> Vec<ChatMessage> {
        self.seen_messages
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_stream(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        self.seen_messages.lock().unwrap().push(messages.to_vec());
        if self.fail_open {
            anyhow::bail!("backend refused the request");
        }
        let items: Vec<Result<Vec<u8>>> = self
            .chunks
            .iter()
            .map(|chunk| match chunk {
                Ok(bytes) => Ok(bytes.clone()),
                Err(message) => Err(anyhow::anyhow!("{message}")),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
