//! Relay orchestration: one client message in, one backend generation
//! streamed back out, one committed exchange.
//!
//! A [`RelaySession`] walks a fixed lifecycle. It persists the user turn,
//! reads the session history back, opens the backend stream, then hands
//! off to a spawned pump that reassembles frames and forwards deltas
//! through a bounded channel. Whatever text accumulated is committed as
//! the assistant turn on every exit path, clean or not.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use sse_wire::{FrameEvent, FrameReassembler, parse_frame};

use crate::backend::{ChatBackend, ChatMessage, ChunkStream};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::store::{ConversationStore, Role, Turn};

/// Deltas buffered between the backend pump and a slow client before the
/// pump suspends. Bounds memory under a stalled client without adding
/// latency to a healthy one.
pub const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Events delivered to the client stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Delta(String),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayPhase {
    Idle,
    AwaitingHistory,
    StreamingBackend,
    Forwarding,
    Finalizing,
    Closed,
    Failed,
}

/// How the backend stream ended, from the pump's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    /// Backend closed the stream without a sentinel.
    Ended,
    /// Terminal sentinel seen; later frames are ignored.
    Done,
    /// Backend errored mid-stream or broke framing.
    BackendError,
    /// Client stopped reading; the rest of the generation is moot.
    ClientGone,
}

/// What to do after forwarding one frame.
enum Step {
    Continue,
    Done,
    ClientGone,
}

/// One relayed generation, bound to one session.
pub struct RelaySession {
    store: Arc<ConversationStore>,
    backend: Arc<dyn ChatBackend>,
    metrics: Arc<RelayMetrics>,
    system_prompt: String,
    session_id: String,
    phase: RelayPhase,
}

impl RelaySession {
    pub fn new(
        store: Arc<ConversationStore>,
        backend: Arc<dyn ChatBackend>,
        metrics: Arc<RelayMetrics>,
        system_prompt: String,
        session_id: String,
    ) -> Self {
        Self {
            store,
            backend,
            metrics,
            system_prompt,
            session_id,
            phase: RelayPhase::Idle,
        }
    }

    fn transition(&mut self, next: RelayPhase) {
        debug!(
            session_id = %self.session_id,
            from = ?self.phase,
            to = ?next,
            "relay phase"
        );
        self.phase = next;
    }

    fn fail(&mut self) {
        self.metrics.record_request_failed();
        self.transition(RelayPhase::Failed);
    }

    /// Validate the message, persist the user turn, open the backend
    /// stream, and spawn the forwarding pump.
    ///
    /// Resolves with the client event stream once the backend has accepted
    /// the call. Every failure before that point means no client stream
    /// was ever opened, so the caller can still answer with a plain status
    /// code. The user turn is persisted before the backend call and stays
    /// persisted even if that call fails.
    pub async fn run(mut self, message: String) -> Result<ReceiverStream<RelayEvent>, RelayError> {
        self.metrics.record_request_started();

        if message.is_empty() {
            self.fail();
            return Err(RelayError::InvalidRequest);
        }

        self.transition(RelayPhase::AwaitingHistory);
        if let Err(err) = self
            .store
            .append(&self.session_id, Turn::new(Role::User, message))
            .await
        {
            self.fail();
            return Err(RelayError::Storage(err));
        }
        let history = match self.store.history(&self.session_id).await {
            Ok(history) => history,
            Err(err) => {
                self.fail();
                return Err(RelayError::Storage(err));
            }
        };

        let mut messages: Vec<ChatMessage> = history.iter().map(ChatMessage::from).collect();
        if messages.len() == 1 {
            // First exchange of a session leads with the system prompt.
            // It shapes the generation but never enters the stored log.
            messages.insert(
                0,
                ChatMessage {
                    role: Role::System,
                    content: self.system_prompt.clone(),
                },
            );
        }

        self.transition(RelayPhase::StreamingBackend);
        let stream = match self.backend.open_stream(&messages).await {
            Ok(stream) => stream,
            Err(err) => {
                self.fail();
                return Err(RelayError::Backend(err));
            }
        };

        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            self.pump(stream, tx).await;
        });
        Ok(ReceiverStream::new(rx))
    }

    /// Drain the backend stream, forwarding deltas as they complete.
    async fn pump(mut self, mut stream: ChunkStream, tx: mpsc::Sender<RelayEvent>) {
        self.transition(RelayPhase::Forwarding);

        let mut frames = FrameReassembler::new();
        let mut accumulated = String::new();
        let mut outcome = StreamOutcome::Ended;

        'stream: while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!(session_id = %self.session_id, "backend stream failed: {err:#}");
                    outcome = StreamOutcome::BackendError;
                    break 'stream;
                }
            };
            if let Err(err) = frames.push(&chunk) {
                warn!(session_id = %self.session_id, "dropping backend stream: {err}");
                outcome = StreamOutcome::BackendError;
                break 'stream;
            }
            while let Some(frame) = frames.next_frame() {
                match self.forward(&frame, &mut accumulated, &tx).await {
                    Step::Continue => {}
                    Step::Done => {
                        outcome = StreamOutcome::Done;
                        break 'stream;
                    }
                    Step::ClientGone => {
                        outcome = StreamOutcome::ClientGone;
                        break 'stream;
                    }
                }
            }
        }

        // A backend that closes without a trailing newline still gets its
        // last frame delivered.
        if matches!(outcome, StreamOutcome::Ended) {
            if let Some(frame) = frames.finish() {
                match self.forward(&frame, &mut accumulated, &tx).await {
                    Step::Continue => {}
                    Step::Done => outcome = StreamOutcome::Done,
                    Step::ClientGone => outcome = StreamOutcome::ClientGone,
                }
            }
        }

        self.finalize(outcome, accumulated, tx).await;
    }

    /// Forward one complete frame. Malformed frames are logged and
    /// skipped; only the terminal sentinel or a vanished client stops the
    /// stream.
    async fn forward(
        &self,
        frame: &str,
        accumulated: &mut String,
        tx: &mpsc::Sender<RelayEvent>,
    ) -> Step {
        match parse_frame(frame) {
            FrameEvent::Delta(text) => {
                accumulated.push_str(&text);
                if tx.send(RelayEvent::Delta(text)).await.is_err() {
                    debug!(session_id = %self.session_id, "client went away mid-stream");
                    return Step::ClientGone;
                }
                self.metrics.record_delta_forwarded();
                Step::Continue
            }
            FrameEvent::Done => Step::Done,
            FrameEvent::Skip => Step::Continue,
            FrameEvent::Malformed => {
                debug!(session_id = %self.session_id, frame, "skipping malformed frame");
                self.metrics.record_malformed_frame();
                Step::Continue
            }
        }
    }

    async fn finalize(
        mut self,
        outcome: StreamOutcome,
        accumulated: String,
        tx: mpsc::Sender<RelayEvent>,
    ) {
        self.transition(RelayPhase::Finalizing);

        if !matches!(outcome, StreamOutcome::ClientGone) {
            // Best effort: the client may vanish between frames.
            let _ = tx.send(RelayEvent::Done).await;
        }

        // Commit whatever text accumulated, even when the stream ended
        // badly or produced nothing. A later turn needs this context.
        // `tx` stays alive until the commit lands, so the client seeing
        // end-of-stream implies the assistant turn is durable.
        if let Err(err) = self
            .store
            .append(&self.session_id, Turn::new(Role::Assistant, accumulated))
            .await
        {
            error!(session_id = %self.session_id, "failed to commit assistant turn: {err:#}");
            self.metrics.record_request_failed();
            self.transition(RelayPhase::Failed);
            return;
        }

        match outcome {
            StreamOutcome::Done | StreamOutcome::Ended => self.metrics.record_request_completed(),
            StreamOutcome::BackendError | StreamOutcome::ClientGone => {
                self.metrics.record_request_failed()
            }
        }
        self.transition(RelayPhase::Closed);
    }
}
