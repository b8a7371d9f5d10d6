//! Client event relay
//!
//! Republishes buffered generator output to a live client channel as an
//! ordered sequence of events. Each turn owns one sender, so the sequence
//! for a turn is total and never interleaves with another turn's events.
//!
//! The upstream exchange is buffer-then-replay: the full response is in hand
//! before relaying begins, and emission is paced with a small sleep after
//! every Nth chunk so a fast replay does not saturate the client connection.
//! Relaying chunks incrementally as a transport delivers them is a valid
//! strengthening; the event contract is unchanged either way.

use crate::classify::Completion;
use crate::error::{GeneratorErrorKind, ParlanceError};
use crate::ids::{MessageId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One client-visible event frame
///
/// Serialized as `{"event": "<name>", "data": {...}}`. For one turn the
/// order is: `session-id`, zero or more `content` deltas, one
/// `completion-status`, `continuation-available` when truncated, then
/// `done`. A failure replaces the remainder of the sequence with a single
/// `error` and the stream closes without `done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum TurnEvent {
    /// Opens every turn, before any content
    SessionId {
        /// The session this turn belongs to
        session_id: SessionId,
    },
    /// One incremental text delta (never cumulative text)
    Content {
        /// The delta chunk
        delta: String,
    },
    /// The classifier's verdict plus the persisted assistant message id
    CompletionStatus {
        /// Completion verdict
        status: Completion,
        /// Id of the assistant message that was persisted
        message_id: MessageId,
    },
    /// Offered when the verdict is apparently-truncated
    ContinuationAvailable {
        /// The message a continuation would extend
        message_id: MessageId,
    },
    /// Terminal sentinel of a successful turn
    Done,
    /// Terminal frame of a failed turn; no `done` follows
    Error {
        /// End-user-phrased description, never a raw upstream body
        message: String,
        /// Stable failure category for client dispatch
        category: String,
    },
}

impl TurnEvent {
    /// Build the user-presentable error frame for an engine failure
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ParlanceError>() {
            Some(ParlanceError::Generator { kind, .. }) => Self::Error {
                message: kind.user_message().to_string(),
                category: kind.to_string(),
            },
            Some(ParlanceError::GeneratorUnavailable(_)) => Self::Error {
                message: GeneratorErrorKind::Connectivity.user_message().to_string(),
                category: GeneratorErrorKind::Connectivity.to_string(),
            },
            Some(ParlanceError::MalformedOutput(_)) => Self::Error {
                message: "The model service returned an unreadable response.".to_string(),
                category: "malformed-output".to_string(),
            },
            Some(ParlanceError::StoreUnavailable(_)) => Self::Error {
                message: "The response could not be saved. Please try again.".to_string(),
                category: "store-unavailable".to_string(),
            },
            Some(ParlanceError::NotFound(what)) => Self::Error {
                message: format!("Nothing to continue: {} was not found.", what),
                category: "not-found".to_string(),
            },
            _ => Self::Error {
                message: "Something went wrong while generating the response.".to_string(),
                category: "internal".to_string(),
            },
        }
    }
}

/// Pacing knobs for the buffered replay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Number of content chunks emitted between pauses
    #[serde(default = "default_chunks_per_pause")]
    pub chunks_per_pause: usize,

    /// Pause length in milliseconds
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

fn default_chunks_per_pause() -> usize {
    8
}

fn default_pause_ms() -> u64 {
    15
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunks_per_pause: default_chunks_per_pause(),
            pause_ms: default_pause_ms(),
        }
    }
}

/// How a content relay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Every chunk was delivered
    Delivered,
    /// The turn was aborted mid-relay
    Cancelled,
    /// The client dropped its receiver
    Disconnected,
}

/// Paced republisher for one turn's events
pub struct StreamRelay {
    tx: mpsc::Sender<TurnEvent>,
    config: RelayConfig,
}

impl StreamRelay {
    /// Wrap a turn's sender with the given pacing
    pub fn new(tx: mpsc::Sender<TurnEvent>, config: RelayConfig) -> Self {
        Self { tx, config }
    }

    /// Send a single event; returns false when the client is gone
    pub async fn send(&self, event: TurnEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Emit the opening `session-id` frame
    pub async fn open(&self, session_id: &SessionId) -> bool {
        self.send(TurnEvent::SessionId {
            session_id: session_id.clone(),
        })
        .await
    }

    /// Replay buffered content chunks in order, pacing and honoring aborts
    ///
    /// Cancellation is checked between chunks: once the token fires, no
    /// further `content` events are forwarded.
    pub async fn relay_content(&self, chunks: &[String], cancel: &CancellationToken) -> RelayOutcome {
        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(delivered = i, total = chunks.len(), "relay aborted");
                return RelayOutcome::Cancelled;
            }

            let event = TurnEvent::Content {
                delta: chunk.clone(),
            };
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(delivered = i, total = chunks.len(), "relay aborted");
                    return RelayOutcome::Cancelled;
                }
                sent = self.tx.send(event) => {
                    if sent.is_err() {
                        tracing::debug!(delivered = i, "client receiver dropped");
                        return RelayOutcome::Disconnected;
                    }
                }
            }

            if self.config.chunks_per_pause > 0
                && (i + 1) % self.config.chunks_per_pause == 0
                && i + 1 < chunks.len()
            {
                tokio::time::sleep(Duration::from_millis(self.config.pause_ms)).await;
            }
        }
        RelayOutcome::Delivered
    }

    /// Emit the closing frames of a successful turn
    ///
    /// `completion-status`, then `continuation-available` when the verdict
    /// is apparently-truncated, then `done`.
    pub async fn finish(&self, status: Completion, message_id: MessageId) -> bool {
        let truncated = status.is_truncated();
        if !self
            .send(TurnEvent::CompletionStatus { status, message_id })
            .await
        {
            return false;
        }
        if truncated && !self.send(TurnEvent::ContinuationAvailable { message_id }).await {
            return false;
        }
        self.send(TurnEvent::Done).await
    }

    /// Emit the single terminal `error` frame; the stream closes without `done`
    pub async fn fail(&self, err: &anyhow::Error) {
        let event = TurnEvent::from_error(err);
        if let TurnEvent::Error { category, .. } = &event {
            tracing::error!(category = %category, error = %err, "turn failed");
        }
        let _ = self.tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Role;

    fn chunks(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk-{}", i)).collect()
    }

    async fn drain(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_full_turn_event_order() {
        let (tx, rx) = mpsc::channel(64);
        let relay = StreamRelay::new(tx, RelayConfig::default());
        let session = SessionId::allocate();
        let message_id = MessageId::new(Role::Assistant, 1);
        let cancel = CancellationToken::new();

        assert!(relay.open(&session).await);
        assert_eq!(
            relay.relay_content(&chunks(3), &cancel).await,
            RelayOutcome::Delivered
        );
        assert!(relay.finish(Completion::Finished, message_id).await);
        drop(relay);

        let events = drain(rx).await;
        assert_eq!(events.len(), 6);
        assert!(matches!(events[0], TurnEvent::SessionId { .. }));
        assert!(matches!(events[1], TurnEvent::Content { .. }));
        assert!(matches!(events[4], TurnEvent::CompletionStatus { .. }));
        assert_eq!(events[5], TurnEvent::Done);
    }

    #[tokio::test]
    async fn test_truncated_turn_offers_continuation_before_done() {
        let (tx, rx) = mpsc::channel(64);
        let relay = StreamRelay::new(tx, RelayConfig::default());
        let message_id = MessageId::new(Role::Assistant, 2);

        assert!(relay.finish(Completion::ApparentlyTruncated, message_id).await);
        drop(relay);

        let events = drain(rx).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], TurnEvent::CompletionStatus { .. }));
        assert_eq!(events[1], TurnEvent::ContinuationAvailable { message_id });
        assert_eq!(events[2], TurnEvent::Done);
    }

    #[tokio::test]
    async fn test_cancellation_stops_content() {
        let (tx, rx) = mpsc::channel(64);
        let relay = StreamRelay::new(tx, RelayConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            relay.relay_content(&chunks(5), &cancel).await,
            RelayOutcome::Cancelled
        );
        drop(relay);

        let events = drain(rx).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_receiver_reports_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let relay = StreamRelay::new(tx, RelayConfig::default());
        let cancel = CancellationToken::new();

        assert_eq!(
            relay.relay_content(&chunks(2), &cancel).await,
            RelayOutcome::Disconnected
        );
    }

    #[tokio::test]
    async fn test_fail_emits_error_without_done() {
        let (tx, rx) = mpsc::channel(8);
        let relay = StreamRelay::new(tx, RelayConfig::default());

        let err: anyhow::Error = ParlanceError::Generator {
            kind: GeneratorErrorKind::ModelNotFound,
            message: "404 body".to_string(),
        }
        .into();
        relay.fail(&err).await;
        drop(relay);

        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            TurnEvent::Error { message, category } => {
                assert_eq!(category, "model-not-found");
                // User-phrased, not the raw upstream body
                assert!(!message.contains("404 body"));
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[test]
    fn test_event_names_on_the_wire() {
        let event = TurnEvent::SessionId {
            session_id: SessionId::parse("chat(1699999999999)").unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "session-id");
        assert_eq!(json["data"]["session_id"], "chat(1699999999999)");

        let json = serde_json::to_value(TurnEvent::Done).unwrap();
        assert_eq!(json["event"], "done");

        let json = serde_json::to_value(TurnEvent::Content {
            delta: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "content");
        assert_eq!(json["data"]["delta"], "hi");

        let json = serde_json::to_value(TurnEvent::ContinuationAvailable {
            message_id: MessageId::new(Role::Assistant, 3),
        })
        .unwrap();
        assert_eq!(json["event"], "continuation-available");
    }

    #[test]
    fn test_store_error_category() {
        let err: anyhow::Error = ParlanceError::StoreUnavailable("flush".into()).into();
        match TurnEvent::from_error(&err) {
            TurnEvent::Error { category, .. } => assert_eq!(category, "store-unavailable"),
            other => panic!("expected error event, got {:?}", other),
        }
    }
}
