//! Top-level conversation orchestration
//!
//! One logical task handles one turn, and the stages within a turn are
//! strictly sequential: generate, classify, relay, extract, persist.
//! Extraction and persistence need the complete generated text, so nothing
//! here races a partially delivered stream. Two turns on different sessions
//! only ever contend at the store's counter increment.

use crate::classify::CompletionClassifier;
use crate::context::{continuation_instruction, AttachedFile, ContextBuilder};
use crate::engine::EngineConfig;
use crate::error::{ParlanceError, Result};
use crate::extract::extract_artifacts;
use crate::generator::{GenerateOptions, Generator, GeneratorOutput};
use crate::ids::{MessageId, Role, SessionId};
use crate::relay::{RelayConfig, RelayOutcome, StreamRelay, TurnEvent};
use crate::store::{
    allocate_message_id, keys, latest_assistant_message, load_messages, load_session,
    save_artifact, save_message, save_session, MessageRecord, SessionRecord, Store,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one turn, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Pending,
    Generating,
    Classifying,
    Persisted,
    Failed,
}

impl TurnState {
    fn advance(&mut self, next: TurnState, session: &SessionId) {
        tracing::debug!(session = %session, from = ?self, to = ?next, "turn state");
        *self = next;
    }
}

/// A live turn: ids known up front, the event stream, and an abort switch
pub struct TurnHandle {
    /// The session this turn belongs to (freshly created when `start_turn`
    /// was called without one)
    pub session_id: SessionId,
    /// The persisted user message id; `None` for continuations, which do
    /// not add a user message
    pub user_message_id: Option<MessageId>,
    /// Ordered turn events; closes after `done` or `error`
    pub events: mpsc::Receiver<TurnEvent>,
    cancel: CancellationToken,
}

impl TurnHandle {
    /// Abort the turn: no further content is forwarded and no assistant
    /// message is persisted. The user message persisted at turn start is
    /// retained.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Receive the next event, or `None` once the stream closed
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        self.events.recv().await
    }
}

/// The conversation engine's public entry points
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use parlance::engine::{ConversationOrchestrator, EngineConfig};
/// use parlance::generator::ScriptedGenerator;
/// use parlance::store::MemoryStore;
///
/// # async fn example() -> parlance::error::Result<()> {
/// let orchestrator = ConversationOrchestrator::new(
///     Arc::new(MemoryStore::new()),
///     Arc::new(ScriptedGenerator::new()),
///     EngineConfig::default(),
/// );
/// let mut turn = orchestrator.start_turn(None, "hello", vec![]).await?;
/// while let Some(event) = turn.next_event().await {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConversationOrchestrator {
    store: Arc<dyn Store>,
    generator: Arc<dyn Generator>,
    context: ContextBuilder,
    classifier: CompletionClassifier,
    relay_config: RelayConfig,
    sampling: GenerateOptions,
    channel_capacity: usize,
}

impl ConversationOrchestrator {
    /// Wire the engine together
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn Generator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            generator,
            context: ContextBuilder::new(config.context),
            classifier: CompletionClassifier::new(config.classifier),
            relay_config: config.relay,
            sampling: config.sampling,
            channel_capacity: config.channel_capacity,
        }
    }

    /// Start a new turn: persist the user message, then generate a reply
    ///
    /// When `session` is `None` a new session is created. The user message
    /// (with file descriptors, never file bytes) is persisted before
    /// generation begins, so history is durable even if generation fails.
    /// The assistant message id is allocated only after successful
    /// classification and arrives in the `completion-status` event.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown session and `StoreUnavailable`
    /// when the user turn cannot be persisted. Generation failures are not
    /// errors here; they surface as an `error` event on the stream.
    pub async fn start_turn(
        &self,
        session: Option<SessionId>,
        user_text: &str,
        files: Vec<AttachedFile>,
    ) -> Result<TurnHandle> {
        let mut session_record = match session {
            Some(id) => load_session(self.store.as_ref(), &id).await?,
            None => {
                let record = SessionRecord::new(SessionId::allocate());
                save_session(self.store.as_ref(), &record).await?;
                tracing::info!(session = %record.id, "created session");
                record
            }
        };
        let session_id = session_record.id.clone();

        // The user turn is durable before the generator is ever invoked.
        let user_message_id =
            allocate_message_id(self.store.as_ref(), &session_id, Role::User).await?;
        let user_record = MessageRecord {
            id: user_message_id,
            session_id: session_id.clone(),
            role: Role::User,
            content: user_text.to_string(),
            attached_files: files.iter().map(|f| f.descriptor.clone()).collect(),
            artifact_ids: vec![],
            created_at: Utc::now(),
        };
        save_message(self.store.as_ref(), &user_record).await?;
        session_record.note_message(user_text);
        save_session(self.store.as_ref(), &session_record).await?;
        tracing::info!(session = %session_id, message = %user_message_id, "persisted user turn");

        let (handle, relay, cancel) = self.open_turn(&session_id, Some(user_message_id));
        let worker = self.worker();
        tokio::spawn(async move {
            worker
                .run_turn(relay, cancel, session_id, files, None)
                .await;
        });
        Ok(handle)
    }

    /// Extend the session's latest assistant message in place
    ///
    /// The server never trusts a client-supplied message id here; the
    /// continuation always targets the latest assistant message. On success
    /// `prior_partial_text` and the newly generated text are concatenated,
    /// artifacts are re-extracted over the combined document, and the
    /// existing message record is overwritten under its original id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` (with no store writes) when the session or a
    /// prior assistant message does not exist.
    pub async fn continue_turn(
        &self,
        session_id: &SessionId,
        prior_partial_text: &str,
    ) -> Result<TurnHandle> {
        load_session(self.store.as_ref(), session_id).await?;
        let target = latest_assistant_message(self.store.as_ref(), session_id)
            .await?
            .ok_or_else(|| {
                ParlanceError::NotFound(format!("assistant message in {}", session_id))
            })?;
        tracing::info!(session = %session_id, message = %target.id, "continuing assistant turn");

        let (handle, relay, cancel) = self.open_turn(session_id, None);
        let worker = self.worker();
        let session_id = session_id.clone();
        let prior = prior_partial_text.to_string();
        tokio::spawn(async move {
            worker
                .run_turn(relay, cancel, session_id, vec![], Some((target, prior)))
                .await;
        });
        Ok(handle)
    }

    fn open_turn(
        &self,
        session_id: &SessionId,
        user_message_id: Option<MessageId>,
    ) -> (TurnHandle, StreamRelay, CancellationToken) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let cancel = CancellationToken::new();
        let handle = TurnHandle {
            session_id: session_id.clone(),
            user_message_id,
            events: rx,
            cancel: cancel.clone(),
        };
        (handle, StreamRelay::new(tx, self.relay_config.clone()), cancel)
    }

    fn worker(&self) -> TurnWorker {
        TurnWorker {
            store: Arc::clone(&self.store),
            generator: Arc::clone(&self.generator),
            context: self.context.clone(),
            classifier: self.classifier.clone(),
            sampling: self.sampling.clone(),
        }
    }
}

/// Everything one spawned turn task needs, detached from the orchestrator
struct TurnWorker {
    store: Arc<dyn Store>,
    generator: Arc<dyn Generator>,
    context: ContextBuilder,
    classifier: CompletionClassifier,
    sampling: GenerateOptions,
}

impl TurnWorker {
    /// Drive one turn to completion, reporting every outcome on the stream
    ///
    /// `continuation` carries the target assistant message and the caller's
    /// prior partial text; `None` means a fresh turn.
    async fn run_turn(
        &self,
        relay: StreamRelay,
        cancel: CancellationToken,
        session_id: SessionId,
        files: Vec<AttachedFile>,
        continuation: Option<(MessageRecord, String)>,
    ) {
        let mut state = TurnState::Pending;

        if !relay.open(&session_id).await {
            return;
        }

        state.advance(TurnState::Generating, &session_id);
        let output = match self
            .generate(&session_id, &files, continuation.as_ref())
            .await
        {
            Ok(output) => output,
            Err(err) => {
                state.advance(TurnState::Failed, &session_id);
                relay.fail(&err).await;
                return;
            }
        };

        state.advance(TurnState::Classifying, &session_id);
        let new_text = output.text();
        let verdict =
            self.classifier
                .classify(&new_text, output.done, output.done_reason.as_deref());

        if relay.relay_content(&output.chunks, &cancel).await != RelayOutcome::Delivered {
            // Aborted or disconnected: nothing may be persisted.
            tracing::info!(session = %session_id, "turn abandoned before persistence");
            return;
        }
        if cancel.is_cancelled() {
            tracing::info!(session = %session_id, "turn aborted after relay");
            return;
        }

        let persisted = match continuation {
            None => self.persist_fresh(&session_id, &new_text).await,
            Some((target, prior)) => {
                self.persist_continuation(&session_id, target, &prior, &new_text)
                    .await
            }
        };

        match persisted {
            Ok(message_id) => {
                state.advance(TurnState::Persisted, &session_id);
                relay.finish(verdict, message_id).await;
            }
            Err(err) => {
                state.advance(TurnState::Failed, &session_id);
                // The generated text is not silently lost: record its size so
                // operators can correlate a retry with this failure.
                tracing::error!(
                    session = %session_id,
                    generated_chars = new_text.chars().count(),
                    error = %err,
                    "assistant turn generated but not persisted"
                );
                relay.fail(&err).await;
            }
        }
    }

    async fn generate(
        &self,
        session_id: &SessionId,
        files: &[AttachedFile],
        continuation: Option<&(MessageRecord, String)>,
    ) -> Result<GeneratorOutput> {
        let history = load_messages(self.store.as_ref(), session_id).await?;
        let context = match continuation {
            None => self.context.build(&history, files, None),
            Some((target, prior)) => {
                // Full prior history minus the incomplete assistant turn,
                // plus the synthetic resume instruction.
                let trimmed: Vec<MessageRecord> = history
                    .into_iter()
                    .filter(|m| m.id != target.id)
                    .collect();
                let instruction = continuation_instruction(prior);
                self.context.build(&trimmed, &[], Some(&instruction))
            }
        };
        self.generator.generate(&context, &self.sampling).await
    }

    /// Persist a brand-new assistant message with its artifacts
    async fn persist_fresh(&self, session_id: &SessionId, text: &str) -> Result<MessageId> {
        let message_id =
            allocate_message_id(self.store.as_ref(), session_id, Role::Assistant).await?;
        let artifacts = extract_artifacts(message_id, text);
        for artifact in &artifacts {
            save_artifact(self.store.as_ref(), session_id, artifact).await?;
        }

        let record = MessageRecord {
            id: message_id,
            session_id: session_id.clone(),
            role: Role::Assistant,
            content: text.to_string(),
            attached_files: vec![],
            artifact_ids: artifacts.iter().map(|a| a.id).collect(),
            created_at: Utc::now(),
        };
        save_message(self.store.as_ref(), &record).await?;

        let mut session = load_session(self.store.as_ref(), session_id).await?;
        session.note_message(text);
        save_session(self.store.as_ref(), &session).await?;
        tracing::info!(
            session = %session_id,
            message = %message_id,
            artifacts = record.artifact_ids.len(),
            "persisted assistant turn"
        );
        Ok(message_id)
    }

    /// Overwrite the continued assistant message with the combined text
    ///
    /// Artifact ids are deterministic, so re-extraction overwrites matching
    /// occurrence indices in place; stale indices past the new count are
    /// deleted rather than left behind.
    async fn persist_continuation(
        &self,
        session_id: &SessionId,
        mut target: MessageRecord,
        prior: &str,
        new_text: &str,
    ) -> Result<MessageId> {
        let combined = format!("{}{}", prior, new_text);
        let artifacts = extract_artifacts(target.id, &combined);
        for artifact in &artifacts {
            save_artifact(self.store.as_ref(), session_id, artifact).await?;
        }
        let new_count = artifacts.len() as u64;
        for stale in target
            .artifact_ids
            .iter()
            .filter(|id| id.index() > new_count)
        {
            self.store
                .delete(&keys::artifact(session_id, stale))
                .await?;
            tracing::debug!(artifact = %stale, "removed stale artifact after continuation");
        }

        target.content = combined.clone();
        target.artifact_ids = artifacts.iter().map(|a| a.id).collect();
        save_message(self.store.as_ref(), &target).await?;

        let mut session = load_session(self.store.as_ref(), session_id).await?;
        session.note_rewrite(&combined);
        save_session(self.store.as_ref(), &session).await?;
        tracing::info!(
            session = %session_id,
            message = %target.id,
            artifacts = target.artifact_ids.len(),
            "overwrote continued assistant turn"
        );
        Ok(target.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScriptedGenerator;
    use crate::store::MemoryStore;

    fn orchestrator(
        store: Arc<MemoryStore>,
        generator: Arc<ScriptedGenerator>,
    ) -> ConversationOrchestrator {
        ConversationOrchestrator::new(store, generator, EngineConfig::default())
    }

    async fn collect(handle: &mut TurnHandle) -> Vec<TurnEvent> {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_start_turn_creates_session_when_none_given() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_text("hi there.");

        let orchestrator = orchestrator(Arc::clone(&store), generator);
        let mut handle = orchestrator.start_turn(None, "hello", vec![]).await.unwrap();
        assert_eq!(handle.user_message_id.unwrap().to_string(), "user(1)");

        let events = collect(&mut handle).await;
        assert!(matches!(events.first(), Some(TurnEvent::SessionId { .. })));
        assert!(matches!(events.last(), Some(TurnEvent::Done)));

        let session = load_session(store.as_ref(), &handle.session_id)
            .await
            .unwrap();
        assert_eq!(session.message_count, 2);
    }

    #[tokio::test]
    async fn test_start_turn_unknown_session_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = orchestrator(store, generator);

        let missing = SessionId::parse("chat(12345)").unwrap();
        let err = orchestrator
            .start_turn(Some(missing), "hello", vec![])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParlanceError>(),
            Some(ParlanceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_continue_turn_without_assistant_fails_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let orchestrator = orchestrator(Arc::clone(&store), generator);

        // A session with only a user message
        let record = SessionRecord::new(SessionId::allocate());
        save_session(store.as_ref(), &record).await.unwrap();
        let keys_before = store.list("").await.unwrap();

        let err = orchestrator
            .continue_turn(&record.id, "partial")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParlanceError>(),
            Some(ParlanceError::NotFound(_))
        ));
        assert_eq!(store.list("").await.unwrap(), keys_before);
    }

    #[tokio::test]
    async fn test_abort_skips_assistant_persistence() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_text("a reply that will never be persisted.");

        let orchestrator = orchestrator(Arc::clone(&store), generator);
        let handle = orchestrator.start_turn(None, "hello", vec![]).await.unwrap();
        let session_id = handle.session_id.clone();
        handle.abort();

        // Drain whatever made it through before the abort
        let mut handle = handle;
        while handle.next_event().await.is_some() {}

        let messages = load_messages(store.as_ref(), &session_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }
}
