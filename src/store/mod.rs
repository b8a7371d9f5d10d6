//! Durable ordered storage for sessions, messages, artifacts, and counters
//!
//! The engine sees storage only through the [`Store`] trait: a key-value
//! interface with an atomic increment primitive and prefix listing. All
//! records are addressed by deterministic keys derived from their ids, so no
//! range queries beyond prefix listing are needed.
//!
//! Two implementations ship with the crate: [`SledStore`] for production and
//! [`MemoryStore`] as an in-crate fake for tests.

use crate::error::{ParlanceError, Result};
use crate::ids::{MessageId, Role, SessionId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

mod memory;
pub mod reconcile;
mod sled;
pub mod types;

pub use self::memory::MemoryStore;
pub use self::sled::SledStore;
pub use types::{
    preview_of, ArtifactRecord, FileDescriptor, MessageRecord, SessionRecord, PREVIEW_CHARS,
};

/// Abstract key-value store interface
///
/// Counter cells touched by `atomic_increment` are the only mutable-shared
/// state in the system; implementations must make the increment atomic and
/// totally ordered per key.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically increment the counter at `key` and return the new value
    ///
    /// A missing cell counts as zero, so the first increment returns 1.
    async fn atomic_increment(&self, key: &str) -> Result<i64>;

    /// Write a value, replacing any existing value at `key`
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Read the value at `key`, if present
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// List all keys starting with `prefix`, in lexicographic order
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete the value at `key`; deleting an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Deterministic key derivation for every record kind
pub mod keys {
    use crate::ids::{ArtifactId, MessageId, Role, SessionId};

    /// Prefix under which all session records live
    pub const SESSION_PREFIX: &str = "session/";

    /// Key of a session record
    pub fn session(id: &SessionId) -> String {
        format!("session/{}", id)
    }

    /// Key of a message record
    pub fn message(session: &SessionId, id: &MessageId) -> String {
        format!("message/{}/{}", session, id)
    }

    /// Prefix listing every message of a session
    pub fn message_prefix(session: &SessionId) -> String {
        format!("message/{}/", session)
    }

    /// Key of an artifact record
    pub fn artifact(session: &SessionId, id: &ArtifactId) -> String {
        format!("artifact/{}/{}", session, id)
    }

    /// Prefix listing every artifact of a session
    pub fn artifact_prefix(session: &SessionId) -> String {
        format!("artifact/{}/", session)
    }

    /// Key of the per-(session, role) sequence counter
    pub fn counter(session: &SessionId, role: Role) -> String {
        format!("counter/{}/{}", session, role)
    }

    /// Prefix listing every counter of a session
    pub fn counter_prefix(session: &SessionId) -> String {
        format!("counter/{}/", session)
    }
}

/// Read and deserialize a JSON record
pub async fn get_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                ParlanceError::StoreUnavailable(format!("corrupt record at {}: {}", key, e))
            })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and write a JSON record
pub async fn put_json<T: Serialize>(store: &dyn Store, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| ParlanceError::StoreUnavailable(format!("serialize {}: {}", key, e)))?;
    store.put(key, &bytes).await
}

/// Load a session record, or `NotFound`
pub async fn load_session(store: &dyn Store, id: &SessionId) -> Result<SessionRecord> {
    get_json(store, &keys::session(id))
        .await?
        .ok_or_else(|| ParlanceError::NotFound(id.to_string()).into())
}

/// Persist a session record
pub async fn save_session(store: &dyn Store, record: &SessionRecord) -> Result<()> {
    put_json(store, &keys::session(&record.id), record).await
}

/// Persist a message record
pub async fn save_message(store: &dyn Store, record: &MessageRecord) -> Result<()> {
    put_json(store, &keys::message(&record.session_id, &record.id), record).await
}

/// Persist an artifact record
pub async fn save_artifact(
    store: &dyn Store,
    session: &SessionId,
    record: &ArtifactRecord,
) -> Result<()> {
    put_json(store, &keys::artifact(session, &record.id), record).await
}

/// Load every message of a session in conversation order
///
/// Keys are prefix-listable but not lexicographically ordered by sequence
/// (`user(10)` sorts before `user(2)` as a string), so ordering is recovered
/// from the records: by creation time, with the per-role sequence number as
/// tie-break.
pub async fn load_messages(store: &dyn Store, session: &SessionId) -> Result<Vec<MessageRecord>> {
    let mut records = Vec::new();
    for key in store.list(&keys::message_prefix(session)).await? {
        if let Some(record) = get_json::<MessageRecord>(store, &key).await? {
            records.push(record);
        }
    }
    records.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.seq().cmp(&b.id.seq()))
            .then_with(|| role_rank(a.role).cmp(&role_rank(b.role)))
    });
    Ok(records)
}

// A user turn precedes the assistant turn it prompted when timestamps tie.
fn role_rank(role: Role) -> u8 {
    match role {
        Role::User => 0,
        Role::Assistant => 1,
    }
}

/// The most recent assistant message of a session, if any
pub async fn latest_assistant_message(
    store: &dyn Store,
    session: &SessionId,
) -> Result<Option<MessageRecord>> {
    let messages = load_messages(store, session).await?;
    Ok(messages
        .into_iter()
        .filter(|m| m.role == Role::Assistant)
        .max_by_key(|m| m.id.seq()))
}

/// Load one artifact record by id
pub async fn load_artifact(
    store: &dyn Store,
    session: &SessionId,
    id: &crate::ids::ArtifactId,
) -> Result<Option<ArtifactRecord>> {
    get_json(store, &keys::artifact(session, id)).await
}

/// List all sessions, newest first by the timestamp embedded in their ids
pub async fn list_sessions(store: &dyn Store) -> Result<Vec<SessionRecord>> {
    let mut sessions = Vec::new();
    for key in store.list(keys::SESSION_PREFIX).await? {
        if let Some(record) = get_json::<SessionRecord>(store, &key).await? {
            sessions.push(record);
        }
    }
    sessions.sort_by_key(|s| std::cmp::Reverse(s.id.millis()));
    Ok(sessions)
}

/// Delete a session and every descendant record
///
/// Removes the session record, its messages, its artifacts, and its
/// counters. Purging an absent session is not an error.
pub async fn purge_session(store: &dyn Store, session: &SessionId) -> Result<usize> {
    let mut removed = 0usize;
    for prefix in [
        keys::message_prefix(session),
        keys::artifact_prefix(session),
        keys::counter_prefix(session),
    ] {
        for key in store.list(&prefix).await? {
            store.delete(&key).await?;
            removed += 1;
        }
    }
    let session_key = keys::session(session);
    if store.get(&session_key).await?.is_some() {
        store.delete(&session_key).await?;
        removed += 1;
    }
    tracing::info!(session = %session, removed, "purged session");
    Ok(removed)
}

/// Allocate the next message id for a (session, role) pair
///
/// Thin wrapper over [`crate::ids::next_message_id`] kept here so store
/// callers have the whole persistence surface in one module.
pub async fn allocate_message_id(
    store: &dyn Store,
    session: &SessionId,
    role: Role,
) -> Result<MessageId> {
    crate::ids::next_message_id(store, session, role).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_save_and_load_session() {
        let store = MemoryStore::new();
        let record = SessionRecord::new(SessionId::allocate());
        save_session(&store, &record).await.unwrap();

        let loaded = load_session(&store, &record.id).await.unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.message_count, 0);
    }

    #[tokio::test]
    async fn test_load_session_not_found() {
        let store = MemoryStore::new();
        let missing = SessionId::parse("chat(1)").unwrap();
        let err = load_session(&store, &missing).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ParlanceError>(),
            Some(ParlanceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_messages_sorted_by_time_not_key_order() {
        let store = MemoryStore::new();
        let session = SessionId::allocate();
        let base = Utc::now();

        // Sequence 10 written before sequence 2 but created later; key order
        // would put user(10) first.
        for (seq, offset) in [(2u64, 0i64), (10u64, 5i64)] {
            let record = MessageRecord {
                id: MessageId::new(Role::User, seq),
                session_id: session.clone(),
                role: Role::User,
                content: format!("message {}", seq),
                attached_files: vec![],
                artifact_ids: vec![],
                created_at: base + chrono::Duration::seconds(offset),
            };
            save_message(&store, &record).await.unwrap();
        }

        let messages = load_messages(&store, &session).await.unwrap();
        assert_eq!(messages[0].id.seq(), 2);
        assert_eq!(messages[1].id.seq(), 10);
    }

    #[tokio::test]
    async fn test_latest_assistant_message() {
        let store = MemoryStore::new();
        let session = SessionId::allocate();
        let base = Utc::now();

        for (role, seq) in [(Role::User, 1u64), (Role::Assistant, 1), (Role::User, 2)] {
            let record = MessageRecord {
                id: MessageId::new(role, seq),
                session_id: session.clone(),
                role,
                content: String::new(),
                attached_files: vec![],
                artifact_ids: vec![],
                created_at: base,
            };
            save_message(&store, &record).await.unwrap();
        }

        let latest = latest_assistant_message(&store, &session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id.to_string(), "assistant(1)");
    }

    #[tokio::test]
    async fn test_latest_assistant_message_none() {
        let store = MemoryStore::new();
        let session = SessionId::allocate();
        assert!(latest_assistant_message(&store, &session)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_purge_session_removes_descendants() {
        let store = MemoryStore::new();
        let session = SessionId::allocate();

        let record = SessionRecord::new(session.clone());
        save_session(&store, &record).await.unwrap();

        let message = MessageRecord {
            id: MessageId::new(Role::User, 1),
            session_id: session.clone(),
            role: Role::User,
            content: "hello".to_string(),
            attached_files: vec![],
            artifact_ids: vec![],
            created_at: Utc::now(),
        };
        save_message(&store, &message).await.unwrap();
        allocate_message_id(&store, &session, Role::User)
            .await
            .unwrap();

        let removed = purge_session(&store, &session).await.unwrap();
        assert_eq!(removed, 3);
        assert!(store.list("").await.unwrap().is_empty());

        // Idempotent on an already-purged session
        assert_eq!(purge_session(&store, &session).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first() {
        let store = MemoryStore::new();
        let older = SessionId::parse("chat(1000)").unwrap();
        let newer = SessionId::parse("chat(2000)").unwrap();
        save_session(&store, &SessionRecord::new(older.clone()))
            .await
            .unwrap();
        save_session(&store, &SessionRecord::new(newer.clone()))
            .await
            .unwrap();

        let sessions = list_sessions(&store).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, newer);
        assert_eq!(sessions[1].id, older);
    }
}
