//! Identifier allocation and validation
//!
//! Every session, message, and code artifact is addressable by a stable,
//! human-readable identifier with a fixed grammar:
//!
//! - sessions: `chat(<millis>)` with the creation timestamp embedded
//! - messages: `user(<n>)` / `assistant(<n>)` with a per-role sequence number
//! - artifacts: `<message-id>_code(<k>)` with a 1-based occurrence index
//!
//! Message sequence numbers are allocated through the store's atomic
//! increment primitive and are never cached in process memory, so two
//! orchestrator instances sharing a store cannot hand out the same number.

use crate::error::{ParlanceError, Result};
use crate::store::{keys, Store};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn session_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^chat\((\d{1,19})\)$").expect("session id grammar"))
}

fn message_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(user|assistant)\(([1-9]\d{0,18})\)$").expect("message id grammar")
    })
}

fn artifact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(user|assistant)\(([1-9]\d{0,18})\)_code\(([1-9]\d{0,18})\)$")
            .expect("artifact id grammar")
    })
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message sent by the user
    User,
    /// A message generated by the model
    Assistant,
}

impl Role {
    /// The role tag used in identifiers and store keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ParlanceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ParlanceError::InvalidIdentifier(format!(
                "unknown role tag: {}",
                other
            ))),
        }
    }
}

/// Kind selector for [`validate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// `chat(n)`
    Session,
    /// `user(n)` / `assistant(n)`
    Message,
    /// `user(n)_code(k)` / `assistant(n)_code(k)`
    Artifact,
}

/// Structural validation against the fixed identifier grammars
///
/// Used at every external boundary to reject malformed ids before they
/// reach the store.
///
/// # Examples
///
/// ```
/// use parlance::ids::{validate, IdKind};
///
/// assert!(validate("chat(1699999999999)", IdKind::Session));
/// assert!(validate("assistant(2)", IdKind::Message));
/// assert!(validate("assistant(2)_code(1)", IdKind::Artifact));
/// assert!(!validate("assistant(0)", IdKind::Message));
/// ```
pub fn validate(id: &str, kind: IdKind) -> bool {
    match kind {
        IdKind::Session => session_re().is_match(id),
        IdKind::Message => message_re().is_match(id),
        IdKind::Artifact => artifact_re().is_match(id),
    }
}

/// Identifier of one conversation session
///
/// Opaque to every component except [`SessionId::created_at`], which parses
/// the embedded creation timestamp back out for display and sorting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SessionId {
    millis: i64,
}

impl SessionId {
    /// Allocate a new session id from the current wall clock
    ///
    /// Time-derived and collision-resistant within the granularity of the
    /// clock (milliseconds).
    pub fn allocate() -> Self {
        Self {
            millis: Utc::now().timestamp_millis(),
        }
    }

    /// Parse and validate a session id string
    ///
    /// # Errors
    ///
    /// Returns `ParlanceError::InvalidIdentifier` if the string does not
    /// match the `chat(n)` grammar.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = session_re()
            .captures(s)
            .ok_or_else(|| ParlanceError::InvalidIdentifier(s.to_string()))?;
        let millis: i64 = caps[1]
            .parse()
            .map_err(|_| ParlanceError::InvalidIdentifier(s.to_string()))?;
        Ok(Self { millis })
    }

    /// The creation timestamp embedded in the id
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Millisecond value embedded in the id, used for sorting session lists
    pub fn millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat({})", self.millis)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SessionId {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s).map_err(|e| e.to_string())
    }
}

/// Identifier of one message within a session
///
/// Unique within its session; the sequence number is per-role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MessageId {
    role: Role,
    seq: u64,
}

impl MessageId {
    /// Build a message id from its parts
    pub fn new(role: Role, seq: u64) -> Self {
        Self { role, seq }
    }

    /// Parse and validate a message id string
    pub fn parse(s: &str) -> Result<Self> {
        let caps = message_re()
            .captures(s)
            .ok_or_else(|| ParlanceError::InvalidIdentifier(s.to_string()))?;
        let role: Role = caps[1].parse()?;
        let seq: u64 = caps[2]
            .parse()
            .map_err(|_| ParlanceError::InvalidIdentifier(s.to_string()))?;
        Ok(Self { role, seq })
    }

    /// The author role encoded in the id
    pub fn role(&self) -> Role {
        self.role
    }

    /// The per-role sequence number encoded in the id
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.role, self.seq)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for MessageId {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s).map_err(|e| e.to_string())
    }
}

/// Identifier of one code artifact extracted from a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ArtifactId {
    parent: MessageId,
    index: u64,
}

impl ArtifactId {
    /// Parse and validate an artifact id string
    pub fn parse(s: &str) -> Result<Self> {
        let caps = artifact_re()
            .captures(s)
            .ok_or_else(|| ParlanceError::InvalidIdentifier(s.to_string()))?;
        let role: Role = caps[1].parse()?;
        let seq: u64 = caps[2]
            .parse()
            .map_err(|_| ParlanceError::InvalidIdentifier(s.to_string()))?;
        let index: u64 = caps[3]
            .parse()
            .map_err(|_| ParlanceError::InvalidIdentifier(s.to_string()))?;
        Ok(Self {
            parent: MessageId::new(role, seq),
            index,
        })
    }

    /// The owning message id
    pub fn parent(&self) -> MessageId {
        self.parent
    }

    /// The 1-based occurrence index within the parent message
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_code({})", self.parent, self.index)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s).map_err(|e| e.to_string())
    }
}

/// Deterministic artifact id for an occurrence of a fenced block
///
/// Pure function of (parent message id, 1-based occurrence index); no store
/// access. Re-extracting unchanged content therefore reproduces the same
/// ids, and re-extracting changed content overwrites rather than duplicates.
///
/// # Examples
///
/// ```
/// use parlance::ids::{artifact_id, MessageId, Role};
///
/// let parent = MessageId::new(Role::Assistant, 2);
/// assert_eq!(artifact_id(parent, 1).to_string(), "assistant(2)_code(1)");
/// ```
pub fn artifact_id(parent: MessageId, occurrence_index: u64) -> ArtifactId {
    ArtifactId {
        parent,
        index: occurrence_index,
    }
}

/// Allocate the next message id for a (session, role) pair
///
/// Atomically increments the per-(session, role) counter in the store and
/// formats `<role>(<n>)`. Safe under concurrent callers for the same
/// session; the guarantee comes solely from the store's atomic increment,
/// not from any local locking.
///
/// # Errors
///
/// Returns `ParlanceError::StoreUnavailable` when the increment fails.
pub async fn next_message_id(
    store: &dyn Store,
    session: &SessionId,
    role: Role,
) -> Result<MessageId> {
    let key = keys::counter(session, role);
    let seq = store.atomic_increment(&key).await?;
    tracing::debug!(session = %session, role = %role, seq, "allocated message id");
    Ok(MessageId::new(role, seq as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::allocate();
        let parsed = SessionId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_session_id_embeds_timestamp() {
        let id = SessionId::parse("chat(1699999999999)").unwrap();
        assert_eq!(id.created_at().timestamp_millis(), 1_699_999_999_999);
    }

    #[test]
    fn test_session_id_rejects_garbage() {
        for bad in ["chat()", "chat(abc)", "chat(1) ", "session(1)", "chat(1)x"] {
            assert!(SessionId::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_message_id_parse_and_display() {
        let id = MessageId::parse("assistant(7)").unwrap();
        assert_eq!(id.role(), Role::Assistant);
        assert_eq!(id.seq(), 7);
        assert_eq!(id.to_string(), "assistant(7)");
    }

    #[test]
    fn test_message_id_rejects_zero_and_unknown_roles() {
        assert!(MessageId::parse("user(0)").is_err());
        assert!(MessageId::parse("system(1)").is_err());
        assert!(MessageId::parse("user(01)").is_err());
    }

    #[test]
    fn test_artifact_id_is_deterministic() {
        let parent = MessageId::new(Role::Assistant, 3);
        let a = artifact_id(parent, 2);
        let b = artifact_id(parent, 2);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "assistant(3)_code(2)");
        assert_eq!(a.parent(), parent);
        assert_eq!(a.index(), 2);
    }

    #[test]
    fn test_validate_accepts_allocator_output() {
        let session = SessionId::allocate();
        assert!(validate(&session.to_string(), IdKind::Session));

        let msg = MessageId::new(Role::User, 12);
        assert!(validate(&msg.to_string(), IdKind::Message));

        let art = artifact_id(msg, 3);
        assert!(validate(&art.to_string(), IdKind::Artifact));
    }

    #[test]
    fn test_validate_rejects_cross_kind() {
        assert!(!validate("chat(1699999999999)", IdKind::Message));
        assert!(!validate("user(1)", IdKind::Session));
        assert!(!validate("user(1)", IdKind::Artifact));
        assert!(!validate("user(1)_code(0)", IdKind::Artifact));
        assert!(!validate("", IdKind::Session));
    }

    #[test]
    fn test_ids_serialize_as_strings() {
        let msg = MessageId::new(Role::Assistant, 4);
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, "\"assistant(4)\"");
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);

        let art = artifact_id(msg, 1);
        let json = serde_json::to_string(&art).unwrap();
        assert_eq!(json, "\"assistant(4)_code(1)\"");
    }

    #[tokio::test]
    async fn test_next_message_id_counts_per_role() {
        let store = MemoryStore::new();
        let session = SessionId::allocate();

        let u1 = next_message_id(&store, &session, Role::User).await.unwrap();
        let a1 = next_message_id(&store, &session, Role::Assistant)
            .await
            .unwrap();
        let u2 = next_message_id(&store, &session, Role::User).await.unwrap();

        assert_eq!(u1.to_string(), "user(1)");
        assert_eq!(a1.to_string(), "assistant(1)");
        assert_eq!(u2.to_string(), "user(2)");
    }

    #[tokio::test]
    async fn test_next_message_id_gap_free_under_concurrency() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let session = SessionId::allocate();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                next_message_id(store.as_ref(), &session, Role::User)
                    .await
                    .unwrap()
                    .seq()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()), "duplicate sequence");
        }
        let expected: HashSet<u64> = (1..=32).collect();
        assert_eq!(seen, expected);
    }
}
