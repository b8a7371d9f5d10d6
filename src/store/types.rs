use crate::ids::{ArtifactId, MessageId, Role, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of trailing characters of the latest message kept as the preview
pub const PREVIEW_CHARS: usize = 100;

/// Stored metadata for one conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier with the creation timestamp embedded
    pub id: SessionId,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session last changed
    pub last_updated: DateTime<Utc>,
    /// Number of messages in the session
    pub message_count: usize,
    /// Last 100 characters of the latest message content
    pub preview: String,
}

impl SessionRecord {
    /// Create a fresh session record for a newly allocated id
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_updated: now,
            message_count: 0,
            preview: String::new(),
        }
    }

    /// Record one appended message: bump the count and refresh the preview
    pub fn note_message(&mut self, content: &str) {
        self.message_count += 1;
        self.preview = preview_of(content);
        self.last_updated = Utc::now();
    }

    /// Record an in-place rewrite of the latest message (continuation)
    pub fn note_rewrite(&mut self, content: &str) {
        self.preview = preview_of(content);
        self.last_updated = Utc::now();
    }
}

/// Derive the session preview from a message's content
pub fn preview_of(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= PREVIEW_CHARS {
        content.to_string()
    } else {
        chars[chars.len() - PREVIEW_CHARS..].iter().collect()
    }
}

/// Descriptor of a file attached to a user message
///
/// Only metadata is persisted; raw file bytes never enter the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Original file name
    pub name: String,
    /// Media type as reported by the uploader (may be empty)
    pub media_type: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Stored record for one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message identifier, unique within the session
    pub id: MessageId,
    /// Owning session
    pub session_id: SessionId,
    /// Author role
    pub role: Role,
    /// Message text. Mutable only for the most recent assistant message
    /// during continuation.
    pub content: String,
    /// Attached file descriptors (user messages only)
    #[serde(default)]
    pub attached_files: Vec<FileDescriptor>,
    /// Ordered child code-artifact ids
    #[serde(default)]
    pub artifact_ids: Vec<ArtifactId>,
    /// When the message was created
    pub created_at: DateTime<Utc>,
}

/// Stored record for one extracted code artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Deterministic artifact identifier
    pub id: ArtifactId,
    /// Owning message
    pub parent_id: MessageId,
    /// Language tag from the opening fence (may be empty)
    pub language: String,
    /// The fenced code content
    pub code: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// When the artifact was (re-)extracted
    pub created_at: DateTime<Utc>,
}
