//! Generation context assembly
//!
//! Builds the bounded-length role/content sequence sent to the generator:
//! the most recent N messages of the session, attachment content folded into
//! the last user message, and (for continuations) a synthetic instruction
//! asking the model to resume without repeating itself.
//!
//! Text-like attachments are appended verbatim inside a labeled delimiter
//! block so the model can tell narrative from attachment. Binary files
//! contribute only name/type/size metadata, never raw bytes.

use crate::generator::ContextMessage;
use crate::ids::Role;
use crate::store::{FileDescriptor, MessageRecord};
use serde::{Deserialize, Serialize};

/// History-window policy for context assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum number of trailing messages included in the context
    #[serde(default = "default_window_messages")]
    pub window_messages: usize,
}

fn default_window_messages() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_messages: default_window_messages(),
        }
    }
}

/// A file attached to the current user turn
///
/// The descriptor is what gets persisted; the content rides along only into
/// the generation context and only for text-like files.
#[derive(Debug, Clone)]
pub struct AttachedFile {
    /// Persisted metadata
    pub descriptor: FileDescriptor,
    /// Verbatim content for text-like files; `None` for binary files
    pub text_content: Option<String>,
}

impl AttachedFile {
    /// A text attachment with inline content
    pub fn text(name: impl Into<String>, media_type: impl Into<String>, content: &str) -> Self {
        Self {
            descriptor: FileDescriptor {
                name: name.into(),
                media_type: media_type.into(),
                size_bytes: content.len() as u64,
            },
            text_content: Some(content.to_string()),
        }
    }

    /// A binary attachment carrying metadata only
    pub fn binary(name: impl Into<String>, media_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            descriptor: FileDescriptor {
                name: name.into(),
                media_type: media_type.into(),
                size_bytes,
            },
            text_content: None,
        }
    }
}

/// Assembles bounded generation contexts
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Build a context assembler with the given window policy
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Assemble the ordered role/content pairs for one generation
    ///
    /// `history` must already be in conversation order. `files` are folded
    /// into the final user message; `extra_instruction` (continuations) is
    /// appended as a trailing user message.
    pub fn build(
        &self,
        history: &[MessageRecord],
        files: &[AttachedFile],
        extra_instruction: Option<&str>,
    ) -> Vec<ContextMessage> {
        let start = history.len().saturating_sub(self.config.window_messages);
        let mut context: Vec<ContextMessage> = history[start..]
            .iter()
            .map(|message| ContextMessage {
                role: match message.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: message.content.clone(),
            })
            .collect();

        if !files.is_empty() {
            let block = attachment_block(files);
            match context.iter_mut().rev().find(|m| m.role == "user") {
                Some(last_user) => {
                    last_user.content.push_str("\n\n");
                    last_user.content.push_str(&block);
                }
                None => context.push(ContextMessage::user(block)),
            }
        }

        if let Some(instruction) = extra_instruction {
            context.push(ContextMessage::user(instruction.to_string()));
        }

        tracing::debug!(
            history = history.len(),
            window = context.len(),
            files = files.len(),
            "assembled generation context"
        );
        context
    }
}

/// Render the labeled attachment block appended to the last user message
fn attachment_block(files: &[AttachedFile]) -> String {
    let mut block = String::new();
    for file in files {
        let FileDescriptor {
            name,
            media_type,
            size_bytes,
        } = &file.descriptor;
        match &file.text_content {
            Some(content) => {
                block.push_str(&format!(
                    "--- attached file: {} ({}, {} bytes) ---\n",
                    name, media_type, size_bytes
                ));
                block.push_str(content);
                if !content.ends_with('\n') {
                    block.push('\n');
                }
                block.push_str(&format!("--- end of attached file: {} ---\n", name));
            }
            None => {
                block.push_str(&format!(
                    "[attached file: {} ({}, {} bytes)]\n",
                    name, media_type, size_bytes
                ));
            }
        }
    }
    block
}

/// The synthetic instruction appended when resuming a cut-off generation
///
/// Quotes the tail of the partial reply so the model can pick up exactly
/// where it stopped.
pub fn continuation_instruction(prior_partial_text: &str) -> String {
    let tail: String = {
        let chars: Vec<char> = prior_partial_text.chars().collect();
        let start = chars.len().saturating_sub(200);
        chars[start..].iter().collect()
    };
    format!(
        "Your previous reply was cut off. Continue it exactly where it \
         stopped, without repeating anything you already wrote and without \
         any preamble. It currently ends with:\n{}",
        tail
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{MessageId, SessionId};
    use chrono::Utc;

    fn message(role: Role, seq: u64, content: &str) -> MessageRecord {
        MessageRecord {
            id: MessageId::new(role, seq),
            session_id: SessionId::allocate(),
            role,
            content: content.to_string(),
            attached_files: vec![],
            artifact_ids: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_roles_and_order_preserved() {
        let history = vec![
            message(Role::User, 1, "question"),
            message(Role::Assistant, 1, "answer"),
        ];
        let context = ContextBuilder::default().build(&history, &[], None);
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].role, "user");
        assert_eq!(context[0].content, "question");
        assert_eq!(context[1].role, "assistant");
    }

    #[test]
    fn test_window_keeps_most_recent() {
        let mut history = Vec::new();
        for i in 1..=8 {
            history.push(message(Role::User, i, &format!("u{}", i)));
            history.push(message(Role::Assistant, i, &format!("a{}", i)));
        }
        let builder = ContextBuilder::new(ContextConfig { window_messages: 4 });
        let context = builder.build(&history, &[], None);
        assert_eq!(context.len(), 4);
        assert_eq!(context[0].content, "u7");
        assert_eq!(context[3].content, "a8");
    }

    #[test]
    fn test_text_file_folded_into_last_user_message() {
        let history = vec![
            message(Role::User, 1, "old question"),
            message(Role::Assistant, 1, "old answer"),
            message(Role::User, 2, "see attachment"),
        ];
        let files = vec![AttachedFile::text("notes.txt", "text/plain", "line one\n")];
        let context = ContextBuilder::default().build(&history, &files, None);

        assert_eq!(context.len(), 3);
        let last_user = &context[2];
        assert!(last_user.content.starts_with("see attachment"));
        assert!(last_user
            .content
            .contains("--- attached file: notes.txt (text/plain, 9 bytes) ---"));
        assert!(last_user.content.contains("line one"));
        assert!(last_user
            .content
            .contains("--- end of attached file: notes.txt ---"));
        // Other messages untouched
        assert_eq!(context[0].content, "old question");
    }

    #[test]
    fn test_binary_file_contributes_metadata_only() {
        let history = vec![message(Role::User, 1, "look at this image")];
        let files = vec![AttachedFile::binary("photo.png", "image/png", 2048)];
        let context = ContextBuilder::default().build(&history, &files, None);

        let content = &context[0].content;
        assert!(content.contains("[attached file: photo.png (image/png, 2048 bytes)]"));
        // No delimiter block and no bytes for binary files
        assert!(!content.contains("--- attached file"));
    }

    #[test]
    fn test_extra_instruction_appended_last() {
        let history = vec![
            message(Role::User, 1, "question"),
            message(Role::Assistant, 1, "partial answ"),
        ];
        let instruction = continuation_instruction("partial answ");
        let context = ContextBuilder::default().build(&history, &[], Some(&instruction));

        assert_eq!(context.len(), 3);
        assert_eq!(context[2].role, "user");
        assert!(context[2].content.contains("cut off"));
        assert!(context[2].content.ends_with("partial answ"));
    }

    #[test]
    fn test_continuation_instruction_quotes_tail_only() {
        let long = "x".repeat(500) + "THE END OF THE PARTIAL";
        let instruction = continuation_instruction(&long);
        assert!(instruction.contains("THE END OF THE PARTIAL"));
        // Only the last 200 chars are quoted
        let quoted = instruction.split(":\n").last().unwrap();
        assert_eq!(quoted.chars().count(), 200);
    }

    #[test]
    fn test_empty_history_with_files_gets_user_message() {
        let files = vec![AttachedFile::text("a.txt", "text/plain", "hi")];
        let context = ContextBuilder::default().build(&[], &files, None);
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].role, "user");
    }
}
