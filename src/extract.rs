//! Fenced code-block extraction
//!
//! Scans generated text for triple-backtick fenced regions and materializes
//! them as child artifacts of a message. The scan is a single linear pass
//! over lines; no backtracking-sensitive patterns are involved.
//!
//! Fences that never close are left as plain text: an unterminated fence
//! usually means the response is still streaming or was truncated, and must
//! not be materialized prematurely. Extraction is idempotent, which the
//! continuation path relies on when it re-extracts over combined text.

use crate::ids::{artifact_id, MessageId};
use crate::store::ArtifactRecord;
use chrono::Utc;

/// One fenced region found by the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// 1-based position among all closed fences in the text
    pub occurrence_index: u64,
    /// Language tag from the opening fence (may be empty)
    pub language: String,
    /// Lines between the fences, newline-terminated
    pub code: String,
}

/// Scan text for closed fenced regions, in document order
///
/// An opening fence is a line whose trimmed form starts with three backticks,
/// optionally followed by a language tag; the matching close is the next line
/// whose trimmed form is exactly three backticks.
///
/// # Examples
///
/// ```
/// use parlance::extract::scan_fenced_blocks;
///
/// let blocks = scan_fenced_blocks("```python\nprint(1)\n```\n");
/// assert_eq!(blocks.len(), 1);
/// assert_eq!(blocks[0].language, "python");
/// assert_eq!(blocks[0].code, "print(1)\n");
/// ```
pub fn scan_fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(String, String)> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        match &mut open {
            None => {
                if let Some(rest) = trimmed.strip_prefix("```") {
                    let language = rest.split_whitespace().next().unwrap_or("").to_string();
                    open = Some((language, String::new()));
                }
            }
            Some((language, code)) => {
                if trimmed == "```" {
                    blocks.push(FencedBlock {
                        occurrence_index: blocks.len() as u64 + 1,
                        language: std::mem::take(language),
                        code: std::mem::take(code),
                    });
                    open = None;
                } else {
                    code.push_str(line);
                    code.push('\n');
                }
            }
        }
    }

    // A fence still open here never closed; drop it rather than extract.
    blocks
}

/// Materialize the fenced regions of a message as artifact records
///
/// Ids are a pure function of (parent message id, occurrence index), so
/// re-running this on unchanged text reproduces identical ids and content.
pub fn extract_artifacts(parent: MessageId, text: &str) -> Vec<ArtifactRecord> {
    let blocks = scan_fenced_blocks(text);
    tracing::debug!(parent = %parent, count = blocks.len(), "extracted fenced blocks");
    blocks
        .into_iter()
        .map(|block| ArtifactRecord {
            id: artifact_id(parent, block.occurrence_index),
            parent_id: parent,
            language: block.language,
            code: block.code,
            metadata: serde_json::Map::new(),
            created_at: Utc::now(),
        })
        .collect()
}
