//! Background reconciliation over persisted session state
//!
//! Session metadata (`message_count`, `preview`) is allowed to lag the
//! message records after a partial failure of the final multi-key write.
//! This pass recomputes both from source, repairs the session record, and
//! reports orphan artifacts whose parent message is missing. Orphans are
//! reported, never silently deleted.

use super::{keys, load_messages, load_session, save_session, types::preview_of, Store};
use crate::error::Result;
use crate::ids::{ArtifactId, SessionId};
use std::collections::HashSet;

/// Outcome of reconciling one session
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    /// The reconciled session
    pub session_id: SessionId,
    /// `message_count` as stored before the pass
    pub stored_count: usize,
    /// Count recomputed from message records
    pub actual_count: usize,
    /// Whether the session record was rewritten
    pub repaired: bool,
    /// Artifacts whose parent message no longer exists
    pub orphan_artifacts: Vec<ArtifactId>,
}

impl ReconcileReport {
    /// True when nothing needed repair and no orphans were found
    pub fn is_clean(&self) -> bool {
        !self.repaired && self.orphan_artifacts.is_empty()
    }
}

/// Recompute session metadata from message records and report orphans
///
/// # Errors
///
/// Returns `NotFound` when the session record itself is absent.
pub async fn reconcile_session(store: &dyn Store, session: &SessionId) -> Result<ReconcileReport> {
    let mut record = load_session(store, session).await?;
    let messages = load_messages(store, session).await?;

    let actual_count = messages.len();
    let actual_preview = messages
        .last()
        .map(|m| preview_of(&m.content))
        .unwrap_or_default();

    let stored_count = record.message_count;
    let repaired = stored_count != actual_count || record.preview != actual_preview;
    if repaired {
        tracing::warn!(
            session = %session,
            stored_count,
            actual_count,
            "session metadata lagged message records; repairing"
        );
        record.message_count = actual_count;
        record.preview = actual_preview;
        save_session(store, &record).await?;
    }

    let message_ids: HashSet<String> = messages.iter().map(|m| m.id.to_string()).collect();
    let mut orphan_artifacts = Vec::new();
    let artifact_prefix = keys::artifact_prefix(session);
    for key in store.list(&artifact_prefix).await? {
        let Some(raw_id) = key.strip_prefix(&artifact_prefix) else {
            continue;
        };
        let Ok(artifact) = ArtifactId::parse(raw_id) else {
            tracing::warn!(key = %key, "artifact key does not match the id grammar");
            continue;
        };
        if !message_ids.contains(&artifact.parent().to_string()) {
            tracing::warn!(
                session = %session,
                artifact = %artifact,
                "orphan artifact: parent message missing"
            );
            orphan_artifacts.push(artifact);
        }
    }

    Ok(ReconcileReport {
        session_id: session.clone(),
        stored_count,
        actual_count,
        repaired,
        orphan_artifacts,
    })
}
