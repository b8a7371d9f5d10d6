//! Command handlers behind the CLI
//!
//! Each handler wires the store and generator from config, runs one engine
//! operation, and renders the event stream or records to stdout.

use crate::classify::Completion;
use crate::config::Config;
use crate::context::AttachedFile;
use crate::engine::{ConversationOrchestrator, TurnHandle};
use crate::error::{ParlanceError, Result};
use crate::generator::OllamaGenerator;
use crate::ids::{validate, IdKind, SessionId};
use crate::relay::TurnEvent;
use crate::store::{
    latest_assistant_message, list_sessions, purge_session, reconcile::reconcile_session,
    SledStore,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn open_engine(config: &Config) -> Result<(Arc<SledStore>, ConversationOrchestrator)> {
    let store = Arc::new(SledStore::open(&config.store.path)?);
    let generator = Arc::new(OllamaGenerator::new(config.generator.ollama.clone())?);
    let orchestrator =
        ConversationOrchestrator::new(Arc::clone(&store), generator, config.engine.clone());
    Ok((store, orchestrator))
}

fn parse_session_arg(raw: &str) -> Result<SessionId> {
    if !validate(raw, IdKind::Session) {
        return Err(ParlanceError::InvalidIdentifier(raw.to_string()).into());
    }
    SessionId::parse(raw)
}

/// Send one user turn and stream the reply to stdout
pub async fn run_send(
    config: Config,
    prompt: String,
    session: Option<String>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let session_id = session.as_deref().map(parse_session_arg).transpose()?;
    let attachments = files
        .iter()
        .map(|path| load_attachment(path))
        .collect::<Result<Vec<_>>>()?;

    let (_store, orchestrator) = open_engine(&config)?;
    let turn = orchestrator
        .start_turn(session_id, &prompt, attachments)
        .await?;
    render_turn(turn).await
}

/// Resume the latest assistant reply of a session
pub async fn run_resume(
    config: Config,
    session: String,
    prior_file: Option<PathBuf>,
) -> Result<()> {
    let session_id = parse_session_arg(&session)?;
    let (store, orchestrator) = open_engine(&config)?;

    let prior = match prior_file {
        Some(path) => std::fs::read_to_string(&path).map_err(|e| {
            ParlanceError::Config(format!("failed to read {}: {}", path.display(), e))
        })?,
        None => latest_assistant_message(store.as_ref(), &session_id)
            .await?
            .ok_or_else(|| {
                ParlanceError::NotFound(format!("assistant message in {}", session_id))
            })?
            .content,
    };

    let turn = orchestrator.continue_turn(&session_id, &prior).await?;
    render_turn(turn).await
}

/// List stored sessions, newest first
pub async fn run_sessions(config: Config, json: bool) -> Result<()> {
    let store = SledStore::open(&config.store.path)?;
    let sessions = list_sessions(&store).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {}  {:>3} messages  {}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M:%S"),
            session.message_count,
            session.preview.replace('\n', " ")
        );
    }
    Ok(())
}

/// Delete a session and all descendant records
pub async fn run_purge(config: Config, session: String) -> Result<()> {
    let session_id = parse_session_arg(&session)?;
    let store = SledStore::open(&config.store.path)?;
    let removed = purge_session(&store, &session_id).await?;
    println!("purged {} ({} records)", session_id, removed);
    Ok(())
}

/// Repair session metadata and report orphan artifacts
pub async fn run_reconcile(config: Config, session: String) -> Result<()> {
    let session_id = parse_session_arg(&session)?;
    let store = SledStore::open(&config.store.path)?;
    let report = reconcile_session(&store, &session_id).await?;

    if report.is_clean() {
        println!("{} is consistent", report.session_id);
        return Ok(());
    }
    if report.repaired {
        println!(
            "{}: message_count {} -> {}",
            report.session_id, report.stored_count, report.actual_count
        );
    }
    for orphan in &report.orphan_artifacts {
        println!("orphan artifact: {}", orphan);
    }
    Ok(())
}

/// Print a turn's event stream as it arrives
async fn render_turn(mut turn: TurnHandle) -> Result<()> {
    let mut stdout = std::io::stdout();
    let mut saw_done = false;

    while let Some(event) = turn.next_event().await {
        match event {
            TurnEvent::SessionId { session_id } => {
                eprintln!("session: {}", session_id);
            }
            TurnEvent::Content { delta } => {
                stdout.write_all(delta.as_bytes())?;
                stdout.flush()?;
            }
            TurnEvent::CompletionStatus { status, message_id } => {
                writeln!(stdout)?;
                match status {
                    Completion::Finished => eprintln!("[{} finished]", message_id),
                    Completion::FinishedWithReason(reason) => {
                        eprintln!("[{} finished: {}]", message_id, reason)
                    }
                    Completion::ApparentlyTruncated => {
                        eprintln!("[{} appears truncated]", message_id)
                    }
                }
            }
            TurnEvent::ContinuationAvailable { message_id } => {
                eprintln!("[resume with: parlance resume {}]", turn.session_id);
                tracing::debug!(message = %message_id, "continuation offered");
            }
            TurnEvent::Done => {
                saw_done = true;
            }
            TurnEvent::Error { message, category } => {
                eprintln!("error ({}): {}", category, message);
            }
        }
    }

    // Stream closure without the done sentinel means the turn failed.
    if !saw_done {
        anyhow::bail!("turn did not complete");
    }
    Ok(())
}

/// Build an attachment from a local file
///
/// UTF-8 files ride along verbatim; anything else contributes metadata only.
fn load_attachment(path: &Path) -> Result<AttachedFile> {
    let bytes = std::fs::read(path)
        .map_err(|e| ParlanceError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let media_type = media_type_for(path);

    match String::from_utf8(bytes) {
        Ok(text) => Ok(AttachedFile::text(name, media_type, &text)),
        Err(raw) => Ok(AttachedFile::binary(
            name,
            media_type,
            raw.as_bytes().len() as u64,
        )),
    }
}

fn media_type_for(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}
