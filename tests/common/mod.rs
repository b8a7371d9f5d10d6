use std::sync::Arc;
use tempfile::TempDir;

use parlance::engine::{ConversationOrchestrator, EngineConfig, TurnHandle};
use parlance::generator::ScriptedGenerator;
use parlance::relay::TurnEvent;
use parlance::store::{MemoryStore, SledStore};

#[allow(dead_code)]
pub fn create_temp_store() -> (Arc<SledStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store = SledStore::open(tmp.path().join("store.db")).expect("failed to open sled store");
    (Arc::new(store), tmp)
}

/// Engine over an in-memory store and a scripted generator, plus handles to both
#[allow(dead_code)]
pub fn scripted_engine() -> (
    Arc<MemoryStore>,
    Arc<ScriptedGenerator>,
    ConversationOrchestrator,
) {
    scripted_engine_with(EngineConfig::default())
}

#[allow(dead_code)]
pub fn scripted_engine_with(
    config: EngineConfig,
) -> (
    Arc<MemoryStore>,
    Arc<ScriptedGenerator>,
    ConversationOrchestrator,
) {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(ScriptedGenerator::new());
    let orchestrator =
        ConversationOrchestrator::new(Arc::clone(&store), Arc::clone(&generator), config);
    (store, generator, orchestrator)
}

/// Drain every event of a turn
#[allow(dead_code)]
pub async fn collect_events(mut handle: TurnHandle) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

/// The concatenated text of all content deltas
#[allow(dead_code)]
pub fn content_of(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            TurnEvent::Content { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}
