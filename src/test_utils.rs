//! Test utilities for Parlance
//!
//! This module provides common test helpers: temporary sled stores,
//! event-collection, and assertion helpers.

use crate::error::ParlanceError;
use crate::relay::TurnEvent;
use crate::store::SledStore;
use tempfile::TempDir;

/// Create a sled store backed by a temporary directory
///
/// Returns both the store and the `TempDir` so the caller keeps ownership
/// of the directory (preventing it from being removed early).
pub fn temp_store() -> (SledStore, TempDir) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let store = SledStore::open(dir.path().join("store.db")).expect("Failed to open store");
    (store, dir)
}

/// Drain a turn handle into a vector of events
pub async fn collect_events(handle: &mut crate::engine::TurnHandle) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected
/// message
pub fn assert_error_contains<T>(result: Result<T, ParlanceError>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_temp_store_is_usable() {
        let (store, _dir) = temp_store();
        store.put("k", b"v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), b"v");
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<(), ParlanceError> =
            Err(ParlanceError::Config("test error message".to_string()));
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: Result<(), ParlanceError> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    #[should_panic(expected = "does not contain")]
    fn test_assert_error_contains_wrong_message() {
        let result: Result<(), ParlanceError> =
            Err(ParlanceError::Config("different error".to_string()));
        assert_error_contains(result, "not present");
    }
}
