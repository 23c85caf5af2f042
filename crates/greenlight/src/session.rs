use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::engine::types::ChatMessage;
use crate::error::Error;
use crate::gate::PendingAction;

/// Persisted state of one conversation: the full message history and, while
/// suspended, the pending action request awaiting a decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
    pub pending: Option<PendingAction>,
}

impl ConversationState {
    /// Content of the most recent message, regardless of role.
    pub fn last_text(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/// Versioned key-value persistence for conversation state.
///
/// Every mutation is a compare-and-set replace of the whole entry: `store`
/// with `expected: Some(v)` succeeds only if the current version is `v`,
/// and `expected: None` only if the id does not exist yet. A lost race is
/// `Error::Conflict`, which is what makes duplicate-resume detection
/// possible without any locking above this trait.
pub trait ConversationStore: Send + Sync {
    /// Load a conversation and its current version. `None` if absent.
    fn load(&self, id: &str) -> Result<Option<(ConversationState, u64)>, Error>;

    /// Atomically replace (or create) a conversation, returning the new
    /// version.
    fn store(
        &self,
        id: &str,
        state: ConversationState,
        expected: Option<u64>,
    ) -> Result<u64, Error>;
}

/// In-memory store using `std::sync::RwLock` (not tokio — the lock is never
/// held across `.await`).
pub struct InMemoryConversationStore {
    entries: RwLock<HashMap<String, (ConversationState, u64)>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn load(&self, id: &str) -> Result<Option<(ConversationState, u64)>, Error> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
        Ok(entries.get(id).cloned())
    }

    fn store(
        &self,
        id: &str,
        state: ConversationState,
        expected: Option<u64>,
    ) -> Result<u64, Error> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
        let current = entries.get(id).map(|(_, v)| *v);
        match (current, expected) {
            (None, None) => {
                entries.insert(id.to_string(), (state, 1));
                Ok(1)
            }
            (Some(v), Some(e)) if v == e => {
                let next = v + 1;
                entries.insert(id.to_string(), (state, next));
                Ok(next)
            }
            (None, Some(e)) => Err(Error::Conflict(format!(
                "conversation '{id}' expected version {e}, but it does not exist"
            ))),
            (Some(_), None) => Err(Error::Conflict(format!(
                "conversation '{id}' already exists"
            ))),
            (Some(v), Some(e)) => Err(Error::Conflict(format!(
                "conversation '{id}' expected version {e}, found {v}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ChatMessage;

    fn state_with(content: &str) -> ConversationState {
        ConversationState {
            messages: vec![ChatMessage::user(content)],
            pending: None,
        }
    }

    #[test]
    fn load_missing_returns_none() {
        let store = InMemoryConversationStore::new();
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn create_and_load() {
        let store = InMemoryConversationStore::new();
        let v = store.store("t1", state_with("hello"), None).unwrap();
        assert_eq!(v, 1);

        let (state, version) = store.load("t1").unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.last_text(), Some("hello"));
    }

    #[test]
    fn create_twice_conflicts() {
        let store = InMemoryConversationStore::new();
        store.store("t1", state_with("a"), None).unwrap();
        let err = store.store("t1", state_with("b"), None).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn replace_with_matching_version_bumps() {
        let store = InMemoryConversationStore::new();
        let v1 = store.store("t1", state_with("a"), None).unwrap();
        let v2 = store.store("t1", state_with("b"), Some(v1)).unwrap();
        assert_eq!(v2, 2);

        let (state, version) = store.load("t1").unwrap().unwrap();
        assert_eq!(version, 2);
        assert_eq!(state.last_text(), Some("b"));
    }

    #[test]
    fn replace_with_stale_version_conflicts() {
        let store = InMemoryConversationStore::new();
        let v1 = store.store("t1", state_with("a"), None).unwrap();
        store.store("t1", state_with("b"), Some(v1)).unwrap();

        // A second writer still holding v1 loses the race.
        let err = store.store("t1", state_with("c"), Some(v1)).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let (state, _) = store.load("t1").unwrap().unwrap();
        assert_eq!(state.last_text(), Some("b"));
    }

    #[test]
    fn replace_missing_with_expected_version_conflicts() {
        let store = InMemoryConversationStore::new();
        let err = store.store("ghost", state_with("a"), Some(1)).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn state_roundtrips_through_json() {
        let state = state_with("persist me");
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.messages.len(), 1);
        assert!(back.pending.is_none());
    }

    #[test]
    fn last_text_empty_state() {
        let state = ConversationState::default();
        assert!(state.last_text().is_none());
    }

    #[test]
    fn concurrent_cas_admits_exactly_one_writer() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryConversationStore::new());
        let v1 = store.store("t1", state_with("base"), None).unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store
                    .store("t1", state_with(&format!("writer-{i}")), Some(v1))
                    .is_ok()
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1, "exactly one concurrent CAS may succeed");

        let (_, version) = store.load("t1").unwrap().unwrap();
        assert_eq!(version, 2);
    }
}
