//! In-process state store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_user_id, Result, StatePersistence};
use crate::scheduler::TubeState;

/// Keeps state for the life of the process only
#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, TubeState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatePersistence for MemoryStateStore {
    async fn save(&self, user_id: &str, state: &TubeState) -> Result<()> {
        validate_user_id(user_id)?;
        self.states
            .write()
            .await
            .insert(user_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<TubeState>> {
        validate_user_id(user_id)?;
        Ok(self.states.read().await.get(user_id).cloned())
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        self.states.write().await.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = MemoryStateStore::new();
        let mut state = TubeState::new("learner".to_string());
        state.cycle_count = 4;

        store.save("learner", &state).await.unwrap();
        assert_eq!(store.load("learner").await.unwrap().unwrap().cycle_count, 4);

        store.delete("learner").await.unwrap();
        assert!(store.load("learner").await.unwrap().is_none());
    }
}
