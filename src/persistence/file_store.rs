//! Device-local state store
//!
//! Directory structure:
//! ```text
//! {data_dir}/users/
//! └── {user-id}/
//!     └── tube_state.json   # Full TubeState, pretty JSON
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use super::{validate_user_id, Result, StatePersistence};
use crate::scheduler::TubeState;

pub struct FileStateStore {
    users_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            users_dir: data_dir.join("users"),
        }
    }

    fn user_dir(&self, user_id: &str) -> Result<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.users_dir.join(user_id))
    }

    fn state_path(&self, user_id: &str) -> Result<PathBuf> {
        Ok(self.user_dir(user_id)?.join("tube_state.json"))
    }
}

#[async_trait]
impl StatePersistence for FileStateStore {
    async fn save(&self, user_id: &str, state: &TubeState) -> Result<()> {
        let dir = self.user_dir(user_id)?;
        fs::create_dir_all(&dir).await?;

        let path = self.state_path(user_id)?;
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        log::debug!("Saved tube state for {} to {:?}", user_id, path);
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<TubeState>> {
        let path = self.state_path(user_id)?;
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let state: TubeState = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    async fn delete(&self, user_id: &str) -> Result<()> {
        let path = self.state_path(user_id)?;
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::PersistenceError;
    use crate::scheduler::{Scheduler, TubeIndex, TubeScheduler};
    use tempfile::TempDir;

    fn create_test_store() -> (FileStateStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStateStore::new(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    fn seeded_scheduler() -> TubeScheduler {
        let manifest = crate::manifest::ContentManifest::embedded().unwrap();
        let mut scheduler = TubeScheduler::new("learner");
        scheduler.seed_from_manifest(&manifest);
        scheduler
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let (store, _temp) = create_test_store();
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_schedule() {
        let (store, _temp) = create_test_store();
        let mut scheduler = seeded_scheduler();

        for (correct, total) in [(20, 20), (15, 20), (10, 10), (20, 20)] {
            let tube = scheduler.active_tube();
            let id = scheduler.current_stitch().unwrap();
            scheduler.record_completion(tube, &id, correct, total).unwrap();
        }
        store.save("learner", scheduler.state()).await.unwrap();

        let loaded = store.load("learner").await.unwrap().unwrap();
        let (restored, repairs) = TubeScheduler::from_state(loaded).unwrap();
        assert!(repairs.is_empty());

        assert_eq!(restored.current_stitch(), scheduler.current_stitch());
        assert_eq!(restored.active_tube(), scheduler.active_tube());
        assert_eq!(restored.cycle_count(), scheduler.cycle_count());
        for tube in TubeIndex::ALL {
            assert_eq!(
                restored.get_tube_stitches(tube),
                scheduler.get_tube_stitches(tube)
            );
        }
    }

    #[tokio::test]
    async fn test_negative_skip_number_is_hard_failure() {
        let (store, temp) = create_test_store();
        let scheduler = seeded_scheduler();
        store.save("learner", scheduler.state()).await.unwrap();

        let path = temp.path().join("users/learner/tube_state.json");
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        json["tubes"][0]["positions"][0]["skipNumber"] = serde_json::json!(-3);
        std::fs::write(&path, json.to_string()).unwrap();

        assert!(matches!(
            store.load("learner").await,
            Err(PersistenceError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp) = create_test_store();
        store
            .save("learner", seeded_scheduler().state())
            .await
            .unwrap();
        store.delete("learner").await.unwrap();
        assert!(store.load("learner").await.unwrap().is_none());
        // Deleting again is fine
        store.delete("learner").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_like_user_id() {
        let (store, _temp) = create_test_store();
        assert!(matches!(
            store.load("../other").await,
            Err(PersistenceError::InvalidUserId(_))
        ));
    }
}
