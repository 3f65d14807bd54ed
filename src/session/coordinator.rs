//! Session coordinator
//!
//! Wires a learner's `TubeScheduler` to the `ContentResolver` and the
//! persistence port. One coordinator owns one learner's scheduler; every
//! mutation goes through it.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use super::models::{PresentedStitch, SessionConfig, SessionStatus, SessionSummary};
use crate::content::{ContentResolver, PrefetchHandle};
use crate::manifest::ContentManifest;
use crate::persistence::{PersistenceError, StatePersistence};
use crate::scheduler::{
    CompletionOutcome, Scheduler, SchedulerError, StitchPosition, TubeIndex, TubeScheduler,
};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A completion is already being applied")]
    TransitionInProgress,

    #[error("No tube has any content to play")]
    NoContent,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Marks the session as transitioning until dropped
struct TransitionGuard<'a> {
    status: &'a Mutex<SessionStatus>,
}

impl<'a> TransitionGuard<'a> {
    fn begin(status: &'a Mutex<SessionStatus>) -> Result<Self> {
        let mut current = status.lock().unwrap_or_else(|e| e.into_inner());
        if *current == SessionStatus::Transitioning {
            return Err(SessionError::TransitionInProgress);
        }
        *current = SessionStatus::Transitioning;
        Ok(Self { status })
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        let mut current = self.status.lock().unwrap_or_else(|e| e.into_inner());
        *current = SessionStatus::Idle;
    }
}

struct SessionInner {
    scheduler: TubeScheduler,
    prefetch: Option<PrefetchHandle>,
    /// Last save failed; retried on the next completion or `flush`
    pending_save: bool,
    summary: SessionSummary,
}

pub struct SessionCoordinator {
    user_id: String,
    manifest: Arc<ContentManifest>,
    resolver: ContentResolver,
    store: Arc<dyn StatePersistence>,
    config: SessionConfig,
    status: Mutex<SessionStatus>,
    inner: AsyncMutex<SessionInner>,
}

impl SessionCoordinator {
    /// Load (or create) the learner's state, seed it from the manifest and
    /// start warming the content cache.
    ///
    /// Corrupt persisted state, or state saved for another user, is a hard
    /// failure. Must be called from within a tokio runtime.
    pub async fn start(
        user_id: impl Into<String>,
        manifest: Arc<ContentManifest>,
        resolver: ContentResolver,
        store: Arc<dyn StatePersistence>,
        config: SessionConfig,
    ) -> Result<Self> {
        let user_id = user_id.into();

        let (mut scheduler, fresh) = match store.load(&user_id).await? {
            Some(state) => {
                let (scheduler, repairs) = TubeScheduler::from_saved(&user_id, state)?;
                if !repairs.is_empty() {
                    log::warn!(
                        "Loaded state for {} needed {} tube repairs",
                        user_id,
                        repairs.len()
                    );
                }
                (scheduler, !repairs.is_empty())
            }
            None => {
                log::info!("No saved state for {}; starting fresh", user_id);
                (TubeScheduler::new(user_id.clone()), true)
            }
        };

        let added = scheduler.seed_from_manifest(&manifest);

        let coordinator = Self {
            user_id,
            manifest,
            resolver,
            store,
            config,
            status: Mutex::new(SessionStatus::Idle),
            inner: AsyncMutex::new(SessionInner {
                scheduler,
                prefetch: None,
                pending_save: fresh || added > 0,
                summary: SessionSummary::default(),
            }),
        };

        {
            let mut inner = coordinator.inner.lock().await;
            coordinator.ensure_playable(&mut inner)?;
            coordinator.save_if_pending(&mut inner).await;
            coordinator.restart_prefetch(&mut inner);
            inner.summary.cycle_count = inner.scheduler.cycle_count();
        }

        Ok(coordinator)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn resolver(&self) -> &ContentResolver {
        &self.resolver
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn active_tube(&self) -> TubeIndex {
        self.inner.lock().await.scheduler.active_tube()
    }

    /// The active tube's position-0 stitch, with content
    ///
    /// The scheduler lock is released before content is resolved, so a slow
    /// fetch never holds up completions or reads.
    pub async fn current(&self) -> Result<PresentedStitch> {
        let (tube, stitch_id, position) = {
            let mut inner = self.inner.lock().await;
            let stitch_id = self.ensure_playable(&mut inner)?;

            let tube = inner.scheduler.active_tube();
            let position = inner
                .scheduler
                .state()
                .tube(tube)
                .find(&stitch_id)
                .cloned()
                .ok_or_else(|| SchedulerError::UnknownStitch {
                    tube,
                    stitch_id: stitch_id.clone(),
                })?;
            (tube, stitch_id, position)
        };

        let resolved = self.resolver.resolve(&stitch_id).await;
        Ok(PresentedStitch {
            tube,
            stitch: resolved.stitch,
            distractor_level: position.distractor_level,
            skip_number: position.skip_number,
            source: resolved.source,
        })
    }

    /// Record the learner's score for a stitch.
    ///
    /// Returns `None` when the stitch is not in any tube: the completion is
    /// logged and ignored rather than held against the learner. A failed
    /// save does not fail the completion; it stays pending and is retried.
    pub async fn complete(
        &self,
        stitch_id: &str,
        correct_count: u32,
        total_count: u32,
    ) -> Result<Option<CompletionOutcome>> {
        let _guard = TransitionGuard::begin(&self.status)?;
        let mut inner = self.inner.lock().await;

        let Some(tube) = owning_tube(&inner.scheduler, stitch_id) else {
            log::warn!(
                "Ignoring completion for unknown stitch {} (user {})",
                stitch_id,
                self.user_id
            );
            inner.summary.ignored_completions = inner.summary.ignored_completions.saturating_add(1);
            return Ok(None);
        };

        let outcome =
            match inner
                .scheduler
                .record_completion(tube, stitch_id, correct_count, total_count)
            {
                Ok(outcome) => outcome,
                Err(SchedulerError::UnknownStitch { tube, stitch_id }) => {
                    log::warn!("Ignoring completion for {} in tube {}", stitch_id, tube);
                    inner.summary.ignored_completions = inner.summary.ignored_completions.saturating_add(1);
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

        for report in &outcome.repairs {
            log::warn!("Tube {} repaired during completion: {:?}", report.tube, report.problems);
        }

        let summary = &mut inner.summary;
        summary.stitches_completed = summary.stitches_completed.saturating_add(1);
        summary.questions_answered = summary.questions_answered.saturating_add(total_count);
        summary.questions_correct = summary
            .questions_correct
            .saturating_add(correct_count.min(total_count));
        if outcome.perfect {
            summary.perfect_stitches = summary.perfect_stitches.saturating_add(1);
        }
        summary.cycle_count = outcome.cycle_count;

        inner.pending_save = true;
        self.save_if_pending(&mut inner).await;

        if outcome.next_tube != outcome.completed_tube {
            self.restart_prefetch(&mut inner);
        }

        Ok(Some(outcome))
    }

    /// Manually switch the active tube
    pub async fn select_tube(&self, tube: TubeIndex) -> Result<()> {
        let _guard = TransitionGuard::begin(&self.status)?;
        let mut inner = self.inner.lock().await;

        if inner.scheduler.active_tube() == tube {
            return Ok(());
        }
        inner.scheduler.select_tube(tube);
        inner.pending_save = true;
        self.save_if_pending(&mut inner).await;
        self.restart_prefetch(&mut inner);
        Ok(())
    }

    pub async fn tube_stitches(&self, tube: TubeIndex) -> Vec<StitchPosition> {
        self.inner.lock().await.scheduler.get_tube_stitches(tube)
    }

    pub async fn summary(&self) -> SessionSummary {
        self.inner.lock().await.summary.clone()
    }

    pub async fn has_pending_save(&self) -> bool {
        self.inner.lock().await.pending_save
    }

    /// Drop cached content and start warming the cache again
    pub async fn invalidate_content(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.prefetch.take() {
            handle.cancel();
        }
        self.resolver.invalidate();
        self.restart_prefetch(&mut inner);
    }

    /// Retry a pending save, surfacing the error if it fails again
    pub async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.pending_save {
            return Ok(());
        }
        self.store
            .save(&self.user_id, inner.scheduler.state())
            .await?;
        inner.pending_save = false;
        Ok(())
    }

    /// Stop background work and flush state
    pub async fn shutdown(&self) -> Result<SessionSummary> {
        {
            let mut inner = self.inner.lock().await;
            if let Some(handle) = inner.prefetch.take() {
                handle.cancel();
            }
        }
        self.flush().await?;
        Ok(self.summary().await)
    }

    /// Current stitch id, re-seeding or moving to another tube when the
    /// active one is empty
    fn ensure_playable(&self, inner: &mut SessionInner) -> Result<String> {
        match inner.scheduler.current_stitch() {
            Ok(id) => return Ok(id),
            Err(SchedulerError::EmptyTube(tube)) => {
                log::warn!("Tube {} is empty; re-seeding from manifest", tube);
                if inner.scheduler.seed_from_manifest(&self.manifest) > 0 {
                    inner.pending_save = true;
                }
            }
            Err(e) => return Err(e.into()),
        }

        if let Ok(id) = inner.scheduler.current_stitch() {
            return Ok(id);
        }

        let start = inner.scheduler.active_tube();
        let mut tube = start.next();
        while tube != start {
            if !inner.scheduler.state().tube(tube).is_empty() {
                log::warn!("Tube {} has no content; switching to tube {}", start, tube);
                inner.scheduler.select_tube(tube);
                inner.pending_save = true;
                return Ok(inner.scheduler.current_stitch()?);
            }
            tube = tube.next();
        }

        Err(SessionError::NoContent)
    }

    async fn save_if_pending(&self, inner: &mut SessionInner) {
        if !inner.pending_save {
            return;
        }
        match self.store.save(&self.user_id, inner.scheduler.state()).await {
            Ok(()) => inner.pending_save = false,
            Err(e) => log::warn!(
                "Failed to save state for {} (will retry): {}",
                self.user_id,
                e
            ),
        }
    }

    /// Cancel the outstanding prefetch and start one for the active tube
    fn restart_prefetch(&self, inner: &mut SessionInner) {
        if let Some(handle) = inner.prefetch.take() {
            handle.cancel();
        }
        if self.config.prefetch_window == 0 {
            return;
        }

        let tube = inner.scheduler.active_tube();
        let Ok(from) = inner.scheduler.current_stitch() else {
            return;
        };
        inner.prefetch = Some(
            self.resolver
                .prefetch(tube, &from, self.config.prefetch_window),
        );
    }
}

/// Tube holding the stitch, preferring the active one
fn owning_tube(scheduler: &TubeScheduler, stitch_id: &str) -> Option<TubeIndex> {
    let active = scheduler.active_tube();
    if scheduler.state().tube(active).contains(stitch_id) {
        return Some(active);
    }
    TubeIndex::ALL
        .into_iter()
        .find(|t| scheduler.state().tube(*t).contains(stitch_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::content::{BundledDataset, ContentFetcher, FetchError, SourceTier, Stitch};
    use crate::persistence::{MemoryStateStore, Result as PersistenceResult};
    use crate::scheduler::TubeState;

    /// Memory store that can be told to fail or to stall
    #[derive(Default)]
    struct TestStore {
        inner: MemoryStateStore,
        fail: AtomicBool,
        delay_ms: AtomicUsize,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl StatePersistence for TestStore {
        async fn save(&self, user_id: &str, state: &TubeState) -> PersistenceResult<()> {
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(PersistenceError::Server {
                    status: 503,
                    message: "down".to_string(),
                });
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(user_id, state).await
        }

        async fn load(&self, user_id: &str) -> PersistenceResult<Option<TubeState>> {
            self.inner.load(user_id).await
        }

        async fn delete(&self, user_id: &str) -> PersistenceResult<()> {
            self.inner.delete(user_id).await
        }
    }

    /// Content service that answers every id after a fixed delay
    struct SlowFetcher {
        delay: Duration,
    }

    #[async_trait]
    impl ContentFetcher for SlowFetcher {
        async fn fetch_batch(&self, ids: &[String]) -> std::result::Result<Vec<Stitch>, FetchError> {
            tokio::time::sleep(self.delay).await;
            Ok(ids
                .iter()
                .map(|id| Stitch {
                    id: id.clone(),
                    thread_id: "remote".to_string(),
                    title: format!("Remote {}", id),
                    body: String::new(),
                    questions: Vec::new(),
                })
                .collect())
        }
    }

    fn manifest() -> Arc<ContentManifest> {
        Arc::new(ContentManifest::embedded().unwrap())
    }

    /// Manifest whose stitches are not in the bundled dataset
    fn remote_only_manifest() -> Arc<ContentManifest> {
        let json = serde_json::json!({
            "version": 1,
            "tubes": { "1": { "threads": { "r1": { "title": "Remote", "stitches": [
                { "id": "remote-1", "order": 1, "title": "" },
                { "id": "remote-2", "order": 2, "title": "" }
            ] } } } }
        });
        Arc::new(ContentManifest::from_json(&json.to_string()).unwrap())
    }

    fn resolver(manifest: &Arc<ContentManifest>) -> ContentResolver {
        let bundled = Arc::new(BundledDataset::embedded().unwrap());
        ContentResolver::builder(Arc::clone(manifest), bundled).build()
    }

    async fn start_with(store: Arc<TestStore>) -> SessionCoordinator {
        let manifest = manifest();
        let resolver = resolver(&manifest);
        SessionCoordinator::start("learner", manifest, resolver, store, SessionConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_seeds_and_saves() {
        let store = Arc::new(TestStore::default());
        let session = start_with(store.clone()).await;

        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert!(!session.has_pending_save().await);

        let presented = session.current().await.unwrap();
        assert_eq!(presented.tube, TubeIndex::One);
        assert_eq!(presented.distractor_level, 1);
        assert_eq!(presented.skip_number, 3);
        assert_ne!(presented.source, SourceTier::Synthetic);
    }

    #[tokio::test]
    async fn test_complete_rotates_and_persists() {
        let store = Arc::new(TestStore::default());
        let session = start_with(store.clone()).await;

        let first = session.current().await.unwrap();
        let outcome = session
            .complete(&first.stitch.id, 10, 10)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.perfect);
        assert_eq!(outcome.next_tube, TubeIndex::Two);
        assert_eq!(session.active_tube().await, TubeIndex::Two);

        let saved = store.load("learner").await.unwrap().unwrap();
        assert_eq!(saved.active_tube, TubeIndex::Two);
        assert_eq!(
            saved.tubes[0].current_stitch_id,
            session.tube_stitches(TubeIndex::One).await.first().map(|p| p.stitch_id.clone())
        );

        let summary = session.summary().await;
        assert_eq!(summary.stitches_completed, 1);
        assert_eq!(summary.perfect_stitches, 1);
        assert_eq!(summary.accuracy(), Some(1.0));
    }

    #[tokio::test]
    async fn test_resume_from_saved_state() {
        let store = Arc::new(TestStore::default());
        let session = start_with(store.clone()).await;
        for _ in 0..4 {
            let current = session.current().await.unwrap();
            session.complete(&current.stitch.id, 7, 10).await.unwrap();
        }
        let expected = session.current().await.unwrap().stitch.id.clone();
        session.shutdown().await.unwrap();

        let resumed = start_with(store).await;
        assert_eq!(resumed.active_tube().await, TubeIndex::Two);
        assert_eq!(resumed.current().await.unwrap().stitch.id, expected);
    }

    #[tokio::test]
    async fn test_unknown_stitch_is_a_no_op() {
        let store = Arc::new(TestStore::default());
        let session = start_with(store.clone()).await;
        let before = session.tube_stitches(TubeIndex::One).await;

        assert!(session.complete("no-such-stitch", 5, 5).await.unwrap().is_none());
        assert_eq!(session.tube_stitches(TubeIndex::One).await, before);
        assert_eq!(session.active_tube().await, TubeIndex::One);
        assert_eq!(session.summary().await.ignored_completions, 1);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_failed_save_stays_pending_until_flush() {
        let store = Arc::new(TestStore::default());
        let session = start_with(store.clone()).await;

        store.fail.store(true, Ordering::SeqCst);
        let current = session.current().await.unwrap();
        assert!(session.complete(&current.stitch.id, 1, 2).await.unwrap().is_some());
        assert!(session.has_pending_save().await);
        assert!(session.flush().await.is_err());

        store.fail.store(false, Ordering::SeqCst);
        session.flush().await.unwrap();
        assert!(!session.has_pending_save().await);
        let saved = store.load("learner").await.unwrap().unwrap();
        assert_eq!(saved.active_tube, TubeIndex::Two);
    }

    #[tokio::test]
    async fn test_second_completion_rejected_while_transitioning() {
        let store = Arc::new(TestStore::default());
        let session = Arc::new(start_with(store.clone()).await);
        let current = session.current().await.unwrap();

        store.delay_ms.store(300, Ordering::SeqCst);
        let background = {
            let session = Arc::clone(&session);
            let id = current.stitch.id.clone();
            tokio::spawn(async move { session.complete(&id, 3, 3).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.status(), SessionStatus::Transitioning);
        assert!(matches!(
            session.complete(&current.stitch.id, 3, 3).await,
            Err(SessionError::TransitionInProgress)
        ));

        assert!(background.await.unwrap().unwrap().is_some());
        assert_eq!(session.status(), SessionStatus::Idle);
        assert_eq!(session.summary().await.stitches_completed, 1);
    }

    #[tokio::test]
    async fn test_select_tube() {
        let store = Arc::new(TestStore::default());
        let session = start_with(store.clone()).await;

        session.select_tube(TubeIndex::Three).await.unwrap();
        let presented = session.current().await.unwrap();
        assert_eq!(presented.tube, TubeIndex::Three);
        assert_eq!(
            store.load("learner").await.unwrap().unwrap().active_tube,
            TubeIndex::Three
        );
    }

    #[tokio::test]
    async fn test_corrupt_saved_state_fails_start() {
        let store = Arc::new(TestStore::default());
        let mut state = TubeState::new("learner".to_string());
        let mut position = StitchPosition::new("x".to_string(), 0);
        position.skip_number = 7;
        state.tubes[0].positions.push(position);
        store.inner.save("learner", &state).await.unwrap();

        let manifest = manifest();
        let resolver = resolver(&manifest);
        let result =
            SessionCoordinator::start("learner", manifest, resolver, store, SessionConfig::default())
                .await;
        assert!(matches!(
            result,
            Err(SessionError::Scheduler(SchedulerError::CorruptState(_)))
        ));
    }

    #[tokio::test]
    async fn test_empty_tube_falls_through_to_seeded_tube() {
        let json = serde_json::json!({
            "version": 1,
            "tubes": { "2": { "threads": { "t2": { "title": "Only", "stitches": [
                { "id": "only-1", "order": 1, "title": "" },
                { "id": "only-2", "order": 2, "title": "" }
            ] } } } }
        });
        let manifest = Arc::new(ContentManifest::from_json(&json.to_string()).unwrap());
        let resolver = resolver(&manifest);
        let session = SessionCoordinator::start(
            "learner",
            manifest,
            resolver,
            Arc::new(MemoryStateStore::new()),
            SessionConfig { prefetch_window: 0 },
        )
        .await
        .unwrap();

        let presented = session.current().await.unwrap();
        assert_eq!(presented.tube, TubeIndex::Two);
        assert_eq!(presented.stitch.id, "only-1");
        assert_eq!(presented.source, SourceTier::Synthetic);
    }

    #[tokio::test]
    async fn test_slow_fetch_does_not_block_reads() {
        let manifest = remote_only_manifest();
        let bundled = Arc::new(BundledDataset::embedded().unwrap());
        let resolver = ContentResolver::builder(Arc::clone(&manifest), bundled)
            .fetcher(Arc::new(SlowFetcher {
                delay: Duration::from_millis(600),
            }))
            .build();
        let session = Arc::new(
            SessionCoordinator::start(
                "learner",
                manifest,
                resolver,
                Arc::new(MemoryStateStore::new()),
                SessionConfig { prefetch_window: 0 },
            )
            .await
            .unwrap(),
        );

        let background = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.current().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        let stitches = session.tube_stitches(TubeIndex::One).await;
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(stitches.len(), 2);
        assert!(!background.is_finished());

        let presented = background.await.unwrap().unwrap();
        assert_eq!(presented.stitch.id, "remote-1");
        assert_eq!(presented.source, SourceTier::Network);
    }

    #[tokio::test]
    async fn test_summary_counters_saturate() {
        let store = Arc::new(TestStore::default());
        let session = start_with(store).await;

        for _ in 0..2 {
            let current = session.current().await.unwrap();
            session
                .complete(&current.stitch.id, u32::MAX, u32::MAX)
                .await
                .unwrap()
                .unwrap();
        }

        let summary = session.summary().await;
        assert_eq!(summary.stitches_completed, 2);
        assert_eq!(summary.perfect_stitches, 2);
        assert_eq!(summary.questions_answered, u32::MAX);
        assert_eq!(summary.questions_correct, u32::MAX);
        assert_eq!(summary.accuracy(), Some(1.0));
    }

    #[tokio::test]
    async fn test_state_saved_for_another_user_fails_start() {
        let store = Arc::new(TestStore::default());
        let state = TubeState::new("someone-else".to_string());
        store.inner.save("learner", &state).await.unwrap();

        let manifest = manifest();
        let resolver = resolver(&manifest);
        let result = SessionCoordinator::start(
            "learner",
            manifest,
            resolver,
            store.clone(),
            SessionConfig::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(SessionError::Scheduler(SchedulerError::CorruptState(_)))
        ));
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }
}
