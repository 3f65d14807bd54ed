//! Content Resolution - tiered stitch lookup with a look-ahead window
//!
//! # Tiers (in resolution priority order)
//!
//! 1. **Memory** - resolved stitches held in process (bundled content is
//!    seeded here at start-up and after every invalidation)
//! 2. **Persisted** - stitches fetched earlier, stored on the device
//! 3. **Bundled** - content shipped with the client
//! 4. **Network** - batched fetch from the content API (full access only)
//! 5. **Synthetic** - deterministic placeholder, so a learner is never blocked
//!
//! `resolve` never fails: each tier's failure falls through to the next.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bundled::BundledDataset;
use super::cache_store::ContentCacheStore;
use super::fallback;
use super::fetch::{ContentFetcher, FetchError};
use super::models::{CacheEntry, ContentAccess, ResolvedStitch, SourceTier, Stitch};
use crate::manifest::ContentManifest;
use crate::scheduler::TubeIndex;

/// Counters describing how lookups were satisfied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStats {
    pub memory_hits: u64,
    pub persisted_hits: u64,
    pub bundled_hits: u64,
    pub network_hits: u64,
    pub network_calls: u64,
    pub network_failures: u64,
    pub fallbacks: u64,
}

#[derive(Default)]
struct StatsCounters {
    memory_hits: AtomicU64,
    persisted_hits: AtomicU64,
    bundled_hits: AtomicU64,
    network_hits: AtomicU64,
    network_calls: AtomicU64,
    network_failures: AtomicU64,
    fallbacks: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            persisted_hits: self.persisted_hits.load(Ordering::Relaxed),
            bundled_hits: self.bundled_hits.load(Ordering::Relaxed),
            network_hits: self.network_hits.load(Ordering::Relaxed),
            network_calls: self.network_calls.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one look-ahead pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchReport {
    /// Ids in the window
    pub requested: usize,
    /// Already in memory, skipped
    pub already_cached: usize,
    /// Brought into memory by this pass
    pub resolved: usize,
    /// Could not be resolved; left for `resolve` to handle on demand
    pub failed: usize,
    pub cancelled: bool,
}

/// Handle to a background prefetch
pub struct PrefetchHandle {
    token: CancellationToken,
    handle: JoinHandle<PrefetchReport>,
}

impl PrefetchHandle {
    /// Stop the prefetch. Stitches already written stay cached; a batch in
    /// flight is dropped whole.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the prefetch; `None` if the task died
    pub async fn join(self) -> Option<PrefetchReport> {
        match self.handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                log::warn!("Prefetch task failed: {}", e);
                None
            }
        }
    }
}

struct ResolverInner {
    memory: RwLock<HashMap<String, CacheEntry>>,
    persisted: Option<ContentCacheStore>,
    bundled: Arc<BundledDataset>,
    manifest: Arc<ContentManifest>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    access: RwLock<ContentAccess>,
    /// Ids of the current look-ahead window, batched into network fetches
    lookahead: Mutex<Vec<String>>,
    /// Serialises network batches so concurrent misses share one call
    fetch_lock: tokio::sync::Mutex<()>,
    /// Bumped by `invalidate`; fetches started under an older generation are
    /// not written back
    generation: AtomicU64,
    stats: StatsCounters,
}

/// Builder for [`ContentResolver`]
pub struct ContentResolverBuilder {
    manifest: Arc<ContentManifest>,
    bundled: Arc<BundledDataset>,
    persisted: Option<ContentCacheStore>,
    fetcher: Option<Arc<dyn ContentFetcher>>,
    access: ContentAccess,
}

impl ContentResolverBuilder {
    pub fn persisted(mut self, store: ContentCacheStore) -> Self {
        self.persisted = Some(store);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn access(mut self, access: ContentAccess) -> Self {
        self.access = access;
        self
    }

    pub fn build(self) -> ContentResolver {
        let resolver = ContentResolver {
            inner: Arc::new(ResolverInner {
                memory: RwLock::new(HashMap::new()),
                persisted: self.persisted,
                bundled: self.bundled,
                manifest: self.manifest,
                fetcher: self.fetcher,
                access: RwLock::new(self.access),
                lookahead: Mutex::new(Vec::new()),
                fetch_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                stats: StatsCounters::default(),
            }),
        };
        resolver.seed_bundled();
        resolver
    }
}

/// Tiered content buffer. Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct ContentResolver {
    inner: Arc<ResolverInner>,
}

impl ContentResolver {
    pub fn builder(
        manifest: Arc<ContentManifest>,
        bundled: Arc<BundledDataset>,
    ) -> ContentResolverBuilder {
        ContentResolverBuilder {
            manifest,
            bundled,
            persisted: None,
            fetcher: None,
            access: ContentAccess::default(),
        }
    }

    pub fn manifest(&self) -> &Arc<ContentManifest> {
        &self.inner.manifest
    }

    pub fn access(&self) -> ContentAccess {
        self.inner
            .access
            .read()
            .map(|a| *a)
            .unwrap_or(ContentAccess::BundledOnly)
    }

    pub fn set_access(&self, access: ContentAccess) {
        if let Ok(mut current) = self.inner.access.write() {
            *current = access;
        }
    }

    pub fn stats(&self) -> ResolverStats {
        self.inner.stats.snapshot()
    }

    pub fn is_cached(&self, stitch_id: &str) -> bool {
        self.inner
            .memory
            .read()
            .map(|m| m.contains_key(stitch_id))
            .unwrap_or(false)
    }

    /// Ids currently held in memory, sorted
    pub fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .memory
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Source tier recorded for a cached stitch
    pub fn cached_origin(&self, stitch_id: &str) -> Option<SourceTier> {
        self.inner
            .memory
            .read()
            .ok()
            .and_then(|m| m.get(stitch_id).map(|e| e.source_tier))
    }

    /// Content for a stitch. Never fails.
    pub async fn get_stitch(&self, stitch_id: &str) -> Arc<Stitch> {
        self.resolve(stitch_id).await.stitch
    }

    /// Content for a stitch plus the tier that supplied it. Never fails.
    pub async fn resolve(&self, stitch_id: &str) -> ResolvedStitch {
        if let Some(hit) = self.lookup_local(stitch_id) {
            return hit;
        }

        if let Some(fetcher) = self.network_fetcher() {
            let _guard = self.inner.fetch_lock.lock().await;

            // Another caller may have fetched it while we waited
            if let Some(hit) = self.memory_hit(stitch_id) {
                return hit;
            }

            let mut batch = vec![stitch_id.to_string()];
            batch.extend(self.missing_lookahead(stitch_id));

            match self.fetch_and_store(fetcher.as_ref(), &batch).await {
                Ok(fetched) => {
                    if let Some(stitch) = fetched.into_iter().find(|s| s.id == stitch_id) {
                        // A stale batch was not cached; keep the one stitch asked for
                        if !self.is_cached(stitch_id) {
                            self.store_network(Arc::clone(&stitch));
                        }
                        StatsCounters::bump(&self.inner.stats.network_hits);
                        return ResolvedStitch {
                            stitch,
                            source: SourceTier::Network,
                        };
                    }
                    log::warn!("Content service has no stitch {}", stitch_id);
                }
                Err(e) => {
                    log::warn!("Network tier failed for {}: {}", stitch_id, e);
                }
            }
        }

        self.synthesize(stitch_id)
    }

    /// Warm the cache for the stitches after `from_id` in a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn prefetch(&self, tube: TubeIndex, from_id: &str, window: usize) -> PrefetchHandle {
        let token = CancellationToken::new();
        let resolver = self.clone();
        let from_id = from_id.to_string();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let report = resolver
                .prefetch_now(tube, &from_id, window, &task_token)
                .await;
            log::debug!("Prefetch after {} in tube {}: {:?}", from_id, tube, report);
            report
        });

        PrefetchHandle { token, handle }
    }

    /// Run one look-ahead pass inline.
    ///
    /// Walks the manifest's canonical order for `tube` from `from_id`,
    /// skipping stitches already in memory. Never synthesises fallbacks and
    /// never reports errors: anything unresolved is counted as failed.
    pub async fn prefetch_now(
        &self,
        tube: TubeIndex,
        from_id: &str,
        window: usize,
        token: &CancellationToken,
    ) -> PrefetchReport {
        let upcoming = self.inner.manifest.upcoming(tube, from_id, window);
        if let Ok(mut lookahead) = self.inner.lookahead.lock() {
            *lookahead = upcoming.clone();
        }

        let mut report = PrefetchReport {
            requested: upcoming.len(),
            ..Default::default()
        };

        let mut missing = Vec::new();
        for id in &upcoming {
            if token.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            if self.is_cached(id) {
                report.already_cached += 1;
            } else if self.lookup_local(id).is_some() {
                report.resolved += 1;
            } else {
                missing.push(id.clone());
            }
        }

        if missing.is_empty() {
            return report;
        }
        let Some(fetcher) = self.network_fetcher() else {
            report.failed += missing.len();
            return report;
        };

        let _guard = tokio::select! {
            _ = token.cancelled() => {
                report.cancelled = true;
                return report;
            }
            guard = self.inner.fetch_lock.lock() => guard,
        };

        // A concurrent resolve may have filled some of these
        missing.retain(|id| !self.is_cached(id));
        if missing.is_empty() {
            return report;
        }

        tokio::select! {
            _ = token.cancelled() => {
                report.cancelled = true;
            }
            result = self.fetch_and_store(fetcher.as_ref(), &missing) => match result {
                Ok(_) => {
                    let found = missing.iter().filter(|id| self.is_cached(id)).count();
                    report.resolved += found;
                    report.failed += missing.len() - found;
                }
                Err(e) => {
                    log::warn!("Prefetch of {} stitches failed: {}", missing.len(), e);
                    report.failed += missing.len();
                }
            },
        }

        report
    }

    /// Drop the memory and persisted tiers, then re-seed bundled content
    pub fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        if let Ok(mut memory) = self.inner.memory.write() {
            memory.clear();
        }
        if let Ok(mut lookahead) = self.inner.lookahead.lock() {
            lookahead.clear();
        }
        if let Some(store) = &self.inner.persisted {
            match store.clear() {
                Ok(removed) => log::info!("Cleared {} persisted stitches", removed),
                Err(e) => log::warn!("Failed to clear persisted content cache: {}", e),
            }
        }

        self.seed_bundled();
    }

    fn seed_bundled(&self) {
        let Ok(mut memory) = self.inner.memory.write() else {
            return;
        };
        for (id, stitch) in self.inner.bundled.iter() {
            memory.insert(
                id.clone(),
                CacheEntry {
                    stitch_id: id.clone(),
                    stitch: Arc::clone(stitch),
                    source_tier: SourceTier::Bundled,
                },
            );
        }
        log::debug!("Seeded {} bundled stitches", self.inner.bundled.len());
    }

    fn network_fetcher(&self) -> Option<Arc<dyn ContentFetcher>> {
        match self.access() {
            ContentAccess::Full => self.inner.fetcher.clone(),
            ContentAccess::BundledOnly => None,
        }
    }

    fn memory_entry(&self, stitch_id: &str) -> Option<CacheEntry> {
        self.inner
            .memory
            .read()
            .ok()
            .and_then(|m| m.get(stitch_id).cloned())
    }

    fn memory_hit(&self, stitch_id: &str) -> Option<ResolvedStitch> {
        let entry = self.memory_entry(stitch_id)?;
        StatsCounters::bump(&self.inner.stats.memory_hits);
        Some(ResolvedStitch {
            stitch: entry.stitch,
            source: SourceTier::Memory,
        })
    }

    fn remember(&self, stitch: Arc<Stitch>, tier: SourceTier) {
        if let Ok(mut memory) = self.inner.memory.write() {
            memory.insert(
                stitch.id.clone(),
                CacheEntry {
                    stitch_id: stitch.id.clone(),
                    stitch,
                    source_tier: tier,
                },
            );
        }
    }

    /// Memory, then persisted, then bundled; promotes hits into memory
    fn lookup_local(&self, stitch_id: &str) -> Option<ResolvedStitch> {
        if let Some(hit) = self.memory_hit(stitch_id) {
            return Some(hit);
        }

        if let Some(store) = &self.inner.persisted {
            match store.get(stitch_id) {
                Ok(Some(stitch)) => {
                    let stitch = Arc::new(stitch);
                    self.remember(Arc::clone(&stitch), SourceTier::Persisted);
                    StatsCounters::bump(&self.inner.stats.persisted_hits);
                    return Some(ResolvedStitch {
                        stitch,
                        source: SourceTier::Persisted,
                    });
                }
                Ok(None) => {}
                Err(e) => log::warn!("Persisted cache read failed for {}: {}", stitch_id, e),
            }
        }

        let stitch = self.inner.bundled.get(stitch_id)?;
        self.remember(Arc::clone(&stitch), SourceTier::Bundled);
        StatsCounters::bump(&self.inner.stats.bundled_hits);
        Some(ResolvedStitch {
            stitch,
            source: SourceTier::Bundled,
        })
    }

    /// Look-ahead ids no local tier can supply
    fn missing_lookahead(&self, except: &str) -> Vec<String> {
        let window = self
            .inner
            .lookahead
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default();

        window
            .into_iter()
            .filter(|id| id != except)
            .filter(|id| !self.is_cached(id) && !self.inner.bundled.contains(id))
            .filter(|id| {
                self.inner
                    .persisted
                    .as_ref()
                    .map_or(true, |store| !store.contains(id))
            })
            .collect()
    }

    /// One network call; every returned stitch is cached whole unless an
    /// `invalidate` ran meanwhile. Returns everything the service sent.
    async fn fetch_and_store(
        &self,
        fetcher: &dyn ContentFetcher,
        ids: &[String],
    ) -> Result<Vec<Arc<Stitch>>, FetchError> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        StatsCounters::bump(&self.inner.stats.network_calls);

        let stitches: Vec<Arc<Stitch>> = match fetcher.fetch_batch(ids).await {
            Ok(stitches) => stitches.into_iter().map(Arc::new).collect(),
            Err(e) => {
                StatsCounters::bump(&self.inner.stats.network_failures);
                return Err(e);
            }
        };

        if self.inner.generation.load(Ordering::SeqCst) != generation {
            log::debug!("Not caching {} stitches fetched before invalidation", stitches.len());
            return Ok(stitches);
        }

        for stitch in &stitches {
            self.store_network(Arc::clone(stitch));
        }
        Ok(stitches)
    }

    fn store_network(&self, stitch: Arc<Stitch>) {
        if let Some(store) = &self.inner.persisted {
            if let Err(e) = store.put(&stitch) {
                log::warn!("Failed to persist stitch {}: {}", stitch.id, e);
            }
        }
        self.remember(stitch, SourceTier::Network);
    }

    fn synthesize(&self, stitch_id: &str) -> ResolvedStitch {
        log::warn!(
            "Content unavailable for {}; serving synthetic fallback",
            stitch_id
        );
        let stitch = Arc::new(fallback::synthesize(stitch_id));
        self.remember(Arc::clone(&stitch), SourceTier::Synthetic);
        StatsCounters::bump(&self.inner.stats.fallbacks);
        ResolvedStitch {
            stitch,
            source: SourceTier::Synthetic,
        }
    }
}
