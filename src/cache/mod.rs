//! Session result cache
//!
//! Process-wide store of decoded race sessions keyed by round number. The
//! first read moves the cache from `Unloaded` to `Loaded` exactly once:
//!
//! - in [`LoadMode::Warm`] it sweeps every round of the season first,
//! - in [`LoadMode::Restricted`] it loads nothing up front and fetches each
//!   uncached round on the read that asks for it.
//!
//! The warm sweep runs as its own task. A reader that is dropped while
//! waiting for it leaves the sweep running, and the next reader waits on
//! the same task instead of starting over.
//!
//! Entries are write-once. A round that fails to fetch or validate never
//! appears in either map.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::data::session::{RawSession, SessionSource};
use crate::error::{LoadError, LookupError};
use crate::models::{DriverPerformance, LapRecord, PredictionContext, RaceSessionRecord};

/// How the cache populates itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Sweep the whole season on the first read
    Warm,
    /// Load single rounds on demand, for short-lived execution environments
    Restricted,
}

impl LoadMode {
    /// Parse a mode name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warm" => Some(LoadMode::Warm),
            "restricted" | "cold" => Some(LoadMode::Restricted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Warm => "warm",
            LoadMode::Restricted => "restricted",
        }
    }
}

/// Lifecycle of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Unloaded,
    Loading,
    Loaded,
}

impl CacheState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_LOADING => CacheState::Loading,
            STATE_LOADED => CacheState::Loaded,
            _ => CacheState::Unloaded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Unloaded => "unloaded",
            CacheState::Loading => "loading",
            CacheState::Loaded => "loaded",
        }
    }
}

const STATE_UNLOADED: u8 = 0;
const STATE_LOADING: u8 = 1;
const STATE_LOADED: u8 = 2;

#[derive(Default)]
struct CacheEntries {
    results: BTreeMap<u32, Arc<RaceSessionRecord>>,
    details: BTreeMap<u32, Arc<RawSession>>,
}

/// Everything the sweep task needs, shared with the cache handle
struct Shared<S> {
    source: S,
    season: u16,
    total_rounds: u32,
    state: AtomicU8,
    entries: RwLock<CacheEntries>,
}

impl<S: SessionSource> Shared<S> {
    fn state(&self) -> CacheState {
        CacheState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn cached_result(&self, round: u32) -> Option<Arc<RaceSessionRecord>> {
        self.entries.read().results.get(&round).cloned()
    }

    fn cached_detail(&self, round: u32) -> Option<Arc<RawSession>> {
        self.entries.read().details.get(&round).cloned()
    }

    /// Try every round once, in order, then mark the cache loaded
    async fn sweep<F>(&self, mut on_round: F)
    where
        F: FnMut(u32, Result<(), &LoadError>),
    {
        info!(
            "Warming session cache for {} ({} rounds)",
            self.season, self.total_rounds
        );

        let mut loaded = 0;
        for round in 1..=self.total_rounds {
            match self.load_round(round).await {
                Ok(()) => {
                    loaded += 1;
                    on_round(round, Ok(()));
                }
                Err(e) => {
                    warn!("Skipping round {}: {}", round, e);
                    on_round(round, Err(&e));
                }
            }
        }

        info!(
            "Session cache warm: {}/{} rounds loaded",
            loaded, self.total_rounds
        );
        // Set even when rounds failed; the sweep never runs twice
        self.state.store(STATE_LOADED, Ordering::Release);
    }

    /// Fetch, validate and insert one round
    async fn load_round(&self, round: u32) -> Result<(), LoadError> {
        debug!("Fetching round {} of {}", round, self.season);
        let mut session = self
            .source
            .fetch_session(self.season, round)
            .await
            .map_err(|e| LoadError::Upstream {
                round,
                source: Box::new(e),
            })?;

        session
            .validate()
            .map_err(|reason| LoadError::Validation { round, reason })?;

        session.round = round;
        let record = Arc::new(session.to_record());
        let session = Arc::new(session);

        let mut entries = self.entries.write();
        entries.results.entry(round).or_insert(record);
        entries.details.entry(round).or_insert(session);
        Ok(())
    }
}

/// In-memory race session cache over a [`SessionSource`]
pub struct SessionResultCache<S: SessionSource> {
    shared: Arc<Shared<S>>,
    mode: LoadMode,
    // Serializes on-demand loads and holds the running warm sweep
    loader: Mutex<Option<JoinHandle<()>>>,
}

impl<S: SessionSource + 'static> SessionResultCache<S> {
    pub fn new(source: S, season: u16, total_rounds: u32, mode: LoadMode) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                season,
                total_rounds,
                state: AtomicU8::new(STATE_UNLOADED),
                entries: RwLock::new(CacheEntries::default()),
            }),
            mode,
            loader: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CacheState {
        self.shared.state()
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn total_rounds(&self) -> u32 {
        self.shared.total_rounds
    }

    /// Rounds currently held, ascending
    pub fn cached_rounds(&self) -> Vec<u32> {
        self.shared.entries.read().results.keys().copied().collect()
    }

    /// Race result for one round
    pub async fn get(&self, round: u32) -> Result<Arc<RaceSessionRecord>, LookupError> {
        self.ensure_loaded().await;

        if let Some(record) = self.shared.cached_result(round) {
            return Ok(record);
        }
        if self.mode == LoadMode::Restricted {
            self.load_on_demand(round).await;
            if let Some(record) = self.shared.cached_result(round) {
                return Ok(record);
            }
        }
        Err(LookupError::RoundNotFound(round))
    }

    /// Every cached race result, ascending by round
    pub async fn get_all(&self) -> Vec<Arc<RaceSessionRecord>> {
        self.ensure_loaded().await;
        self.shared.entries.read().results.values().cloned().collect()
    }

    /// Lap and stint drill-down for one driver in one round
    pub async fn get_driver_detail(
        &self,
        round: u32,
        driver_code: &str,
    ) -> Result<DriverPerformance, LookupError> {
        let session = self.detail(round).await?;
        session
            .driver_performance(driver_code)
            .ok_or_else(|| driver_not_found(round, driver_code))
    }

    /// A driver's laps and the model context for the lap after their last one
    pub async fn replay_inputs(
        &self,
        round: u32,
        driver_code: &str,
    ) -> Result<(Vec<LapRecord>, PredictionContext), LookupError> {
        let session = self.detail(round).await?;
        let laps = session.laps_for(driver_code);
        let last = laps
            .last()
            .copied()
            .ok_or_else(|| driver_not_found(round, driver_code))?;

        let mut context = session.prediction_context(driver_code, Some(last));
        context.lap_number = Some(last.lap_number as f64 + 1.0);
        context.tyre_life = Some(last.tyre_life as f64 + 1.0);

        Ok((laps.into_iter().cloned().collect(), context))
    }

    /// Run the warm-up now, reporting each round's outcome
    ///
    /// Does nothing once the cache is loaded. In restricted mode it only
    /// marks the cache loaded. If a sweep is already running, this waits for
    /// it and `on_round` is not called.
    pub async fn warm_up_with<F>(&self, on_round: F)
    where
        F: FnMut(u32, Result<(), &LoadError>) + Send + 'static,
    {
        if self.state() == CacheState::Loaded {
            return;
        }
        let mut loader = self.loader.lock().await;
        if self.state() == CacheState::Loaded {
            return;
        }

        if self.mode == LoadMode::Restricted {
            info!("Restricted mode: rounds are loaded on demand");
            self.shared.state.store(STATE_LOADED, Ordering::Release);
            return;
        }

        let sweep = loader.get_or_insert_with(|| {
            self.shared.state.store(STATE_LOADING, Ordering::Release);
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move { shared.sweep(on_round).await })
        });
        // Dropping this future here leaves the task and its handle in place
        if let Err(e) = sweep.await {
            warn!("Warm-up sweep aborted: {}", e);
        }
        *loader = None;
        self.shared.state.store(STATE_LOADED, Ordering::Release);
    }

    async fn ensure_loaded(&self) {
        if self.state() != CacheState::Loaded {
            self.warm_up_with(|_, _| {}).await;
        }
    }

    async fn detail(&self, round: u32) -> Result<Arc<RawSession>, LookupError> {
        self.ensure_loaded().await;

        if let Some(session) = self.shared.cached_detail(round) {
            return Ok(session);
        }
        if self.mode == LoadMode::Restricted {
            self.load_on_demand(round).await;
            if let Some(session) = self.shared.cached_detail(round) {
                return Ok(session);
            }
        }
        Err(LookupError::RoundNotFound(round))
    }

    async fn load_on_demand(&self, round: u32) {
        if round == 0 || round > self.shared.total_rounds {
            debug!("Round {} outside season, not fetching", round);
            return;
        }

        let _guard = self.loader.lock().await;
        if self.shared.cached_result(round).is_some() {
            return;
        }
        if let Err(e) = self.shared.load_round(round).await {
            warn!("On-demand load failed: {}", e);
        }
    }
}

fn driver_not_found(round: u32, driver_code: &str) -> LookupError {
    LookupError::DriverNotFound {
        round,
        driver: driver_code.to_ascii_uppercase(),
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::session::tests::sample_session;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("round {0} unavailable")]
    struct FakeError(u32);

    /// Session source that counts fetches and fails chosen rounds
    #[derive(Default)]
    struct FakeSource {
        failing: HashSet<u32>,
        empty: HashSet<u32>,
        delay: Option<Duration>,
        fetches: SyncMutex<HashMap<u32, usize>>,
    }

    impl FakeSource {
        fn failing(rounds: &[u32]) -> Self {
            Self {
                failing: rounds.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn fetch_count(&self, round: u32) -> usize {
            self.fetches.lock().get(&round).copied().unwrap_or(0)
        }

        fn total_fetches(&self) -> usize {
            self.fetches.lock().values().sum()
        }
    }

    impl SessionSource for FakeSource {
        type Error = FakeError;

        async fn fetch_session(&self, _season: u16, round: u32) -> Result<RawSession, FakeError> {
            *self.fetches.lock().entry(round).or_insert(0) += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&round) {
                return Err(FakeError(round));
            }
            let mut session = sample_session(round);
            if self.empty.contains(&round) {
                session.results.clear();
            }
            Ok(session)
        }
    }

    fn cache(source: FakeSource, rounds: u32, mode: LoadMode) -> SessionResultCache<FakeSource> {
        SessionResultCache::new(source, 2025, rounds, mode)
    }

    #[test]
    fn test_load_mode_parse() {
        assert_eq!(LoadMode::parse("WARM"), Some(LoadMode::Warm));
        assert_eq!(LoadMode::parse(" restricted "), Some(LoadMode::Restricted));
        assert_eq!(LoadMode::parse("cold"), Some(LoadMode::Restricted));
        assert_eq!(LoadMode::parse("lazy"), None);
    }

    #[tokio::test]
    async fn test_warm_sweep_skips_failed_rounds() {
        let mut source = FakeSource::failing(&[2, 4]);
        source.empty.insert(5);
        let cache = cache(source, 6, LoadMode::Warm);
        assert_eq!(cache.state(), CacheState::Unloaded);

        let all = cache.get_all().await;
        let rounds: Vec<u32> = all.iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![1, 3, 6]);
        assert_eq!(cache.state(), CacheState::Loaded);

        // Failed rounds are absent from both maps
        for round in [2, 4, 5] {
            assert_eq!(cache.get(round).await, Err(LookupError::RoundNotFound(round)));
            assert_eq!(
                cache.get_driver_detail(round, "VER").await,
                Err(LookupError::RoundNotFound(round))
            );
        }
        // No negative retries after the sweep
        assert_eq!(cache.shared.source.fetch_count(2), 1);
    }

    #[tokio::test]
    async fn test_repeated_get_returns_same_entry() {
        let cache = cache(FakeSource::default(), 3, LoadMode::Warm);
        let first = cache.get(2).await.unwrap();
        let second = cache.get(2).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(cache.shared.source.total_fetches(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_reads_sweep_once() {
        let source = FakeSource {
            delay: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        let cache = Arc::new(cache(source, 4, LoadMode::Warm));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(i % 4 + 1).await.is_ok() })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        for round in 1..=4 {
            assert_eq!(cache.shared.source.fetch_count(round), 1);
        }
        assert_eq!(cache.cached_rounds(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_restricted_mode_loads_on_demand() {
        let cache = cache(FakeSource::default(), 24, LoadMode::Restricted);
        assert!(cache.get_all().await.is_empty());
        assert_eq!(cache.state(), CacheState::Loaded);
        assert_eq!(cache.shared.source.total_fetches(), 0);

        let record = cache.get(7).await.unwrap();
        assert_eq!(record.round, 7);
        cache.get(7).await.unwrap();
        assert_eq!(cache.shared.source.fetch_count(7), 1);

        // Driver detail also loads on demand
        let perf = cache.get_driver_detail(9, "nor").await.unwrap();
        assert_eq!(perf.total_laps, 2);

        let rounds: Vec<u32> = cache.get_all().await.iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![7, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_first_read_does_not_restart_sweep() {
        let source = FakeSource {
            delay: Some(Duration::from_millis(20)),
            ..FakeSource::failing(&[2])
        };
        let cache = cache(source, 4, LoadMode::Warm);

        // Reader gives up while round 4 is still in flight
        let first = tokio::time::timeout(Duration::from_millis(70), cache.get_all()).await;
        assert!(first.is_err());
        assert_eq!(cache.state(), CacheState::Loading);

        let rounds: Vec<u32> = cache.get_all().await.iter().map(|r| r.round).collect();
        assert_eq!(rounds, vec![1, 3, 4]);
        assert_eq!(cache.state(), CacheState::Loaded);
        for round in 1..=4 {
            assert_eq!(cache.shared.source.fetch_count(round), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_finishes_without_a_waiting_reader() {
        let source = FakeSource {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let cache = cache(source, 3, LoadMode::Warm);

        let first = tokio::time::timeout(Duration::from_millis(10), cache.get(1)).await;
        assert!(first.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cache.state(), CacheState::Loaded);
        assert_eq!(cache.cached_rounds(), vec![1, 2, 3]);
        cache.get(3).await.unwrap();
        assert_eq!(cache.shared.source.total_fetches(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_on_demand_reads_fetch_once() {
        let source = FakeSource {
            delay: Some(Duration::from_millis(5)),
            ..Default::default()
        };
        let cache = Arc::new(cache(source, 24, LoadMode::Restricted));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(7).await.map(|r| r.round) })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }

        assert_eq!(cache.shared.source.fetch_count(7), 1);
        assert_eq!(cache.cached_rounds(), vec![7]);
    }

    #[tokio::test]
    async fn test_restricted_mode_retries_failing_round() {
        let cache = cache(FakeSource::failing(&[3]), 24, LoadMode::Restricted);
        for _ in 0..3 {
            assert_eq!(cache.get(3).await, Err(LookupError::RoundNotFound(3)));
        }
        assert_eq!(cache.shared.source.fetch_count(3), 3);
        assert!(cache.cached_rounds().is_empty());
    }

    #[tokio::test]
    async fn test_restricted_mode_ignores_rounds_outside_season() {
        let cache = cache(FakeSource::default(), 24, LoadMode::Restricted);
        assert!(cache.get(0).await.is_err());
        assert!(cache.get(25).await.is_err());
        assert_eq!(cache.shared.source.total_fetches(), 0);
    }

    #[tokio::test]
    async fn test_driver_detail_not_found() {
        let cache = cache(FakeSource::default(), 2, LoadMode::Warm);
        let err = cache.get_driver_detail(1, "ham").await.unwrap_err();
        assert_eq!(
            err,
            LookupError::DriverNotFound {
                round: 1,
                driver: "HAM".to_string()
            }
        );

        let perf = cache.get_driver_detail(1, "VER").await.unwrap();
        assert_eq!(perf.stints.len(), 3);
        assert_eq!(perf.finish_position, Some(1));
    }

    #[tokio::test]
    async fn test_replay_inputs_advance_one_lap() {
        let cache = cache(FakeSource::default(), 2, LoadMode::Warm);
        let (laps, context) = cache.replay_inputs(2, "VER").await.unwrap();
        assert_eq!(laps.len(), 8);
        assert_eq!(context.lap_number, Some(9.0));
        assert_eq!(context.tyre_life, Some(3.0));
        assert_eq!(context.compound.as_deref(), Some("HARD"));

        assert!(cache.replay_inputs(2, "SAI").await.is_err());
    }

    #[tokio::test]
    async fn test_warm_up_reports_each_round() {
        let cache = cache(FakeSource::failing(&[2]), 3, LoadMode::Warm);
        let outcomes = Arc::new(SyncMutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        cache
            .warm_up_with(move |round, result| sink.lock().push((round, result.is_ok())))
            .await;
        assert_eq!(*outcomes.lock(), vec![(1, true), (2, false), (3, true)]);

        // Second call is a no-op
        cache.warm_up_with(|_, _| panic!("sweep ran twice")).await;
        assert_eq!(cache.shared.source.total_fetches(), 3);
    }
}
