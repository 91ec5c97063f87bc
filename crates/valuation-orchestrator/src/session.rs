//! Per-ticker session state.
//!
//! A `Session` is created when a ticker is opened and dropped when another
//! ticker replaces it; everything scoped to one ticker (budget, lock,
//! cached inputs and results) lives here rather than in globals.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use valuation_core::{
    stats, CapitalIntensityProfile, CompanyMarketData, DCFAssumptions, DcfDefaults,
    FinancialDataSet, ModelId, Sector, ValuationError, ValuationResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Fetching,
    Computing,
    Done,
    Error,
    Blocked,
}

/// Counter of system-initiated recalculations.
pub struct CostBudget {
    used: AtomicU32,
    limit: u32,
}

impl CostBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            used: AtomicU32::new(0),
            limit,
        }
    }

    /// Consume one unit. Returns false, consuming nothing, once exhausted.
    pub fn try_charge(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used())
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

/// Non-re-entrant lock: a second acquirer is refused, never queued.
#[derive(Default)]
pub struct CalculationLock {
    held: AtomicBool,
}

impl CalculationLock {
    pub fn try_acquire(&self) -> Option<CalculationGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CalculationGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

pub struct CalculationGuard<'a> {
    lock: &'a CalculationLock,
}

impl Drop for CalculationGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

/// Tracks how long the fair value has stayed within tolerance.
pub struct FairValueTracker {
    tolerance: f64,
    last: std::sync::Mutex<Option<(f64, Instant)>>,
}

impl FairValueTracker {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            last: std::sync::Mutex::new(None),
        }
    }

    /// Record a new fair value. The stability clock restarts only when the
    /// value moves by more than the tolerance.
    pub fn observe(&self, value: f64) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let moved = match *last {
            Some((previous, _)) => stats::relative_change(previous, value) > self.tolerance,
            None => true,
        };
        if moved {
            *last = Some((value, Instant::now()));
        }
    }

    /// Time since the value last moved, `None` before the first observation.
    pub fn stable_for(&self) -> Option<Duration> {
        let last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        last.map(|(_, since)| since.elapsed())
    }

    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Cache entry with timestamp.
pub(crate) struct CacheEntry<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

/// Everything fetched for the ticker, once per session.
pub struct SessionInputs {
    pub financials: FinancialDataSet,
    /// Why `financials` is empty, when the fetch failed.
    pub financials_error: Option<ValuationError>,
    pub market: CompanyMarketData,
    pub advisory_defaults: Option<DcfDefaults>,
}

pub struct Session {
    ticker: String,
    sector: Sector,
    state: RwLock<SessionState>,
    pub(crate) budget: CostBudget,
    pub(crate) lock: CalculationLock,
    pub(crate) edit_generation: AtomicU64,
    pub(crate) results: DashMap<ModelId, CacheEntry<ValuationResult>>,
    pub(crate) inputs: RwLock<Option<Arc<SessionInputs>>>,
    pub(crate) assumptions: RwLock<Option<DCFAssumptions>>,
    pub(crate) rationale: RwLock<BTreeMap<String, String>>,
    pub(crate) capital_intensity: RwLock<Option<CapitalIntensityProfile>>,
    pub(crate) active_model: RwLock<ModelId>,
    pub(crate) fair_value: FairValueTracker,
}

impl Session {
    pub fn new(
        ticker: &str,
        sector: Sector,
        active_model: ModelId,
        cost_budget: u32,
        stability_tolerance: f64,
    ) -> Self {
        Self {
            ticker: ticker.trim().to_uppercase(),
            sector,
            state: RwLock::new(SessionState::Idle),
            budget: CostBudget::new(cost_budget),
            lock: CalculationLock::default(),
            edit_generation: AtomicU64::new(0),
            results: DashMap::new(),
            inputs: RwLock::new(None),
            assumptions: RwLock::new(None),
            rationale: RwLock::new(BTreeMap::new()),
            capital_intensity: RwLock::new(None),
            active_model: RwLock::new(active_model),
            fair_value: FairValueTracker::new(stability_tolerance),
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn sector(&self) -> Sector {
        self.sector
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub(crate) async fn set_state(&self, next: SessionState) {
        let mut state = self.state.write().await;
        if *state != next {
            tracing::debug!(
                ticker = %self.ticker,
                from = ?*state,
                to = ?next,
                "Session state change"
            );
            *state = next;
        }
    }

    pub fn budget_used(&self) -> u32 {
        self.budget.used()
    }

    pub fn budget_remaining(&self) -> u32 {
        self.budget.remaining()
    }

    pub fn is_calculating(&self) -> bool {
        self.lock.is_held()
    }

    pub async fn active_model(&self) -> ModelId {
        *self.active_model.read().await
    }

    pub async fn assumptions(&self) -> Option<DCFAssumptions> {
        self.assumptions.read().await.clone()
    }

    /// Why each assumption holds its value.
    pub async fn rationale(&self) -> BTreeMap<String, String> {
        self.rationale.read().await.clone()
    }

    pub async fn capital_intensity(&self) -> Option<CapitalIntensityProfile> {
        self.capital_intensity.read().await.clone()
    }

    /// Last result for `model` if younger than `ttl_secs`.
    pub fn cached_result(&self, model: ModelId, ttl_secs: i64) -> Option<ValuationResult> {
        let entry = self.results.get(&model)?;
        let age = Utc::now().signed_duration_since(entry.cached_at);
        if age < chrono::Duration::seconds(ttl_secs) {
            Some(entry.data.clone())
        } else {
            tracing::debug!(ticker = %self.ticker, model = %model, "Cached result expired");
            None
        }
    }

    pub(crate) fn store_result(&self, result: ValuationResult) {
        self.results.insert(
            result.model,
            CacheEntry {
                data: result,
                cached_at: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhausts_and_resets() {
        let budget = CostBudget::new(10);
        for _ in 0..10 {
            assert!(budget.try_charge());
        }
        assert!(!budget.try_charge());
        assert_eq!(budget.used(), 10);
        assert_eq!(budget.remaining(), 0);
        budget.reset();
        assert_eq!(budget.used(), 0);
        assert!(budget.try_charge());
    }

    #[test]
    fn test_lock_is_not_reentrant() {
        let lock = CalculationLock::default();
        let guard = lock.try_acquire();
        assert!(guard.is_some());
        assert!(lock.try_acquire().is_none());
        drop(guard);
        assert!(lock.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_restarts_only_on_real_moves() {
        let tracker = FairValueTracker::new(0.005);
        assert!(tracker.stable_for().is_none());
        tracker.observe(100.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        tracker.observe(100.3);
        assert!(tracker.stable_for().unwrap() >= Duration::from_secs(1));
        tracker.observe(110.0);
        assert!(tracker.stable_for().unwrap() < Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let s = Session::new(" tcs ", Sector::It, ModelId::ItEvRevenue, 10, 0.005);
        assert_eq!(s.ticker(), "TCS");
        assert_eq!(s.state().await, SessionState::Idle);
        assert_eq!(s.budget_used(), 0);
    }
}
