//! Per-type-key circuit breaker middleware.
//!
//! Finite state machine per type key: `closed -> open -> half-open ->
//! closed/open`. State is created lazily on first observation of a
//! non-excluded type and lives in its own mutex, independent of the bus's
//! registration-table lock, so breaker churn never contends with
//! registration/dispatch snapshotting.

use crate::commbus::context::DispatchContext;
use crate::commbus::message::DynMessage;
use crate::commbus::middleware::{BusValue, Middleware};
use crate::types::{CircuitBreakerConfig, Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A type key's circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct KeyState {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
        }
    }
}

/// Circuit breaker middleware, one finite state machine per observed,
/// non-excluded type key.
#[derive(Debug)]
pub struct CircuitBreakerMiddleware {
    failure_threshold: u32,
    reset_timeout: Duration,
    excluded_types: HashSet<String>,
    states: Mutex<HashMap<String, KeyState>>,
}

impl CircuitBreakerMiddleware {
    pub fn new(failure_threshold: u32, reset_timeout: Duration, excluded_types: HashSet<String>) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            excluded_types,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(
            config.failure_threshold,
            config.reset_timeout,
            config.excluded_types.clone(),
        )
    }

    fn is_excluded(&self, type_key: &str) -> bool {
        self.excluded_types.contains(type_key)
    }

    /// Snapshot of every type key's current state.
    pub fn get_states(&self) -> HashMap<String, String> {
        self.states
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.state.as_str().to_string()))
            .collect()
    }

    /// Remove the state entry for one type key, or every entry if `None`.
    /// The type returns to the implicit `closed` state on next observation.
    pub fn reset(&self, type_key: Option<&str>) {
        let mut states = self.states.lock().unwrap_or_else(|poison| poison.into_inner());
        match type_key {
            Some(key) => {
                states.remove(key);
            }
            None => states.clear(),
        }
    }
}

#[async_trait]
impl Middleware for CircuitBreakerMiddleware {
    async fn before(
        &self,
        ctx: &DispatchContext,
        msg: Arc<dyn DynMessage>,
    ) -> Result<Option<Arc<dyn DynMessage>>> {
        let type_key = ctx.type_key();
        if self.is_excluded(type_key) {
            return Ok(Some(msg));
        }

        let mut states = self.states.lock().unwrap_or_else(|poison| poison.into_inner());
        let entry = states.entry(type_key.to_string()).or_default();

        match entry.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(Some(msg)),
            CircuitState::Open => {
                let elapsed = entry.last_failure.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.reset_timeout {
                    entry.state = CircuitState::HalfOpen;
                    tracing::info!(type_key, "circuit breaker: open -> half-open (probe)");
                    Ok(Some(msg))
                } else {
                    tracing::debug!(type_key, "circuit breaker: open, rejecting");
                    Ok(None)
                }
            }
        }
    }

    async fn after(
        &self,
        ctx: &DispatchContext,
        _original: &Arc<dyn DynMessage>,
        _result: Option<&BusValue>,
        error: Option<&Error>,
    ) -> (Option<BusValue>, Option<Error>) {
        let type_key = ctx.type_key();
        if self.is_excluded(type_key) {
            return (None, None);
        }

        let mut states = self.states.lock().unwrap_or_else(|poison| poison.into_inner());
        let entry = states.entry(type_key.to_string()).or_default();

        if error.is_none() {
            if entry.state == CircuitState::HalfOpen {
                entry.state = CircuitState::Closed;
                entry.failures = 0;
                tracing::info!(type_key, "circuit breaker: half-open -> closed (probe succeeded)");
            }
        } else {
            entry.failures += 1;
            entry.last_failure = Some(Instant::now());
            if entry.state == CircuitState::HalfOpen {
                entry.state = CircuitState::Open;
                tracing::warn!(type_key, "circuit breaker: half-open -> open (probe failed)");
            } else if self.failure_threshold > 0 && entry.failures >= self.failure_threshold {
                entry.state = CircuitState::Open;
                tracing::warn!(
                    type_key,
                    failures = entry.failures,
                    "circuit breaker: closed -> open (threshold reached)"
                );
            }
        }
        (None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commbus::message::{Category, Message};

    struct Probe;
    impl Message for Probe {
        type Response = ();
        fn category() -> Category {
            Category::Query
        }
        const TYPE_KEY: &'static str = "GetSettings";
    }

    fn ctx(key: &str) -> DispatchContext {
        DispatchContext::new(
            Arc::from(key),
            Category::Query,
            &tokio_util::sync::CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreakerMiddleware::new(2, Duration::from_millis(50), HashSet::new());
        let c = ctx("GetSettings");
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);

        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("fail 1"))).await;
        assert_eq!(cb.get_states()["GetSettings"], "closed");

        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("fail 2"))).await;
        assert_eq!(cb.get_states()["GetSettings"], "open");

        let outcome = cb.before(&c, msg.clone()).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let cb = CircuitBreakerMiddleware::new(1, Duration::from_millis(10), HashSet::new());
        let c = ctx("GetSettings");
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);

        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("fail"))).await;
        assert_eq!(cb.get_states()["GetSettings"], "open");

        tokio::time::sleep(Duration::from_millis(15)).await;
        let outcome = cb.before(&c, msg.clone()).await.unwrap();
        assert!(outcome.is_some());
        assert_eq!(cb.get_states()["GetSettings"], "half-open");

        cb.after(&c, &msg, None, None).await;
        assert_eq!(cb.get_states()["GetSettings"], "closed");
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens() {
        let cb = CircuitBreakerMiddleware::new(1, Duration::from_millis(10), HashSet::new());
        let c = ctx("GetSettings");
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);

        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("fail"))).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("probe fail"))).await;
        assert_eq!(cb.get_states()["GetSettings"], "open");
    }

    #[tokio::test]
    async fn excluded_types_never_get_state() {
        let mut excluded = HashSet::new();
        excluded.insert("GetSettings".to_string());
        let cb = CircuitBreakerMiddleware::new(1, Duration::from_millis(10), excluded);
        let c = ctx("GetSettings");
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);

        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("fail"))).await;
        assert!(cb.get_states().is_empty());
    }

    #[tokio::test]
    async fn failure_threshold_zero_disables_breaker() {
        let cb = CircuitBreakerMiddleware::new(0, Duration::from_millis(10), HashSet::new());
        let c = ctx("GetSettings");
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);
        for _ in 0..10 {
            cb.before(&c, msg.clone()).await.unwrap();
            cb.after(&c, &msg, None, Some(&Error::internal("fail"))).await;
        }
        assert_eq!(cb.get_states()["GetSettings"], "closed");
    }

    #[tokio::test]
    async fn reset_clears_one_or_all_entries() {
        let cb = CircuitBreakerMiddleware::new(1, Duration::from_millis(10), HashSet::new());
        let c = ctx("GetSettings");
        let msg: Arc<dyn DynMessage> = Arc::new(Probe);
        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("fail"))).await;
        assert!(!cb.get_states().is_empty());

        cb.reset(Some("GetSettings"));
        assert!(cb.get_states().is_empty());

        cb.before(&c, msg.clone()).await.unwrap();
        cb.after(&c, &msg, None, Some(&Error::internal("fail"))).await;
        cb.reset(None);
        assert!(cb.get_states().is_empty());
    }

    /// Reference model for the per-key state machine, checked against the
    /// real implementation over arbitrary failure/success sequences rather
    /// than a handful of hand-picked ones. `reset_timeout` is fixed at zero
    /// so "the timeout has elapsed" is always true and the model doesn't
    /// need to reason about wall-clock time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ModelState {
        Closed,
        Open,
        HalfOpen,
    }

    struct ReferenceModel {
        state: ModelState,
        failures: u32,
        threshold: u32,
    }

    impl ReferenceModel {
        fn new(threshold: u32) -> Self {
            Self {
                state: ModelState::Closed,
                failures: 0,
                threshold,
            }
        }

        fn observe(&mut self, success: bool) -> bool {
            match self.state {
                ModelState::Closed => {
                    if !success {
                        self.failures += 1;
                        if self.threshold > 0 && self.failures >= self.threshold {
                            self.state = ModelState::Open;
                        }
                    }
                    true
                }
                ModelState::Open => {
                    self.state = ModelState::HalfOpen;
                    self.observe(success)
                }
                ModelState::HalfOpen => {
                    if success {
                        self.state = ModelState::Closed;
                        self.failures = 0;
                    } else {
                        self.state = ModelState::Open;
                    }
                    true
                }
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn breaker_matches_reference_model(
            threshold in 1u32..5,
            outcomes in proptest::collection::vec(proptest::prelude::any::<bool>(), 0..30),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let cb = CircuitBreakerMiddleware::new(threshold, Duration::from_millis(0), HashSet::new());
            let mut model = ReferenceModel::new(threshold);
            let c = ctx("GetSettings");

            for success in outcomes {
                let msg: Arc<dyn DynMessage> = Arc::new(Probe);
                let real_allowed = rt.block_on(cb.before(&c, msg.clone())).unwrap().is_some();
                if real_allowed {
                    let err = if success { None } else { Some(Error::internal("fail")) };
                    rt.block_on(cb.after(&c, &msg, None, err.as_ref()));
                }
                let model_allowed = model.observe(success);
                proptest::prop_assert_eq!(real_allowed, model_allowed);
            }
        }
    }
}
