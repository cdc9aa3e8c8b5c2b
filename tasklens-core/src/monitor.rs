use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OpStats {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
    pub last: Duration,
}

impl OpStats {
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Regression {
    pub operation: String,
    pub mean: Duration,
    pub budget: Duration,
}

/// Timing and tracked-size instrumentation. Operations are keyed by name
/// ("filter.evaluate", "viewport.render", ...).
#[derive(Default)]
pub struct PerformanceMonitor {
    ops: Mutex<HashMap<String, OpStats>>,
    budgets: Mutex<HashMap<String, Duration>>,
    gauges: Mutex<HashMap<String, usize>>,
    // operations whose mean is currently over budget
    flagged: Mutex<HashSet<String>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single overruns log at debug; a mean crossing its budget logs one warning.
    pub fn record(&self, operation: &str, elapsed: Duration) {
        let mean = {
            let mut ops = self.ops.lock();
            let s = ops.entry(operation.to_string()).or_default();
            s.count += 1;
            s.total = s.total.saturating_add(elapsed);
            s.max = s.max.max(elapsed);
            s.last = elapsed;
            s.mean()
        };
        let Some(budget) = self.budgets.lock().get(operation).copied() else { return };
        if elapsed > budget {
            tracing::debug!(operation, ?elapsed, ?budget, "operation over budget");
        }
        let mut flagged = self.flagged.lock();
        if mean > budget {
            if flagged.insert(operation.to_string()) {
                tracing::warn!(operation, ?mean, ?budget, "mean time regressed past budget");
            }
        } else {
            flagged.remove(operation);
        }
    }

    pub fn time<T>(&self, operation: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(operation, start.elapsed());
        out
    }

    /// Records on drop.
    pub fn start<'a>(&'a self, operation: &'a str) -> TimingGuard<'a> {
        TimingGuard { monitor: self, operation, start: Instant::now() }
    }

    pub fn set_budget(&self, operation: &str, budget: Duration) {
        self.budgets.lock().insert(operation.to_string(), budget);
    }

    pub fn stats(&self, operation: &str) -> Option<OpStats> {
        self.ops.lock().get(operation).copied()
    }

    pub fn snapshot(&self) -> Vec<(String, OpStats)> {
        let mut out: Vec<(String, OpStats)> = self.ops.lock().iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Operations whose mean time exceeds their configured budget.
    pub fn regressions(&self) -> Vec<Regression> {
        let ops = self.ops.lock();
        let budgets = self.budgets.lock();
        let mut out: Vec<Regression> = budgets
            .iter()
            .filter_map(|(name, budget)| {
                let s = ops.get(name)?;
                (s.mean() > *budget).then(|| Regression { operation: name.clone(), mean: s.mean(), budget: *budget })
            })
            .collect();
        out.sort_by(|a, b| a.operation.cmp(&b.operation));
        out
    }

    pub fn set_gauge(&self, name: &str, bytes: usize) {
        self.gauges.lock().insert(name.to_string(), bytes);
    }

    pub fn gauge(&self, name: &str) -> Option<usize> {
        self.gauges.lock().get(name).copied()
    }

    pub fn tracked_bytes(&self) -> usize {
        self.gauges.lock().values().sum()
    }

    pub fn reset(&self) {
        self.ops.lock().clear();
        self.flagged.lock().clear();
    }
}

pub struct TimingGuard<'a> {
    monitor: &'a PerformanceMonitor,
    operation: &'a str,
    start: Instant,
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.monitor.record(self.operation, self.start.elapsed());
    }
}
