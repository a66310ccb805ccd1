use crate::installer::types::ProgressReporter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Lets at most one update through per interval.
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// `true` when the caller may emit now. The first call always passes.
    pub fn ready(&self) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return true;
        };
        let now = Instant::now();
        match *last {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Sums byte progress of every unit downloading in the phase into one sink,
/// weighted by the total declared size of the phase.
pub struct AggregateProgress {
    sink: Arc<dyn ProgressReporter>,
    total: u64,
    per_unit: Mutex<HashMap<String, u64>>,
    throttle: Throttle,
}

impl AggregateProgress {
    pub fn new(sink: Arc<dyn ProgressReporter>, total: u64, interval: Duration) -> Arc<Self> {
        sink.set_total_amount(total);
        sink.set_current(0);
        Arc::new(Self {
            sink,
            total,
            per_unit: Mutex::new(HashMap::new()),
            throttle: Throttle::new(interval),
        })
    }

    /// A sink for one unit. Its `set_current` values are that unit's cumulative bytes.
    pub fn for_unit(self: &Arc<Self>, unit_id: &str) -> Arc<dyn ProgressReporter> {
        Arc::new(UnitProgress {
            unit_id: unit_id.to_string(),
            aggregate: self.clone(),
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn transferred(&self) -> u64 {
        self.per_unit
            .lock()
            .map(|units| units.values().sum())
            .unwrap_or(0)
    }

    fn update(&self, unit_id: &str, current: u64) {
        let sum = match self.per_unit.lock() {
            Ok(mut units) => {
                units.insert(unit_id.to_string(), current);
                units.values().sum()
            }
            Err(_) => return,
        };
        if self.throttle.ready() {
            self.sink.set_current(sum);
        }
    }

    /// Flush the final count and mark the phase complete.
    pub fn finish(&self) {
        self.sink.set_current(self.transferred());
        self.sink.set_complete();
    }
}

struct UnitProgress {
    unit_id: String,
    aggregate: Arc<AggregateProgress>,
}

impl ProgressReporter for UnitProgress {
    fn set_status(&self, text: &str) {
        self.aggregate.sink.set_status(text);
    }

    fn set_current(&self, current: u64) {
        self.aggregate.update(&self.unit_id, current);
    }

    // The phase total is fixed by the declared sizes
    fn set_total_amount(&self, _total: u64) {}

    fn set_complete(&self) {}

    fn set_failed(&self, message: &str) {
        self.aggregate
            .sink
            .set_failed(&format!("{}: {}", self.unit_id, message));
    }
}
