//! Benchmark scopes for module code.
//!
//! A module obtains a [`ScopeTimer`] from its context; the guard records the
//! elapsed time into the module's sample sink when dropped. The game loop
//! drains every module's sink once per tick.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// One recorded scope measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkSample {
    /// Scope name within the module (no colons).
    pub scope: String,
    /// Measured wall time.
    pub elapsed: Duration,
}

/// Per-module sink of scope measurements for the current tick.
#[derive(Debug, Default)]
pub struct ModuleBenchmarks {
    samples: Mutex<Vec<BenchmarkSample>>,
}

impl ModuleBenchmarks {
    /// Start a timing scope; the measurement is recorded on drop.
    #[must_use]
    pub fn scope(&self, name: impl Into<String>) -> ScopeTimer<'_> {
        ScopeTimer {
            sink: self,
            scope: name.into(),
            start: Instant::now(),
        }
    }

    /// Record an already-measured sample.
    pub fn record(&self, scope: impl Into<String>, elapsed: Duration) {
        self.samples.lock().push(BenchmarkSample {
            scope: scope.into(),
            elapsed,
        });
    }

    /// Take and clear the accumulated samples.
    #[must_use]
    pub fn drain(&self) -> Vec<BenchmarkSample> {
        std::mem::take(&mut *self.samples.lock())
    }
}

/// Drop guard that records its scope's elapsed time.
pub struct ScopeTimer<'a> {
    sink: &'a ModuleBenchmarks,
    scope: String,
    start: Instant,
}

impl Drop for ScopeTimer<'_> {
    fn drop(&mut self) {
        self.sink
            .record(std::mem::take(&mut self.scope), self.start.elapsed());
    }
}
