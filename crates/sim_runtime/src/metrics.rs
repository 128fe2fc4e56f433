//! Container metrics and statistics surfaces.

use std::time::Duration;

use serde::Serialize;

/// Per-system timing from the last completed tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub module_name: String,
    pub system_name: String,
    pub execution_time_ms: f64,
    pub execution_time_nanos: i64,
}

/// Per-command timing from the last completed tick, aggregated by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMetrics {
    pub name: String,
    pub module_name: String,
    pub count: u64,
    pub execution_time_ms: f64,
    pub execution_time_nanos: i64,
}

/// One benchmark scope measurement from the last completed tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub module_name: String,
    pub scope_name: String,
    /// Always `"<module>:<scope>"`.
    pub full_name: String,
    pub execution_time_ms: f64,
    pub execution_time_nanos: i64,
}

impl BenchmarkReport {
    /// Build a report from one scope sample.
    #[must_use]
    pub fn new(module_name: &str, scope_name: &str, elapsed: Duration) -> Self {
        Self {
            module_name: module_name.to_string(),
            scope_name: scope_name.to_string(),
            full_name: format!("{module_name}:{scope_name}"),
            execution_time_ms: elapsed.as_secs_f64() * 1_000.0,
            execution_time_nanos: elapsed.as_nanos() as i64,
        }
    }
}

/// Tick duration aggregates since container start.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickTimings {
    pub total_ticks: u64,
    pub last_nanos: i64,
    pub min_nanos: i64,
    pub max_nanos: i64,
    total_nanos: i64,
}

impl TickTimings {
    /// Fold in one tick's duration.
    pub fn record(&mut self, elapsed: Duration) {
        let nanos = elapsed.as_nanos() as i64;
        self.last_nanos = nanos;
        self.total_nanos += nanos;
        if self.total_ticks == 0 {
            self.min_nanos = nanos;
            self.max_nanos = nanos;
        } else {
            self.min_nanos = self.min_nanos.min(nanos);
            self.max_nanos = self.max_nanos.max(nanos);
        }
        self.total_ticks += 1;
    }

    /// Mean tick duration in nanoseconds; zero before the first tick.
    #[must_use]
    pub fn avg_nanos(&self) -> i64 {
        if self.total_ticks == 0 {
            0
        } else {
            self.total_nanos / self.total_ticks as i64
        }
    }
}

/// Mutable metrics state shared between the game loop and readers.
#[derive(Debug, Default)]
pub struct MetricsState {
    pub timings: TickTimings,
    pub last_tick_systems: Vec<SystemMetrics>,
    pub last_tick_commands: Vec<CommandMetrics>,
    pub last_tick_benchmarks: Vec<BenchmarkReport>,
}

/// The per-container metrics surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetrics {
    pub container_id: i64,
    pub current_tick: i64,
    pub last_tick_ms: f64,
    pub avg_tick_ms: f64,
    pub min_tick_ms: f64,
    pub max_tick_ms: f64,
    pub total_ticks: u64,
    pub last_tick_nanos: i64,
    pub avg_tick_nanos: i64,
    pub min_tick_nanos: i64,
    pub max_tick_nanos: i64,
    pub total_entities: usize,
    pub total_component_types: usize,
    pub command_queue_size: usize,
    pub last_tick_systems: Vec<SystemMetrics>,
    pub last_tick_commands: Vec<CommandMetrics>,
    pub last_tick_benchmarks: Vec<BenchmarkReport>,
}

/// The container statistics surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub entity_count: usize,
    pub max_entities: usize,
    pub ecs_used_bytes: u64,
    pub ecs_max_bytes: u64,
    pub process_max_memory: u64,
    pub process_used_memory: u64,
    pub match_count: usize,
    pub module_count: usize,
}

/// Best-effort process memory readings: `(peak, current)` in bytes.
///
/// Parsed from `/proc/self/status` on Linux; zero elsewhere.
#[must_use]
pub fn process_memory() -> (u64, u64) {
    #[cfg(target_os = "linux")]
    {
        fn field_kb(status: &str, key: &str) -> u64 {
            status
                .lines()
                .find(|line| line.starts_with(key))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        }
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            return (
                field_kb(&status, "VmPeak:") * 1024,
                field_kb(&status, "VmRSS:") * 1024,
            );
        }
    }
    (0, 0)
}

#[must_use]
pub(crate) fn nanos_to_ms(nanos: i64) -> f64 {
    nanos as f64 / 1_000_000.0
}
