//! Perception pass metrics
//!
//! Lock-free counters updated by the perception algorithms, plus a rolling
//! window of pass times for percentiles. Exported as Prometheus text or as a
//! serializable snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// Number of pass times kept for percentiles
const PASS_HISTORY_LEN: usize = 1000;

/// Minimum samples before percentiles are computed
const PERCENTILE_MIN_SAMPLES: usize = 10;

/// Metrics registry shared by the perception algorithms
#[derive(Debug)]
pub struct PerceptionMetrics {
    // Passes
    pub passes: AtomicU64,
    pub timeouts: AtomicU64,
    pub pool_builds: AtomicU64,

    // Bodies
    pub bodies_perceived: AtomicU64,
    pub bodies_skipped: AtomicU64,
    pub bodies_incomplete: AtomicU64,

    // Tasks
    pub tasks_submitted: AtomicU64,
    pub tasks_failed: AtomicU64,

    // Percepts
    pub static_percepts: AtomicU64,
    pub dynamic_percepts: AtomicU64,
    pub ground_percepts: AtomicU64,

    // Pass timing (microseconds)
    pub pass_time_us: AtomicU64,
    pub pass_time_p95_us: AtomicU64,
    pub pass_time_p99_us: AtomicU64,
    pub pass_time_max_us: AtomicU64,

    start_time: Instant,

    // Rolling pass times for percentile calculation
    pass_history: RwLock<VecDeque<u64>>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub passes: u64,
    pub timeouts: u64,
    pub pool_builds: u64,
    pub bodies_perceived: u64,
    pub bodies_skipped: u64,
    pub bodies_incomplete: u64,
    pub tasks_submitted: u64,
    pub tasks_failed: u64,
    pub static_percepts: u64,
    pub dynamic_percepts: u64,
    pub ground_percepts: u64,
    pub pass_time_us: u64,
    pub pass_time_p95_us: u64,
    pub pass_time_p99_us: u64,
    pub pass_time_max_us: u64,
    pub uptime_seconds: u64,
}

impl PerceptionMetrics {
    pub fn new() -> Self {
        Self {
            passes: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            pool_builds: AtomicU64::new(0),
            bodies_perceived: AtomicU64::new(0),
            bodies_skipped: AtomicU64::new(0),
            bodies_incomplete: AtomicU64::new(0),
            tasks_submitted: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            static_percepts: AtomicU64::new(0),
            dynamic_percepts: AtomicU64::new(0),
            ground_percepts: AtomicU64::new(0),
            pass_time_us: AtomicU64::new(0),
            pass_time_p95_us: AtomicU64::new(0),
            pass_time_p99_us: AtomicU64::new(0),
            pass_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            pass_history: RwLock::new(VecDeque::with_capacity(PASS_HISTORY_LEN)),
        }
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, amount: usize) {
        counter.fetch_add(amount as u64, Ordering::Relaxed);
    }

    /// Record a pass time and update percentiles
    pub fn record_pass(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.pass_time_us.store(us, Ordering::Relaxed);
        self.passes.fetch_add(1, Ordering::Relaxed);

        let mut history = self.pass_history.write();
        history.push_back(us);
        while history.len() > PASS_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= PERCENTILE_MIN_SAMPLES {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let last = sorted.len() - 1;
            let p95_idx = ((sorted.len() as f32 * 0.95) as usize).min(last);
            let p99_idx = ((sorted.len() as f32 * 0.99) as usize).min(last);

            self.pass_time_p95_us.store(sorted[p95_idx], Ordering::Relaxed);
            self.pass_time_p99_us.store(sorted[p99_idx], Ordering::Relaxed);
            self.pass_time_max_us.store(sorted[last], Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            passes: load(&self.passes),
            timeouts: load(&self.timeouts),
            pool_builds: load(&self.pool_builds),
            bodies_perceived: load(&self.bodies_perceived),
            bodies_skipped: load(&self.bodies_skipped),
            bodies_incomplete: load(&self.bodies_incomplete),
            tasks_submitted: load(&self.tasks_submitted),
            tasks_failed: load(&self.tasks_failed),
            static_percepts: load(&self.static_percepts),
            dynamic_percepts: load(&self.dynamic_percepts),
            ground_percepts: load(&self.ground_percepts),
            pass_time_us: load(&self.pass_time_us),
            pass_time_p95_us: load(&self.pass_time_p95_us),
            pass_time_p99_us: load(&self.pass_time_p99_us),
            pass_time_max_us: load(&self.pass_time_max_us),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        let s = self.snapshot();

        metric!("perception_passes_total", "Perception passes run", "counter", s.passes);
        metric!("perception_timeouts_total", "Passes that hit the task timeout", "counter", s.timeouts);
        metric!("perception_pool_builds_total", "Worker pools created", "counter", s.pool_builds);

        metric!("perception_bodies_perceived_total", "Bodies given a perception list", "counter",
            s.bodies_perceived);
        metric!("perception_bodies_skipped_total", "Bodies skipped for an unsupported dimension", "counter",
            s.bodies_skipped);
        metric!("perception_bodies_incomplete_total", "Perception lists left incomplete", "counter",
            s.bodies_incomplete);

        metric!("perception_tasks_submitted_total", "Perception tasks submitted", "counter",
            s.tasks_submitted);
        metric!("perception_tasks_failed_total", "Perception tasks that panicked", "counter",
            s.tasks_failed);

        metric!("perception_static_percepts_total", "Static percepts produced", "counter",
            s.static_percepts);
        metric!("perception_dynamic_percepts_total", "Dynamic percepts produced", "counter",
            s.dynamic_percepts);
        metric!("perception_ground_percepts_total", "Ground percepts produced", "counter",
            s.ground_percepts);

        metric!("perception_pass_time_microseconds", "Last pass time in microseconds", "gauge",
            s.pass_time_us);
        metric!("perception_pass_time_p95_microseconds", "95th percentile pass time", "gauge",
            s.pass_time_p95_us);
        metric!("perception_pass_time_p99_microseconds", "99th percentile pass time", "gauge",
            s.pass_time_p99_us);
        metric!("perception_pass_time_max_microseconds", "Maximum pass time", "gauge",
            s.pass_time_max_us);
        metric!("perception_uptime_seconds", "Engine uptime in seconds", "counter", s.uptime_seconds);

        output
    }
}

impl Default for PerceptionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
