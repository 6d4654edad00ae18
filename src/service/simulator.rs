//! Simulated backend work.
//!
//! Handlers ask a [`WorkSimulator`] how long an operation takes and whether
//! it fails, so tests can swap random behavior for a deterministic script.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;

/// Default probability that a process call fails.
pub const DEFAULT_FAILURE_RATE: f64 = 0.05;

/// Simulated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// List all users.
    FetchUsers,
    /// Look up one user by id.
    FetchUser,
    /// Run the processing job.
    Process,
}

/// Source of latency and failures for the mock handlers.
pub trait WorkSimulator: Send + Sync {
    /// How long `op` takes.
    fn latency(&self, op: Operation) -> Duration;

    /// Whether `op` fails this time.
    fn should_fail(&self, op: Operation) -> bool;

    /// Sleep for the operation's latency without blocking other requests.
    fn simulate(&self, op: Operation) -> tokio::time::Sleep {
        tokio::time::sleep(self.latency(op))
    }
}

/// Uniformly random latency, `Process` failing with a fixed probability.
#[derive(Debug, Clone)]
pub struct RandomWorkSimulator {
    failure_rate: f64,
    latency_scale: f64,
}

impl RandomWorkSimulator {
    /// `failure_rate` is clamped to `[0, 1]`; NaN means never fail.
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() { 0.0 } else { failure_rate };
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            latency_scale: 1.0,
        }
    }

    /// Same failure behavior, no latency. Used by load-style tests.
    #[must_use]
    pub fn without_latency(mut self) -> Self {
        self.latency_scale = 0.0;
        self
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    /// Upper bound (exclusive) of the latency range for `op`.
    pub fn max_latency(&self, op: Operation) -> Duration {
        let base = match op {
            Operation::FetchUsers => Duration::from_millis(50),
            Operation::FetchUser | Operation::Process => Duration::from_millis(100),
        };
        base.mul_f64(self.latency_scale)
    }
}

impl Default for RandomWorkSimulator {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_RATE)
    }
}

impl WorkSimulator for RandomWorkSimulator {
    fn latency(&self, op: Operation) -> Duration {
        let max_ms = u64::try_from(self.max_latency(op).as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }

    fn should_fail(&self, op: Operation) -> bool {
        op == Operation::Process && rand::thread_rng().gen_bool(self.failure_rate)
    }
}

/// Deterministic simulator: fixed latency, every `fail_every`-th process
/// call fails (`0` never fails).
#[derive(Debug)]
pub struct ScriptedWorkSimulator {
    latency: Duration,
    fail_every: u64,
    process_calls: AtomicU64,
}

impl ScriptedWorkSimulator {
    pub fn new(latency: Duration, fail_every: u64) -> Self {
        Self {
            latency,
            fail_every,
            process_calls: AtomicU64::new(0),
        }
    }

    /// No latency, never fails.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// No latency, every process call fails.
    pub fn always_failing() -> Self {
        Self::new(Duration::ZERO, 1)
    }

    /// Number of process calls seen so far.
    pub fn process_calls(&self) -> u64 {
        self.process_calls.load(Ordering::SeqCst)
    }
}

impl WorkSimulator for ScriptedWorkSimulator {
    fn latency(&self, _op: Operation) -> Duration {
        self.latency
    }

    fn should_fail(&self, op: Operation) -> bool {
        if op != Operation::Process {
            return false;
        }
        let call = self.process_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.fail_every != 0 && call % self.fail_every == 0
    }
}
