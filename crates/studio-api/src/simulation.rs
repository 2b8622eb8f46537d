use std::ops::Range;
use std::time::Duration;

use anyhow::{Result, bail};
use rand::Rng;

/// Stand-in for a downstream inference service: fails with a fixed
/// probability and otherwise takes a random amount of time.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Probability in [0, 1] that a validated request is rejected as overloaded.
    pub failure_rate: f64,
    /// Artificial processing latency, drawn uniformly from `[start, end)`.
    pub latency: Range<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.2,
            latency: Duration::from_millis(1000)..Duration::from_millis(2000),
        }
    }
}

impl SimulationConfig {
    pub fn new(failure_rate: f64, latency: Range<Duration>) -> Result<Self> {
        if !(0.0..=1.0).contains(&failure_rate) {
            bail!("failure rate must be within [0, 1], got {}", failure_rate);
        }
        if latency.start > latency.end {
            bail!(
                "latency window is inverted: {:?}..{:?}",
                latency.start,
                latency.end
            );
        }
        Ok(Self { failure_rate, latency })
    }

    /// Never fails, never waits.
    pub fn disabled() -> Self {
        Self {
            failure_rate: 0.0,
            latency: Duration::ZERO..Duration::ZERO,
        }
    }

    /// Every request is rejected as overloaded.
    pub fn always_overloaded() -> Self {
        Self {
            failure_rate: 1.0,
            ..Self::disabled()
        }
    }

    pub fn roll_overload(&self) -> bool {
        self.roll_overload_with(&mut rand::rng())
    }

    pub fn sample_latency(&self) -> Duration {
        self.sample_latency_with(&mut rand::rng())
    }

    fn roll_overload_with<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random_bool(self.failure_rate.clamp(0.0, 1.0))
    }

    fn sample_latency_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.latency.is_empty() {
            return self.latency.start;
        }
        rng.random_range(self.latency.clone())
    }
}
