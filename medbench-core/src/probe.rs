//! Wall-clock timing of repeated operations.
//!
//! The probe runs `warmup` untimed executions, then `iterations + 1` timed
//! ones on the monotonic clock. The first timed execution is the cold
//! sample; the rest are warm. Iterations that error or outrun the per-op
//! budget lose their timing but the probe keeps going until the failure
//! budget is spent.

use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation shared between the driver and its workers.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a single iteration produced no timing.
#[derive(Debug, Clone)]
pub enum IterationFailure {
    /// The operation returned an error.
    Error(String),
    /// The operation finished but outran the per-op budget.
    Timeout(Duration),
}

impl std::fmt::Display for IterationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationFailure::Error(msg) => write!(f, "{}", msg),
            IterationFailure::Timeout(d) => write!(f, "timeout after {:.1?}", d),
        }
    }
}

/// Probe-level outcomes that void the whole cell.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("failure budget exceeded: {failures} of {attempts} iterations failed")]
    FailureBudget { failures: usize, attempts: usize },

    #[error("cancelled")]
    Cancelled,
}

/// Timings gathered for one cell.
#[derive(Debug, Clone, Default)]
pub struct TimingSample {
    /// First timed execution, when it succeeded. Never back-filled from a
    /// later iteration, which would no longer be cache-cold.
    pub cold: Option<f64>,
    /// Subsequent timed executions, fractional milliseconds.
    pub warm: Vec<f64>,
    pub failures: Vec<IterationFailure>,
}

/// Timing configuration for one benchmark cell.
#[derive(Debug, Clone)]
pub struct TimingProbe {
    /// Warm iterations measured after the cold one.
    pub iterations: usize,
    /// Untimed executions before measurement starts.
    pub warmup: usize,
    /// Pause between executions, outside the timed window.
    pub delay: Duration,
    /// Elapsed time beyond which an execution counts as failed.
    pub op_timeout: Duration,
    /// Fraction of timed executions that may fail before the cell is voided.
    pub max_failure_rate: f64,
}

impl Default for TimingProbe {
    fn default() -> Self {
        Self {
            iterations: 30,
            warmup: 0,
            delay: Duration::from_millis(2),
            op_timeout: Duration::from_secs(10),
            max_failure_rate: 0.5,
        }
    }
}

impl TimingProbe {
    pub fn validate(&self) -> CoreResult<()> {
        if self.iterations == 0 {
            return Err(CoreError::Config("iterations must be at least 1".into()));
        }
        if !(1..=10).contains(&self.delay.as_millis()) {
            return Err(CoreError::Config(
                "inter-iteration delay must be between 1 and 10 ms".into(),
            ));
        }
        if self.op_timeout.is_zero() {
            return Err(CoreError::Config("per-op timeout must be non-zero".into()));
        }
        if !(self.max_failure_rate > 0.0 && self.max_failure_rate <= 1.0) {
            return Err(CoreError::Config(
                "max failure rate must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Run `op` under this probe. The result value of `op` is discarded;
    /// only its latency and success are observed.
    ///
    /// Cancellation is checked between executions and aborts the cell; a
    /// cancelled cell's partial timings are not returned.
    pub fn measure<T, E: std::fmt::Display>(
        &self,
        cancel: &CancelFlag,
        mut op: impl FnMut() -> Result<T, E>,
    ) -> Result<TimingSample, ProbeError> {
        for _ in 0..self.warmup {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled);
            }
            if let Err(e) = op() {
                tracing::debug!(error = %e, "warmup execution failed");
            }
            std::thread::sleep(self.delay);
        }

        let attempts = self.iterations + 1;
        let budget = (self.max_failure_rate * attempts as f64).floor() as usize;
        let mut sample = TimingSample {
            warm: Vec::with_capacity(self.iterations),
            ..TimingSample::default()
        };

        for i in 0..attempts {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled);
            }
            if i > 0 {
                std::thread::sleep(self.delay);
            }
            let start = Instant::now();
            let outcome = op();
            let elapsed = start.elapsed();
            match outcome {
                Err(e) => sample.failures.push(IterationFailure::Error(e.to_string())),
                Ok(_) if elapsed > self.op_timeout => {
                    sample.failures.push(IterationFailure::Timeout(elapsed));
                }
                Ok(_) if i == 0 => sample.cold = Some(elapsed.as_secs_f64() * 1e3),
                Ok(_) => sample.warm.push(elapsed.as_secs_f64() * 1e3),
            }
            if sample.failures.len() > budget {
                return Err(ProbeError::FailureBudget {
                    failures: sample.failures.len(),
                    attempts,
                });
            }
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_probe(iterations: usize) -> TimingProbe {
        TimingProbe {
            iterations,
            warmup: 0,
            delay: Duration::from_millis(1),
            ..TimingProbe::default()
        }
    }

    #[test]
    fn cold_then_warm_counts() {
        let probe = quick_probe(5);
        let sample = probe
            .measure(&CancelFlag::new(), || Ok::<_, String>(()))
            .unwrap();
        assert!(sample.cold.is_some());
        assert_eq!(sample.warm.len(), 5);
        assert!(sample.failures.is_empty());
        assert!(sample.warm.iter().all(|&ms| ms >= 0.0));
    }

    #[test]
    fn warmup_runs_are_discarded() {
        let probe = TimingProbe {
            warmup: 3,
            ..quick_probe(2)
        };
        let mut calls = 0;
        let sample = probe
            .measure(&CancelFlag::new(), || {
                calls += 1;
                Ok::<_, String>(())
            })
            .unwrap();
        assert_eq!(calls, 3 + 2 + 1);
        assert_eq!(sample.warm.len(), 2);
    }

    #[test]
    fn failed_cold_slot_stays_empty() {
        let probe = quick_probe(4);
        let mut calls = 0;
        let sample = probe
            .measure(&CancelFlag::new(), || {
                calls += 1;
                if calls == 1 {
                    Err("connection reset".to_string())
                } else {
                    Ok(())
                }
            })
            .unwrap();
        assert!(sample.cold.is_none());
        assert_eq!(sample.warm.len(), 4);
        assert_eq!(sample.failures.len(), 1);
    }

    #[test]
    fn failure_budget_aborts_early() {
        let probe = quick_probe(4); // 5 attempts, budget floor(2.5) = 2
        let result = probe.measure(&CancelFlag::new(), || Err::<(), _>("down".to_string()));
        match result {
            Err(ProbeError::FailureBudget { failures, attempts }) => {
                assert_eq!(failures, 3);
                assert_eq!(attempts, 5);
            }
            other => panic!("expected budget abort, got {:?}", other),
        }
    }

    #[test]
    fn slow_ops_count_as_failures() {
        let probe = TimingProbe {
            op_timeout: Duration::from_millis(1),
            max_failure_rate: 1.0,
            ..quick_probe(2)
        };
        let sample = probe
            .measure(&CancelFlag::new(), || {
                std::thread::sleep(Duration::from_millis(5));
                Ok::<_, String>(())
            })
            .unwrap();
        assert!(sample.cold.is_none());
        assert!(sample.warm.is_empty());
        assert_eq!(sample.failures.len(), 3);
        assert!(matches!(sample.failures[0], IterationFailure::Timeout(_)));
    }

    #[test]
    fn cancelled_probe_returns_nothing() {
        let probe = quick_probe(3);
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            probe.measure(&cancel, || Ok::<_, String>(())),
            Err(ProbeError::Cancelled)
        ));
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(TimingProbe::default().validate().is_ok());
        assert!(TimingProbe {
            iterations: 0,
            ..TimingProbe::default()
        }
        .validate()
        .is_err());
        assert!(TimingProbe {
            delay: Duration::from_millis(50),
            ..TimingProbe::default()
        }
        .validate()
        .is_err());
        assert!(TimingProbe {
            max_failure_rate: 0.0,
            ..TimingProbe::default()
        }
        .validate()
        .is_err());
    }
}
