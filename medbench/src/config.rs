//! Run configuration: a TOML file layer with command-line overrides.

use crate::adapters::QueryKind;
use crate::{BenchError, BenchResult};
use medbench_core::fraction::ladder_from_ratios;
use medbench_core::{Fraction, TimingProbe};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_FRACTIONS: [f64; 4] = [1.0, 0.75, 0.5, 0.25];
pub const DEFAULT_BACKENDS: [&str; 2] = ["sqlite", "memory"];

/// Serialized run settings. Every field is optional so a file can set
/// just the knobs it cares about; explicit command-line flags win over
/// file values, and unset fields fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfigFile {
    pub backends: Option<Vec<String>>,
    pub fractions: Option<Vec<f64>>,
    pub queries: Option<Vec<String>>,
    pub iterations: Option<usize>,
    pub warmup: Option<usize>,
    pub confidence: Option<f64>,
    pub delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub parallel: Option<bool>,
    pub seed: Option<u64>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub backends: Vec<String>,
    pub fractions: Vec<Fraction>,
    pub queries: Vec<QueryKind>,
    pub probe: TimingProbe,
    pub confidence: f64,
    pub parallel: bool,
    pub seed: u64,
}

impl RunConfigFile {
    pub fn load(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| BenchError::Config(format!("parse {}: {}", path.display(), e)))
    }

    /// Overlay `over` (higher precedence) onto `self`, field by field.
    pub fn merged(self, over: RunConfigFile) -> RunConfigFile {
        RunConfigFile {
            backends: over.backends.or(self.backends),
            fractions: over.fractions.or(self.fractions),
            queries: over.queries.or(self.queries),
            iterations: over.iterations.or(self.iterations),
            warmup: over.warmup.or(self.warmup),
            confidence: over.confidence.or(self.confidence),
            delay_ms: over.delay_ms.or(self.delay_ms),
            timeout_ms: over.timeout_ms.or(self.timeout_ms),
            parallel: over.parallel.or(self.parallel),
            seed: over.seed.or(self.seed),
        }
    }

    /// Fill in defaults and validate everything the run depends on.
    pub fn resolve(self) -> BenchResult<RunSettings> {
        let backends = self
            .backends
            .unwrap_or_else(|| DEFAULT_BACKENDS.iter().map(|s| s.to_string()).collect());
        if backends.is_empty() {
            return Err(BenchError::Config("at least one backend required".into()));
        }

        let ratios = self.fractions.unwrap_or_else(|| DEFAULT_FRACTIONS.to_vec());
        let fractions = ladder_from_ratios(&ratios)?;

        let queries = match self.queries {
            None => QueryKind::ALL.to_vec(),
            Some(names) => names
                .iter()
                .map(|name| {
                    QueryKind::from_name(name)
                        .ok_or_else(|| BenchError::Config(format!("unknown query: {}", name)))
                })
                .collect::<BenchResult<_>>()?,
        };
        if queries.is_empty() {
            return Err(BenchError::Config("at least one query required".into()));
        }

        let probe = TimingProbe {
            iterations: self.iterations.unwrap_or(30),
            warmup: self.warmup.unwrap_or(0),
            delay: Duration::from_millis(self.delay_ms.unwrap_or(2)),
            op_timeout: Duration::from_millis(self.timeout_ms.unwrap_or(10_000)),
            ..TimingProbe::default()
        };
        probe.validate()?;

        let confidence = self.confidence.unwrap_or(0.95);
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(BenchError::Config(format!(
                "confidence {} outside (0, 1)",
                confidence
            )));
        }

        Ok(RunSettings {
            backends,
            fractions,
            queries,
            probe,
            confidence,
            parallel: self.parallel.unwrap_or(false),
            seed: self.seed.unwrap_or(42),
        })
    }
}
