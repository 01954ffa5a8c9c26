//! Matrix execution: every backend against every dataset level and query.
//!
//! Each cell gets its own scoped session so that cold timings really are
//! cold. A backend that cannot serve a cell produces a failed row; the
//! rest of the matrix keeps going.

use crate::adapters::{Backend, QueryKind, NAMESPACE_PREFIX};
use medbench_core::stats::{confidence_interval, iqr_filter, mean, ConfidenceInterval};
use medbench_core::{
    CancelFlag, CoreError, DatasetLevel, Fraction, IterationFailure, ProbeError, TimingProbe,
};
use serde::Serialize;

/// How a cell ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellStatus {
    Complete,
    /// Timings exist but too few warm samples survived for an interval.
    Insufficient,
    Failed { reason: String },
}

/// One row of the result matrix.
#[derive(Debug, Clone, Serialize)]
pub struct CellResult {
    pub backend: String,
    pub fraction: Fraction,
    pub query: QueryKind,
    #[serde(flatten)]
    pub status: CellStatus,
    /// First timed execution against a fresh session.
    pub cold_ms: Option<f64>,
    /// Warm samples that survived outlier filtering.
    pub warm_ms: Vec<f64>,
    /// Warm sample count before filtering.
    pub warm_raw: usize,
    pub warm_mean_ms: Option<f64>,
    pub interval: Option<ConfidenceInterval>,
    pub failed_iterations: usize,
}

/// Per-cell settings shared across the whole matrix.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub probe: TimingProbe,
    pub confidence: f64,
    /// Benchmark backends on parallel threads. Cells within one backend
    /// always run sequentially; timings share the machine either way.
    pub parallel: bool,
}

/// Run the full matrix and return one row per cell.
///
/// Rows come back in deterministic order (backend registration order,
/// then ladder order, then catalog order) regardless of `parallel`.
/// Cancellation stops the run between cells; rows for cells that never
/// ran are simply absent.
pub fn run_matrix(
    backends: Vec<Box<dyn Backend>>,
    levels: &[DatasetLevel],
    queries: &[QueryKind],
    plan: &RunPlan,
    cancel: &CancelFlag,
) -> Vec<CellResult> {
    let order: Vec<String> = backends.iter().map(|b| b.kind().to_string()).collect();
    let mut rows = if plan.parallel && backends.len() > 1 {
        run_parallel(backends, levels, queries, plan, cancel)
    } else {
        let mut rows = Vec::new();
        for mut backend in backends {
            rows.extend(bench_backend(backend.as_mut(), levels, queries, plan, cancel));
        }
        rows
    };
    sort_rows(&mut rows, &order, levels, queries);
    rows
}

/// One thread per backend, results funnelled through a channel. Each
/// backend keeps exclusive ownership of its sessions on its own thread.
fn run_parallel(
    backends: Vec<Box<dyn Backend>>,
    levels: &[DatasetLevel],
    queries: &[QueryKind],
    plan: &RunPlan,
    cancel: &CancelFlag,
) -> Vec<CellResult> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::scope(|scope| {
        for mut backend in backends {
            let tx = tx.clone();
            scope.spawn(move || {
                for row in bench_backend(backend.as_mut(), levels, queries, plan, cancel) {
                    let _ = tx.send(row);
                }
            });
        }
        drop(tx);
    });
    rx.into_iter().collect()
}

fn sort_rows(
    rows: &mut [CellResult],
    backends: &[String],
    levels: &[DatasetLevel],
    queries: &[QueryKind],
) {
    rows.sort_by_key(|row| {
        let b = backends.iter().position(|k| *k == row.backend);
        let f = levels.iter().position(|l| l.fraction == row.fraction);
        let q = queries.iter().position(|q| *q == row.query);
        (b, f, q)
    });
}

fn bench_backend(
    backend: &mut dyn Backend,
    levels: &[DatasetLevel],
    queries: &[QueryKind],
    plan: &RunPlan,
    cancel: &CancelFlag,
) -> Vec<CellResult> {
    let kind = backend.kind();

    // Load every level before timing anything, so ingestion cost never
    // bleeds into a later cell. A failed load is not fatal here; the
    // level's cells fail at session open and the run moves on.
    for level in levels {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let namespace = level.namespace(NAMESPACE_PREFIX);
        tracing::info!("{}: loading {}", kind, namespace);
        if let Err(e) = backend.load(level) {
            tracing::warn!("{}: load {} failed: {}", kind, namespace, e);
        }
    }

    let mut rows = Vec::with_capacity(levels.len() * queries.len());
    'levels: for level in levels {
        for &query in queries {
            if cancel.is_cancelled() {
                break 'levels;
            }
            tracing::info!("{}: {} on {}", kind, query, level.namespace(NAMESPACE_PREFIX));
            match run_cell(backend, level, query, plan, cancel) {
                Some(row) => rows.push(row),
                None => break 'levels,
            }
        }
    }
    rows
}

/// Time one cell. `None` means the run was cancelled mid-cell and the
/// partial timings were discarded.
fn run_cell(
    backend: &mut dyn Backend,
    level: &DatasetLevel,
    query: QueryKind,
    plan: &RunPlan,
    cancel: &CancelFlag,
) -> Option<CellResult> {
    let kind = backend.kind();
    let namespace = level.namespace(NAMESPACE_PREFIX);

    let mut session = match backend.open_session(&namespace) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("{}: session on {} failed: {}", kind, namespace, e);
            return Some(failed_cell(kind, level.fraction, query, format!("{}", e)));
        }
    };

    let sample = match plan.probe.measure(cancel, || session.execute(query)) {
        Ok(sample) => sample,
        Err(ProbeError::Cancelled) => return None,
        Err(ProbeError::FailureBudget { failures, attempts }) => {
            let reason = format!("{} of {} iterations failed", failures, attempts);
            tracing::warn!("{}: {} on {} voided: {}", kind, query, namespace, reason);
            let mut row = failed_cell(kind, level.fraction, query, reason);
            row.failed_iterations = failures;
            return Some(row);
        }
    };

    let warm_raw = sample.warm.len();
    let warm = iqr_filter(&sample.warm);
    let (status, warm_mean_ms, interval) = if sample.cold.is_none() && warm.is_empty() {
        let reason = describe_failures(&sample.failures);
        (CellStatus::Failed { reason }, None, None)
    } else {
        match confidence_interval(&warm, plan.confidence) {
            Ok(ci) => (CellStatus::Complete, Some(ci.mean), Some(ci)),
            Err(CoreError::InsufficientSamples(_)) => {
                let mean_ms = (!warm.is_empty()).then(|| mean(&warm));
                (CellStatus::Insufficient, mean_ms, None)
            }
            Err(e) => (CellStatus::Failed { reason: format!("{}", e) }, None, None),
        }
    };

    Some(CellResult {
        backend: kind.to_string(),
        fraction: level.fraction,
        query,
        status,
        cold_ms: sample.cold,
        warm_ms: warm,
        warm_raw,
        warm_mean_ms,
        interval,
        failed_iterations: sample.failures.len(),
    })
}

fn failed_cell(backend: &str, fraction: Fraction, query: QueryKind, reason: String) -> CellResult {
    CellResult {
        backend: backend.to_string(),
        fraction,
        query,
        status: CellStatus::Failed { reason },
        cold_ms: None,
        warm_ms: Vec::new(),
        warm_raw: 0,
        warm_mean_ms: None,
        interval: None,
        failed_iterations: 0,
    }
}

fn describe_failures(failures: &[IterationFailure]) -> String {
    match failures.last() {
        Some(last) => format!("{} iterations failed, last: {}", failures.len(), last),
        None => "no timed iterations succeeded".to_string(),
    }
}
