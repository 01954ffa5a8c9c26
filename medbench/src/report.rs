//! Result rendering: comparison tables on the terminal, CSV and JSON export.
//!
//! The two CSV schemas are consumed by downstream tooling and must not
//! drift: `first_execution.csv` holds one cold timing per cell and
//! `steady_state.csv` holds the warm aggregate per cell.

use crate::runner::{CellResult, CellStatus};
use crate::BenchResult;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Machine context captured once per run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub os: String,
    pub arch: String,
    pub cpus: usize,
    pub hostname: Option<String>,
    pub timestamp: String,
    pub version: String,
}

impl RunMetadata {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpus: std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1),
            hostname: hostname(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn hostname() -> Option<String> {
    let out = std::process::Command::new("hostname").output().ok()?;
    let name = String::from_utf8(out.stdout).ok()?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Everything a run produced, in deterministic row order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    /// Warm iterations configured per cell.
    pub iterations: usize,
    pub confidence: f64,
    pub rows: Vec<CellResult>,
}

/// `backend/fraction` label shared by both CSV schemas, e.g. `sqlite/75%`.
fn dataset_label(row: &CellResult) -> String {
    format!("{}/{}", row.backend, row.fraction.label())
}

// ────────────────────────────────────────────────────────────────────────────────
// CSV export
// ────────────────────────────────────────────────────────────────────────────────

/// Cold timings, one row per cell.
pub fn write_cold_csv(report: &RunReport, path: &Path) -> BenchResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["Dataset", "Query", "Milliseconds"])?;
    for row in &report.rows {
        wtr.write_record([dataset_label(row), row.query.name().to_string(), cold_field(row)])?;
    }
    wtr.flush()?;
    println!("  Cold timings exported to {}", path.display());
    Ok(())
}

/// Warm aggregates, one row per cell.
pub fn write_warm_csv(report: &RunReport, path: &Path) -> BenchResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let average_header = format!("Average({} runs) ms", report.iterations);
    wtr.write_record([
        "Dataset",
        "Query",
        average_header.as_str(),
        "Average ms (high precision)",
        "Confidence Interval (Min, Max)",
    ])?;
    for row in &report.rows {
        let (average, precise, interval) = warm_fields(row);
        wtr.write_record([
            dataset_label(row),
            row.query.name().to_string(),
            average,
            precise,
            interval,
        ])?;
    }
    wtr.flush()?;
    println!("  Warm timings exported to {}", path.display());
    Ok(())
}

fn cold_field(row: &CellResult) -> String {
    if matches!(row.status, CellStatus::Failed { .. }) {
        return "failed".to_string();
    }
    match row.cold_ms {
        Some(ms) => format!("{:.2}", ms),
        None => "NaN".to_string(),
    }
}

fn warm_fields(row: &CellResult) -> (String, String, String) {
    if matches!(row.status, CellStatus::Failed { .. }) {
        return ("failed".into(), "failed".into(), "failed".into());
    }
    match (row.warm_mean_ms, row.interval) {
        (Some(mean), Some(ci)) => (
            format!("{:.2}", mean),
            format!("{}", mean),
            format!("({:.2}, {:.2})", ci.lower, ci.upper),
        ),
        (Some(mean), None) => (format!("{:.2}", mean), format!("{}", mean), "NaN".into()),
        (None, _) => ("NaN".into(), "NaN".into(), "NaN".into()),
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// JSON export
// ────────────────────────────────────────────────────────────────────────────────

pub fn export_json(report: &RunReport, path: &Path) -> BenchResult<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(path, json)?;
    println!("  JSON exported to {}", path.display());
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────────
// Terminal output
// ────────────────────────────────────────────────────────────────────────────────

/// Print one comparison table per query, best warm mean starred.
pub fn print_summary(report: &RunReport) {
    println!(
        "\n{}",
        "╔══════════════════════════════════════════════════════════════╗"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "║                MedBench Query Latency Report                 ║"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝"
            .bold()
            .blue()
    );
    println!(
        "  OS: {}  Arch: {}  CPUs: {}  Host: {}  Time: {}",
        report.metadata.os,
        report.metadata.arch,
        report.metadata.cpus,
        report.metadata.hostname.as_deref().unwrap_or("-"),
        report.metadata.timestamp
    );
    println!(
        "  Iterations: {} warm + 1 cold per cell  Confidence: {:.0}%",
        report.iterations,
        report.confidence * 100.0
    );

    // Group rows by query, keeping first-appearance order.
    let mut by_query: HashMap<&str, Vec<&CellResult>> = HashMap::new();
    let mut query_order: Vec<&str> = Vec::new();
    for row in &report.rows {
        let name = row.query.name();
        if !by_query.contains_key(name) {
            query_order.push(name);
        }
        by_query.entry(name).or_default().push(row);
    }

    for name in &query_order {
        if let Some(rows) = by_query.get(name) {
            print_query_comparison(name, rows, report.confidence);
        }
    }
}

/// Comparison table for one query across all backends and fractions.
pub fn print_query_comparison(query: &str, rows: &[&CellResult], confidence: f64) {
    if rows.is_empty() {
        return;
    }

    println!("\n{}", format!("━━━ {} ━━━", query).bold().cyan());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);

    table.set_header(vec![
        "Backend".to_string(),
        "Dataset".to_string(),
        "Cold (ms)".to_string(),
        "Warm mean (ms)".to_string(),
        format!("{:.0}% interval (ms)", confidence * 100.0),
        "Status".to_string(),
    ]);

    // Lowest warm mean wins.
    let best_mean = rows
        .iter()
        .filter_map(|r| r.warm_mean_ms)
        .fold(f64::INFINITY, f64::min);

    for r in rows {
        let is_best = best_mean.is_finite()
            && r.warm_mean_ms
                .map(|m| (m - best_mean).abs() < 1e-9)
                .unwrap_or(false);
        let name = if is_best {
            format!("★ {}", r.backend)
        } else {
            r.backend.clone()
        };
        let name_cell = if is_best {
            Cell::new(name).fg(Color::Green)
        } else {
            Cell::new(name)
        };

        let mean_str = r
            .warm_mean_ms
            .map(|m| format!("{:.2}", m))
            .unwrap_or_else(|| "-".to_string());
        let mean_cell = if is_best {
            Cell::new(mean_str).fg(Color::Green)
        } else {
            Cell::new(mean_str)
        };

        let cold_str = r
            .cold_ms
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "-".to_string());
        let interval_str = r
            .interval
            .map(|ci| format!("({:.2}, {:.2})", ci.lower, ci.upper))
            .unwrap_or_else(|| "-".to_string());
        let status_cell = match &r.status {
            CellStatus::Complete => Cell::new("ok"),
            CellStatus::Insufficient => Cell::new("insufficient").fg(Color::Yellow),
            CellStatus::Failed { .. } => Cell::new("failed").fg(Color::Red),
        };

        table.add_row(vec![
            name_cell,
            Cell::new(r.fraction.label()),
            Cell::new(cold_str),
            mean_cell,
            Cell::new(interval_str),
            status_cell,
        ]);
    }

    println!("{table}");

    for r in rows {
        if let CellStatus::Failed { reason } = &r.status {
            println!("  {} {}", dataset_label(r).dimmed(), reason.dimmed());
        }
    }
}
