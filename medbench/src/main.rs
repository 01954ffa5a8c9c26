//! MedBench: query latency benchmarks across storage backends.
//!
//! Usage:
//!   medbench generate --out data                  # synthesize the base dataset
//!   medbench sample --data data --out subsets     # persist nested subsets
//!   medbench run --data data                      # benchmark the full matrix
//!   medbench run --data data --parallel --config bench.toml

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use medbench::adapters::memory_adapter::MemoryBackend;
use medbench::adapters::sqlite_adapter::SqliteBackend;
use medbench::adapters::Backend;
use medbench::config::RunConfigFile;
use medbench::datagen::{self, GenSpec};
use medbench::report::{export_json, print_summary, write_cold_csv, write_warm_csv};
use medbench::report::{RunMetadata, RunReport};
use medbench::runner::{run_matrix, RunPlan};
use medbench::{BenchError, BenchResult};
use medbench_core::fraction::ladder_from_ratios;
use medbench_core::{CancelFlag, EntityTables, SubsetPolicy, SubsetSampler};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "medbench", about = "Cross-backend query latency benchmarks", version)]
struct Cli {
    /// Verbose tracing (same as RUST_LOG=debug).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesize the base dataset as CSV tables.
    Generate {
        /// Output directory for the CSV tables.
        #[arg(long, default_value = "data")]
        out: PathBuf,

        #[arg(long, default_value = "400")]
        patients: usize,

        #[arg(long, default_value = "15")]
        doctors: usize,

        #[arg(long, default_value = "12")]
        procedures: usize,

        #[arg(long, default_value = "1200")]
        visits: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Derive nested subsets of the base dataset and persist them as CSV.
    Sample {
        /// Directory holding the base dataset tables.
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Output directory for the subset tables.
        #[arg(long, default_value = "subsets")]
        out: PathBuf,

        /// Descending sampling fractions.
        #[arg(long, value_delimiter = ',', default_values_t = [1.0, 0.75, 0.5, 0.25])]
        fractions: Vec<f64>,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Also sample unreferenced parent rows, keeping parent-table
        /// sizes roughly proportional to the fraction.
        #[arg(long)]
        proportional_parents: bool,
    },

    /// Benchmark every backend against every subset and query.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory holding the base dataset tables.
    #[arg(long, default_value = "data")]
    data: PathBuf,

    /// Output directory for CSV and JSON results.
    #[arg(long, default_value = "results")]
    out: PathBuf,

    /// TOML settings file; explicit flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backends to benchmark (comma-separated: sqlite, memory).
    #[arg(long, value_delimiter = ',')]
    backends: Vec<String>,

    /// Descending sampling fractions.
    #[arg(long, value_delimiter = ',')]
    fractions: Vec<f64>,

    /// Queries to run (default: the whole catalog).
    #[arg(long, value_delimiter = ',')]
    queries: Vec<String>,

    /// Warm iterations per cell.
    #[arg(long)]
    iterations: Option<usize>,

    /// Untimed executions before measurement starts.
    #[arg(long)]
    warmup: Option<usize>,

    /// Confidence level for warm intervals, e.g. 0.95.
    #[arg(long)]
    confidence: Option<f64>,

    /// Pause between iterations, milliseconds (1 to 10).
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Per-query timeout, milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Benchmark backends on parallel threads.
    #[arg(long)]
    parallel: bool,

    /// Subset sampling seed.
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    /// Flags expressed as a config layer, so file and CLI merge uniformly.
    fn overrides(&self) -> RunConfigFile {
        RunConfigFile {
            backends: (!self.backends.is_empty()).then(|| self.backends.clone()),
            fractions: (!self.fractions.is_empty()).then(|| self.fractions.clone()),
            queries: (!self.queries.is_empty()).then(|| self.queries.clone()),
            iterations: self.iterations,
            warmup: self.warmup,
            confidence: self.confidence,
            delay_ms: self.delay_ms,
            timeout_ms: self.timeout_ms,
            parallel: self.parallel.then_some(true),
            seed: self.seed,
        }
    }
}

fn main() -> BenchResult<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Generate {
            out,
            patients,
            doctors,
            procedures,
            visits,
            seed,
        } => cmd_generate(
            &out,
            GenSpec {
                patients,
                doctors,
                procedures,
                visits,
                seed,
            },
        ),
        Command::Sample {
            data,
            out,
            fractions,
            seed,
            proportional_parents,
        } => cmd_sample(&data, &out, &fractions, seed, proportional_parents),
        Command::Run(args) => cmd_run(args),
    }
}

fn cmd_generate(out: &Path, spec: GenSpec) -> BenchResult<()> {
    println!(
        "  Generating {} patients, {} doctors, {} procedures, {} visits (seed {})",
        spec.patients, spec.doctors, spec.procedures, spec.visits, spec.seed
    );
    let tables = datagen::generate(&spec);
    tables.store(out)?;
    println!("  Base dataset written to {}", out.display());
    Ok(())
}

fn cmd_sample(
    data: &Path,
    out: &Path,
    fractions: &[f64],
    seed: u64,
    proportional_parents: bool,
) -> BenchResult<()> {
    let base = EntityTables::load(data)?;
    let ladder = ladder_from_ratios(fractions)?;
    let policy = if proportional_parents {
        SubsetPolicy::ReferencedPlusProportional
    } else {
        SubsetPolicy::ReferencedOnly
    };

    let mut sampler = SubsetSampler::new(seed, policy);
    let levels = sampler.derive(&base, &ladder)?;
    for level in &levels {
        level.persist(out)?;
        println!(
            "  {}: {} visits, {} patients, {} doctors, {} procedures",
            level.fraction,
            level.tables.visits.len(),
            level.tables.patients.len(),
            level.tables.doctors.len(),
            level.tables.procedures.len()
        );
    }
    println!("  Subsets written to {}", out.display());
    Ok(())
}

fn cmd_run(args: RunArgs) -> BenchResult<()> {
    let file = match &args.config {
        Some(path) => RunConfigFile::load(path)?,
        None => RunConfigFile::default(),
    };
    let settings = file.merged(args.overrides()).resolve()?;

    println!(
        "\n{}",
        "╔══════════════════════════════════════════════════════╗"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "║       MedBench Cross-Backend Query Benchmarks        ║"
            .bold()
            .blue()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════╝"
            .bold()
            .blue()
    );
    println!(
        "  Backends: {}  Fractions: {}",
        settings.backends.join(", "),
        settings
            .fractions
            .iter()
            .map(|f| f.label())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  Queries: {}",
        settings
            .queries
            .iter()
            .map(|q| q.name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  Iterations: {} warm + 1 cold  Warmup: {}  Confidence: {:.0}%  Seed: {}",
        settings.probe.iterations,
        settings.probe.warmup,
        settings.confidence * 100.0,
        settings.seed
    );

    let base = EntityTables::load(&args.data)?;
    println!(
        "  Base dataset: {} visits over {} patients",
        base.visits.len(),
        base.patients.len()
    );
    let mut sampler = SubsetSampler::new(settings.seed, SubsetPolicy::ReferencedOnly);
    let levels = sampler.derive(&base, &settings.fractions)?;

    // Working directory for backend storage, dropped after the run.
    let tmp = TempDir::new()?;

    let mut backends: Vec<Box<dyn Backend>> = Vec::new();
    for name in &settings.backends {
        match name.as_str() {
            "sqlite" => match SqliteBackend::new(tmp.path()) {
                Ok(b) => backends.push(Box::new(b)),
                Err(e) => eprintln!("  {} sqlite: {}", "SKIP".yellow(), e),
            },
            "memory" => match MemoryBackend::new() {
                Ok(b) => backends.push(Box::new(b)),
                Err(e) => eprintln!("  {} memory: {}", "SKIP".yellow(), e),
            },
            other => {
                return Err(BenchError::Config(format!("unknown backend: {}", other)));
            }
        }
    }
    if backends.is_empty() {
        return Err(BenchError::Config(
            "no usable backends. Check --backends.".into(),
        ));
    }
    println!(
        "  Benchmarking: {}",
        backends
            .iter()
            .map(|b| b.kind())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n  interrupt received, stopping after the current cell");
        handler_flag.cancel();
    })
    .map_err(|e| BenchError::Config(format!("interrupt handler: {}", e)))?;

    let plan = RunPlan {
        probe: settings.probe.clone(),
        confidence: settings.confidence,
        parallel: settings.parallel,
    };
    let rows = run_matrix(backends, &levels, &settings.queries, &plan, &cancel);

    let report = RunReport {
        metadata: RunMetadata::collect(),
        iterations: settings.probe.iterations,
        confidence: settings.confidence,
        rows,
    };

    print_summary(&report);

    std::fs::create_dir_all(&args.out)?;
    write_cold_csv(&report, &args.out.join("first_execution.csv"))?;
    write_warm_csv(&report, &args.out.join("steady_state.csv"))?;
    export_json(&report, &args.out.join("report.json"))?;

    if cancel.is_cancelled() {
        eprintln!("  run was interrupted; exported results are partial");
    }
    Ok(())
}
