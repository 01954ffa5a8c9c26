//! Cross-backend query latency benchmarking over a relational healthcare
//! dataset: adapters, the matrix driver, reporting and data generation.

pub mod adapters;
pub mod config;
pub mod datagen;
pub mod report;
pub mod runner;

pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Errors raised by adapters and the benchmark driver.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Core(#[from] medbench_core::CoreError),

    /// The backend could not produce a session: missing namespace,
    /// unreachable file, refused connection. Distinct from [`Self::Query`]
    /// so the driver can tell a dead backend from a bad query.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A query failed inside an open session.
    #[error("query error: {0}")]
    Query(String),

    #[error("config error: {0}")]
    Config(String),
}
