//! Error types for dataset ingestion, subset derivation and statistics.

use std::path::PathBuf;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{table} has duplicate id {id}")]
    DuplicateId { table: &'static str, id: u64 },

    /// A visit carries a foreign key that resolves to nothing. Ingestion
    /// refuses such rows outright instead of dropping them.
    #[error("visit {visit} references missing {table} id {id}")]
    DanglingReference {
        visit: u64,
        table: &'static str,
        id: u64,
    },

    #[error("fraction {0} outside (0, 1]")]
    BadFraction(f64),

    #[error("fraction ladder is empty")]
    EmptyLadder,

    #[error("fraction ladder must be strictly decreasing: {prev} then {next}")]
    LadderNotDecreasing { prev: String, next: String },

    #[error("fraction {0} yields an empty visit subset")]
    EmptySubset(String),

    #[error("cannot sample from an empty visits table")]
    EmptyBase,

    #[error("confidence level {0} outside (0, 1)")]
    BadConfidence(f64),

    #[error("not enough samples for an interval: {0}")]
    InsufficientSamples(usize),

    #[error("statistics error: {0}")]
    Stats(String),

    #[error("config error: {0}")]
    Config(String),
}
