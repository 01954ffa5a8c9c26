//! Dataset model, nested subset sampling and timing statistics for the
//! medbench harness.
//!
//! This crate owns the entity tables, the fraction ladder, the subset
//! sampler, the timing probe and the statistics applied to probe output.
//! It knows nothing about backends; adapters, the driver and reporting
//! live in the `medbench` crate.

pub mod error;
pub mod fraction;
pub mod probe;
pub mod sampler;
pub mod stats;
pub mod tables;

pub use error::{CoreError, CoreResult};
pub use fraction::Fraction;
pub use probe::{CancelFlag, IterationFailure, ProbeError, TimingProbe, TimingSample};
pub use sampler::{DatasetLevel, SubsetPolicy, SubsetSampler};
pub use stats::{confidence_interval, iqr_filter, ConfidenceInterval};
pub use tables::{Doctor, EntityTables, Patient, Procedure, Visit};
