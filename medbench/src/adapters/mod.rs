//! Backend adapters and the query catalog.
//!
//! Every backend in the comparison set implements [`Backend`] in its own
//! module. Sessions are explicit scoped handles, one per benchmark cell;
//! nothing here keeps module-level connection state.

pub mod memory_adapter;
pub mod sqlite_adapter;

use crate::BenchResult;
use medbench_core::DatasetLevel;
use serde::Serialize;

/// Prefix for per-fraction storage namespaces, e.g. `healthcare_75`.
pub const NAMESPACE_PREFIX: &str = "healthcare";

/// Start of the reporting window the catalog queries scan, inclusive.
pub const WINDOW_START: &str = "2021-01-01";
/// End of the reporting window, inclusive.
pub const WINDOW_END: &str = "2023-12-31";

/// The fixed aggregate query catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Visits per patient inside the reporting window.
    PatientVisitCounts,
    /// Visits per doctor, with the doctor's specialization.
    DoctorVisitCounts,
    /// Visits per procedure, with the procedure description.
    ProcedureUsage,
    /// Distinct patients seen per doctor.
    DoctorPatientReach,
}

impl QueryKind {
    pub const ALL: [QueryKind; 4] = [
        QueryKind::PatientVisitCounts,
        QueryKind::DoctorVisitCounts,
        QueryKind::ProcedureUsage,
        QueryKind::DoctorPatientReach,
    ];

    /// Stable identifier used in report rows and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            QueryKind::PatientVisitCounts => "patient_visit_counts",
            QueryKind::DoctorVisitCounts => "doctor_visit_counts",
            QueryKind::ProcedureUsage => "procedure_usage",
            QueryKind::DoctorPatientReach => "doctor_patient_reach",
        }
    }

    pub fn from_name(name: &str) -> Option<QueryKind> {
        QueryKind::ALL.into_iter().find(|q| q.name() == name)
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque query outcome; the driver only observes latency and cardinality.
#[derive(Debug, Clone, Copy)]
pub struct QueryOutcome {
    pub rows: u64,
}

/// A database under measurement.
pub trait Backend: Send {
    /// Stable backend identifier used in report rows.
    fn kind(&self) -> &'static str;

    /// Create (or replace) the namespace for `level` and load its tables.
    fn load(&mut self, level: &DatasetLevel) -> BenchResult<()>;

    /// Open a scoped session against a previously loaded namespace.
    ///
    /// Failures here mean "backend unavailable" and fail the whole cell;
    /// per-query failures are reported by [`Session::execute`] instead.
    fn open_session(&mut self, namespace: &str) -> BenchResult<Box<dyn Session + '_>>;
}

/// A scoped connection handle. Dropping it closes the session.
pub trait Session {
    fn execute(&mut self, query: QueryKind) -> BenchResult<QueryOutcome>;
}
