//! SQLite adapter (via rusqlite).
//!
//! One database file per namespace under the adapter's working directory.
//! Loading rebuilds the file from scratch inside a single transaction;
//! sessions open a fresh connection so the first query of a session runs
//! against cold connection state.

use super::{Backend, QueryKind, QueryOutcome, Session, NAMESPACE_PREFIX, WINDOW_END, WINDOW_START};
use crate::{BenchError, BenchResult};
use medbench_core::DatasetLevel;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const SCHEMA: &str = "CREATE TABLE patients (
    id        INTEGER PRIMARY KEY,
    name      TEXT NOT NULL,
    birthdate TEXT NOT NULL,
    address   TEXT NOT NULL
);
CREATE TABLE doctors (
    id             INTEGER PRIMARY KEY,
    name           TEXT NOT NULL,
    specialization TEXT NOT NULL
);
CREATE TABLE procedures (
    id          INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    cost_cents  INTEGER NOT NULL
);
CREATE TABLE visits (
    id               INTEGER PRIMARY KEY,
    patient_id       INTEGER NOT NULL REFERENCES patients(id),
    doctor_id        INTEGER NOT NULL REFERENCES doctors(id),
    procedure_id     INTEGER NOT NULL REFERENCES procedures(id),
    date             TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL
);
CREATE INDEX idx_visits_date ON visits(date);";

pub struct SqliteBackend {
    dir: PathBuf,
    loaded: HashSet<String>,
}

impl SqliteBackend {
    pub fn new(dir: &Path) -> BenchResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            loaded: HashSet::new(),
        })
    }

    fn db_path(&self, namespace: &str) -> PathBuf {
        self.dir.join(format!("{}.sqlite3", namespace))
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn load(&mut self, level: &DatasetLevel) -> BenchResult<()> {
        let namespace = level.namespace(NAMESPACE_PREFIX);
        let path = self.db_path(&namespace);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        // a stale WAL from a previous load must not outlive its database
        for sibling in ["sqlite3-wal", "sqlite3-shm"] {
            let leftover = path.with_extension(sibling);
            if leftover.exists() {
                std::fs::remove_file(&leftover)?;
            }
        }

        let mut conn = Connection::open(&path)
            .map_err(|e| BenchError::Unavailable(format!("sqlite open: {}", e)))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(|e| BenchError::Query(format!("sqlite pragma: {}", e)))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| BenchError::Query(format!("create schema: {}", e)))?;

        let tx = conn
            .transaction()
            .map_err(|e| BenchError::Query(format!("begin: {}", e)))?;
        {
            let mut stmt = tx
                .prepare_cached("INSERT INTO patients (id, name, birthdate, address) VALUES (?1, ?2, ?3, ?4)")
                .map_err(|e| BenchError::Query(format!("prepare patients: {}", e)))?;
            for p in &level.tables.patients {
                stmt.execute(params![p.id as i64, p.name, p.birthdate.to_string(), p.address])
                    .map_err(|e| BenchError::Query(format!("insert patient: {}", e)))?;
            }

            let mut stmt = tx
                .prepare_cached("INSERT INTO doctors (id, name, specialization) VALUES (?1, ?2, ?3)")
                .map_err(|e| BenchError::Query(format!("prepare doctors: {}", e)))?;
            for d in &level.tables.doctors {
                stmt.execute(params![d.id as i64, d.name, d.specialization])
                    .map_err(|e| BenchError::Query(format!("insert doctor: {}", e)))?;
            }

            let mut stmt = tx
                .prepare_cached("INSERT INTO procedures (id, description, cost_cents) VALUES (?1, ?2, ?3)")
                .map_err(|e| BenchError::Query(format!("prepare procedures: {}", e)))?;
            for p in &level.tables.procedures {
                stmt.execute(params![p.id as i64, p.description, p.cost_cents])
                    .map_err(|e| BenchError::Query(format!("insert procedure: {}", e)))?;
            }

            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO visits (id, patient_id, doctor_id, procedure_id, date, duration_minutes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| BenchError::Query(format!("prepare visits: {}", e)))?;
            for v in &level.tables.visits {
                stmt.execute(params![
                    v.id as i64,
                    v.patient_id as i64,
                    v.doctor_id as i64,
                    v.procedure_id as i64,
                    v.date.to_string(),
                    v.duration_minutes
                ])
                .map_err(|e| BenchError::Query(format!("insert visit: {}", e)))?;
            }
        }
        tx.commit()
            .map_err(|e| BenchError::Query(format!("commit load: {}", e)))?;

        self.loaded.insert(namespace);
        Ok(())
    }

    fn open_session(&mut self, namespace: &str) -> BenchResult<Box<dyn Session + '_>> {
        let path = self.db_path(namespace);
        if !self.loaded.contains(namespace) || !path.exists() {
            return Err(BenchError::Unavailable(format!(
                "namespace {} not loaded",
                namespace
            )));
        }
        let conn = Connection::open(&path)
            .map_err(|e| BenchError::Unavailable(format!("sqlite open: {}", e)))?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: Connection,
}

impl Session for SqliteSession {
    fn execute(&mut self, query: QueryKind) -> BenchResult<QueryOutcome> {
        let mut stmt = self
            .conn
            .prepare_cached(query_sql(query))
            .map_err(|e| BenchError::Query(format!("prepare {}: {}", query, e)))?;
        let mut rows = stmt
            .query(params![WINDOW_START, WINDOW_END])
            .map_err(|e| BenchError::Query(format!("{}: {}", query, e)))?;
        let mut count = 0u64;
        while rows
            .next()
            .map_err(|e| BenchError::Query(format!("{} row: {}", query, e)))?
            .is_some()
        {
            count += 1;
        }
        Ok(QueryOutcome { rows: count })
    }
}

/// ISO dates stored as TEXT compare correctly with plain string operators.
fn query_sql(query: QueryKind) -> &'static str {
    match query {
        QueryKind::PatientVisitCounts => {
            "SELECT patient_id, COUNT(*) FROM visits
             WHERE date >= ?1 AND date <= ?2
             GROUP BY patient_id"
        }
        QueryKind::DoctorVisitCounts => {
            "SELECT d.id, d.specialization, COUNT(*) FROM visits v
             JOIN doctors d ON d.id = v.doctor_id
             WHERE v.date >= ?1 AND v.date <= ?2
             GROUP BY d.id, d.specialization"
        }
        QueryKind::ProcedureUsage => {
            "SELECT p.id, p.description, COUNT(*) FROM visits v
             JOIN procedures p ON p.id = v.procedure_id
             WHERE v.date >= ?1 AND v.date <= ?2
             GROUP BY p.id, p.description"
        }
        QueryKind::DoctorPatientReach => {
            "SELECT doctor_id, COUNT(DISTINCT patient_id) FROM visits
             WHERE date >= ?1 AND date <= ?2
             GROUP BY doctor_id"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagen::{self, GenSpec};
    use medbench_core::Fraction;
    use tempfile::TempDir;

    fn loaded_backend(dir: &Path) -> (SqliteBackend, String) {
        let tables = datagen::generate(&GenSpec {
            patients: 20,
            doctors: 4,
            procedures: 3,
            visits: 120,
            seed: 5,
        });
        let level = DatasetLevel {
            fraction: Fraction::new(1.0).unwrap(),
            tables,
        };
        let mut backend = SqliteBackend::new(dir).unwrap();
        backend.load(&level).unwrap();
        (backend, level.namespace(NAMESPACE_PREFIX))
    }

    #[test]
    fn catalog_queries_run_and_group() {
        let dir = TempDir::new().unwrap();
        let (mut backend, namespace) = loaded_backend(dir.path());
        let mut session = backend.open_session(&namespace).unwrap();
        // group cardinality is bounded by the grouped table
        let patients = session.execute(QueryKind::PatientVisitCounts).unwrap();
        assert!(patients.rows > 0 && patients.rows <= 20);
        let doctors = session.execute(QueryKind::DoctorVisitCounts).unwrap();
        assert!(doctors.rows > 0 && doctors.rows <= 4);
        let procedures = session.execute(QueryKind::ProcedureUsage).unwrap();
        assert!(procedures.rows > 0 && procedures.rows <= 3);
        let reach = session.execute(QueryKind::DoctorPatientReach).unwrap();
        assert_eq!(reach.rows, doctors.rows);
    }

    #[test]
    fn unknown_namespace_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let (mut backend, _) = loaded_backend(dir.path());
        assert!(matches!(
            backend.open_session("healthcare_31"),
            Err(BenchError::Unavailable(_))
        ));
    }

    #[test]
    fn reload_replaces_the_namespace() {
        let dir = TempDir::new().unwrap();
        let (mut backend, namespace) = loaded_backend(dir.path());
        let smaller = DatasetLevel {
            fraction: Fraction::new(1.0).unwrap(),
            tables: datagen::generate(&GenSpec {
                patients: 5,
                doctors: 2,
                procedures: 2,
                visits: 10,
                seed: 6,
            }),
        };
        backend.load(&smaller).unwrap();
        let mut session = backend.open_session(&namespace).unwrap();
        let outcome = session.execute(QueryKind::PatientVisitCounts).unwrap();
        assert!(outcome.rows <= 5);
    }
}
