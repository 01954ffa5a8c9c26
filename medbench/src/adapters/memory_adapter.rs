//! In-process reference backend.
//!
//! Holds each namespace's tables in owned vectors and answers the catalog
//! with hash-map aggregation. The baseline in comparisons, and the fast
//! path for driver tests.

use super::{Backend, QueryKind, QueryOutcome, Session, NAMESPACE_PREFIX, WINDOW_END, WINDOW_START};
use crate::{BenchError, BenchResult};
use chrono::NaiveDate;
use medbench_core::{DatasetLevel, EntityTables, Visit};
use std::collections::{HashMap, HashSet};

pub struct MemoryBackend {
    namespaces: HashMap<String, EntityTables>,
    window: (NaiveDate, NaiveDate),
}

impl MemoryBackend {
    pub fn new() -> BenchResult<Self> {
        let start = WINDOW_START
            .parse()
            .map_err(|e| BenchError::Config(format!("window start: {}", e)))?;
        let end = WINDOW_END
            .parse()
            .map_err(|e| BenchError::Config(format!("window end: {}", e)))?;
        Ok(Self {
            namespaces: HashMap::new(),
            window: (start, end),
        })
    }
}

impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn load(&mut self, level: &DatasetLevel) -> BenchResult<()> {
        self.namespaces
            .insert(level.namespace(NAMESPACE_PREFIX), level.tables.clone());
        Ok(())
    }

    fn open_session(&mut self, namespace: &str) -> BenchResult<Box<dyn Session + '_>> {
        let tables = self.namespaces.get(namespace).ok_or_else(|| {
            BenchError::Unavailable(format!("namespace {} not loaded", namespace))
        })?;
        Ok(Box::new(MemorySession {
            tables,
            window: self.window,
        }))
    }
}

struct MemorySession<'a> {
    tables: &'a EntityTables,
    window: (NaiveDate, NaiveDate),
}

impl Session for MemorySession<'_> {
    fn execute(&mut self, query: QueryKind) -> BenchResult<QueryOutcome> {
        let (start, end) = self.window;
        let visits: Vec<&Visit> = self
            .tables
            .visits
            .iter()
            .filter(|v| v.date >= start && v.date <= end)
            .collect();

        let rows = match query {
            QueryKind::PatientVisitCounts => {
                let mut counts: HashMap<u64, u64> = HashMap::new();
                for v in &visits {
                    *counts.entry(v.patient_id).or_default() += 1;
                }
                counts.len() as u64
            }
            QueryKind::DoctorVisitCounts => {
                let specs: HashMap<u64, &str> = self
                    .tables
                    .doctors
                    .iter()
                    .map(|d| (d.id, d.specialization.as_str()))
                    .collect();
                let mut counts: HashMap<(u64, &str), u64> = HashMap::new();
                for v in &visits {
                    let spec = specs.get(&v.doctor_id).copied().ok_or_else(|| {
                        BenchError::Query(format!(
                            "visit {} references unknown doctor {}",
                            v.id, v.doctor_id
                        ))
                    })?;
                    *counts.entry((v.doctor_id, spec)).or_default() += 1;
                }
                counts.len() as u64
            }
            QueryKind::ProcedureUsage => {
                let descriptions: HashMap<u64, &str> = self
                    .tables
                    .procedures
                    .iter()
                    .map(|p| (p.id, p.description.as_str()))
                    .collect();
                let mut counts: HashMap<(u64, &str), u64> = HashMap::new();
                for v in &visits {
                    let description = descriptions.get(&v.procedure_id).copied().ok_or_else(|| {
                        BenchError::Query(format!(
                            "visit {} references unknown procedure {}",
                            v.id, v.procedure_id
                        ))
                    })?;
                    *counts.entry((v.procedure_id, description)).or_default() += 1;
                }
                counts.len() as u64
            }
            QueryKind::DoctorPatientReach => {
                let mut patients: HashMap<u64, HashSet<u64>> = HashMap::new();
                for v in &visits {
                    patients.entry(v.doctor_id).or_default().insert(v.patient_id);
                }
                patients.len() as u64
            }
        };
        Ok(QueryOutcome { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medbench_core::{Doctor, Fraction, Patient, Procedure};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn visit(id: u64, patient: u64, doctor: u64, procedure: u64, day: &str) -> Visit {
        Visit {
            id,
            patient_id: patient,
            doctor_id: doctor,
            procedure_id: procedure,
            date: date(day),
            duration_minutes: 20,
        }
    }

    fn fixture() -> DatasetLevel {
        let tables = EntityTables {
            patients: (1..=3)
                .map(|id| Patient {
                    id,
                    name: format!("p{}", id),
                    birthdate: date("1980-01-01"),
                    address: "addr".into(),
                })
                .collect(),
            doctors: vec![
                Doctor {
                    id: 1,
                    name: "d1".into(),
                    specialization: "Cardiology".into(),
                },
                Doctor {
                    id: 2,
                    name: "d2".into(),
                    specialization: "Oncology".into(),
                },
            ],
            procedures: vec![Procedure {
                id: 1,
                description: "X-ray".into(),
                cost_cents: 20_000,
            }],
            visits: vec![
                visit(1, 1, 1, 1, "2021-05-01"),
                visit(2, 1, 1, 1, "2022-05-01"),
                visit(3, 2, 1, 1, "2023-05-01"),
                visit(4, 3, 2, 1, "2022-07-01"),
                // outside the reporting window, must not count
                visit(5, 3, 2, 1, "2019-01-01"),
                visit(6, 2, 2, 1, "2024-06-01"),
            ],
        };
        DatasetLevel {
            fraction: Fraction::new(1.0).unwrap(),
            tables,
        }
    }

    #[test]
    fn aggregates_respect_the_window() {
        let mut backend = MemoryBackend::new().unwrap();
        backend.load(&fixture()).unwrap();
        let mut session = backend.open_session("healthcare_100").unwrap();

        // in-window visits: 1..=4 -> patients {1, 2, 3}, doctors {1, 2}
        assert_eq!(session.execute(QueryKind::PatientVisitCounts).unwrap().rows, 3);
        assert_eq!(session.execute(QueryKind::DoctorVisitCounts).unwrap().rows, 2);
        assert_eq!(session.execute(QueryKind::ProcedureUsage).unwrap().rows, 1);
        assert_eq!(session.execute(QueryKind::DoctorPatientReach).unwrap().rows, 2);
    }

    #[test]
    fn unknown_namespace_is_unavailable() {
        let mut backend = MemoryBackend::new().unwrap();
        backend.load(&fixture()).unwrap();
        assert!(matches!(
            backend.open_session("healthcare_75"),
            Err(BenchError::Unavailable(_))
        ));
    }
}
