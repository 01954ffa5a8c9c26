//! Typed entity tables and their CSV representation.
//!
//! Four tables form a dataset: patients, doctors and procedures are the
//! entity tables, visits is the fact table carrying a foreign key into
//! each of them. Ingestion is strict: duplicate ids and dangling foreign
//! keys are hard errors, never silently dropped.

use crate::error::{CoreError, CoreResult};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: u64,
    pub name: String,
    pub birthdate: NaiveDate,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: u64,
    pub name: String,
    pub specialization: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: u64,
    pub description: String,
    pub cost_cents: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: u64,
    pub patient_id: u64,
    pub doctor_id: u64,
    pub procedure_id: u64,
    pub date: NaiveDate,
    pub duration_minutes: u32,
}

/// The four tables of one dataset, full or sampled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityTables {
    pub patients: Vec<Patient>,
    pub doctors: Vec<Doctor>,
    pub procedures: Vec<Procedure>,
    pub visits: Vec<Visit>,
}

impl EntityTables {
    /// Read the four tables from `dir` and validate them.
    pub fn load(dir: &Path) -> CoreResult<Self> {
        Self::load_suffixed(dir, "")
    }

    /// Read tables named `{table}{suffix}.csv`, e.g. `visits_75percent.csv`.
    pub fn load_suffixed(dir: &Path, suffix: &str) -> CoreResult<Self> {
        let tables = Self {
            patients: read_table(&dir.join(format!("patients{}.csv", suffix)))?,
            doctors: read_table(&dir.join(format!("doctors{}.csv", suffix)))?,
            procedures: read_table(&dir.join(format!("procedures{}.csv", suffix)))?,
            visits: read_table(&dir.join(format!("visits{}.csv", suffix)))?,
        };
        tables.validate()?;
        Ok(tables)
    }

    /// Write the four tables into `dir` under their plain names.
    pub fn store(&self, dir: &Path) -> CoreResult<()> {
        self.store_suffixed(dir, "")
    }

    /// Write tables named `{table}{suffix}.csv`.
    pub fn store_suffixed(&self, dir: &Path, suffix: &str) -> CoreResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| CoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        write_table(&dir.join(format!("patients{}.csv", suffix)), &self.patients)?;
        write_table(&dir.join(format!("doctors{}.csv", suffix)), &self.doctors)?;
        write_table(&dir.join(format!("procedures{}.csv", suffix)), &self.procedures)?;
        write_table(&dir.join(format!("visits{}.csv", suffix)), &self.visits)?;
        Ok(())
    }

    /// Strict integrity check: unique primary ids everywhere, and every
    /// foreign key in visits must resolve.
    pub fn validate(&self) -> CoreResult<()> {
        let patients = unique_ids("patients", self.patients.iter().map(|p| p.id))?;
        let doctors = unique_ids("doctors", self.doctors.iter().map(|d| d.id))?;
        let procedures = unique_ids("procedures", self.procedures.iter().map(|p| p.id))?;
        unique_ids("visits", self.visits.iter().map(|v| v.id))?;

        for v in &self.visits {
            if !patients.contains(&v.patient_id) {
                return Err(CoreError::DanglingReference {
                    visit: v.id,
                    table: "patients",
                    id: v.patient_id,
                });
            }
            if !doctors.contains(&v.doctor_id) {
                return Err(CoreError::DanglingReference {
                    visit: v.id,
                    table: "doctors",
                    id: v.doctor_id,
                });
            }
            if !procedures.contains(&v.procedure_id) {
                return Err(CoreError::DanglingReference {
                    visit: v.id,
                    table: "procedures",
                    id: v.procedure_id,
                });
            }
        }
        Ok(())
    }
}

fn unique_ids(
    table: &'static str,
    ids: impl Iterator<Item = u64>,
) -> CoreResult<HashSet<u64>> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CoreError::DuplicateId { table, id });
        }
    }
    Ok(seen)
}

fn read_table<T: DeserializeOwned>(path: &Path) -> CoreResult<Vec<T>> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| CoreError::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record.map_err(|e| CoreError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?);
    }
    Ok(rows)
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> CoreResult<()> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| CoreError::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;
    for row in rows {
        wtr.serialize(row).map_err(|e| CoreError::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    wtr.flush().map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
