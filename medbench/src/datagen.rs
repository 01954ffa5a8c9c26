//! Deterministic dataset generation (ChaCha8-seeded).

use chrono::NaiveDate;
use medbench_core::{Doctor, EntityTables, Patient, Procedure, Visit};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const FIRST_NAMES: [&str; 16] = [
    "Alice", "Brian", "Carmen", "Derek", "Elena", "Felix", "Grace", "Hassan", "Irene", "Jonas",
    "Katya", "Liam", "Mona", "Nikhil", "Olga", "Pavel",
];

const LAST_NAMES: [&str; 16] = [
    "Anders", "Bauer", "Castro", "Dimitrov", "Eriksen", "Fischer", "Garcia", "Huang", "Ivanov",
    "Jensen", "Kovacs", "Larsen", "Moreau", "Novak", "Okafor", "Petrov",
];

const SPECIALIZATIONS: [&str; 10] = [
    "Cardiology",
    "Dermatology",
    "Endocrinology",
    "Gastroenterology",
    "Neurology",
    "Oncology",
    "Orthopedics",
    "Pediatrics",
    "Radiology",
    "Urology",
];

const PROCEDURES: [&str; 12] = [
    "Annual physical",
    "Blood panel",
    "X-ray",
    "MRI scan",
    "CT scan",
    "Ultrasound",
    "Vaccination",
    "Biopsy",
    "Physical therapy session",
    "Allergy test",
    "EKG",
    "Colonoscopy",
];

/// Generation parameters; defaults mirror the reference dataset.
#[derive(Debug, Clone)]
pub struct GenSpec {
    pub patients: usize,
    pub doctors: usize,
    pub procedures: usize,
    pub visits: usize,
    pub seed: u64,
}

impl Default for GenSpec {
    fn default() -> Self {
        Self {
            patients: 400,
            doctors: 15,
            procedures: 12,
            visits: 1200,
            seed: 42,
        }
    }
}

/// Generate the four tables. The same spec reproduces the same rows bit for bit.
///
/// Visit dates span 2019..2024 so the catalog's 2021..2023 reporting
/// window is populated without covering every visit.
pub fn generate(spec: &GenSpec) -> EntityTables {
    let mut rng = ChaCha8Rng::seed_from_u64(spec.seed);

    let patients: Vec<Patient> = (1..=spec.patients as u64)
        .map(|id| Patient {
            id,
            name: full_name(&mut rng),
            birthdate: random_date(&mut rng, 1940, 2005),
            address: format!(
                "{} {} St",
                rng.gen_range(1..999),
                LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]
            ),
        })
        .collect();

    let doctors: Vec<Doctor> = (1..=spec.doctors as u64)
        .map(|id| Doctor {
            id,
            name: full_name(&mut rng),
            specialization: SPECIALIZATIONS[rng.gen_range(0..SPECIALIZATIONS.len())].to_string(),
        })
        .collect();

    let procedures: Vec<Procedure> = (1..=spec.procedures as u64)
        .map(|id| Procedure {
            id,
            description: PROCEDURES[(id as usize - 1) % PROCEDURES.len()].to_string(),
            cost_cents: rng.gen_range(10_000..=100_000),
        })
        .collect();

    let visits: Vec<Visit> = (1..=spec.visits as u64)
        .map(|id| Visit {
            id,
            patient_id: patients[rng.gen_range(0..patients.len())].id,
            doctor_id: doctors[rng.gen_range(0..doctors.len())].id,
            procedure_id: procedures[rng.gen_range(0..procedures.len())].id,
            date: random_date(&mut rng, 2019, 2024),
            duration_minutes: rng.gen_range(10..=180),
        })
        .collect();

    EntityTables {
        patients,
        doctors,
        procedures,
        visits,
    }
}

fn full_name(rng: &mut ChaCha8Rng) -> String {
    format!(
        "{} {}",
        FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())],
        LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]
    )
}

/// Uniform date in `[start_year, end_year)`; ordinal 1..=365 is valid in
/// every year, leap days just never come up.
fn random_date(rng: &mut ChaCha8Rng, start_year: i32, end_year: i32) -> NaiveDate {
    let year = rng.gen_range(start_year..end_year);
    let ordinal = rng.gen_range(1..=365);
    NaiveDate::from_yo_opt(year, ordinal).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let spec = GenSpec::default();
        assert_eq!(generate(&spec), generate(&spec));
        let other = GenSpec { seed: 43, ..spec };
        assert_ne!(generate(&other).visits, generate(&GenSpec::default()).visits);
    }

    #[test]
    fn generated_tables_are_valid_and_sized() {
        let tables = generate(&GenSpec::default());
        tables.validate().unwrap();
        assert_eq!(tables.patients.len(), 400);
        assert_eq!(tables.doctors.len(), 15);
        assert_eq!(tables.procedures.len(), 12);
        assert_eq!(tables.visits.len(), 1200);
    }

    #[test]
    fn reporting_window_is_populated() {
        let tables = generate(&GenSpec::default());
        let start: NaiveDate = "2021-01-01".parse().unwrap();
        let end: NaiveDate = "2023-12-31".parse().unwrap();
        let in_window = tables
            .visits
            .iter()
            .filter(|v| v.date >= start && v.date <= end)
            .count();
        assert!(in_window > 0 && in_window < tables.visits.len());
    }
}
