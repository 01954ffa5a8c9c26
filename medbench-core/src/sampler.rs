//! Nested, referentially consistent dataset subsets.
//!
//! Visits are the sampling unit. Each level is drawn from the previous
//! level's visits, so every smaller subset is strictly contained in every
//! larger one and a backend loaded at 25% holds exactly a subset of the
//! rows it holds at 50%. Parent tables are carried along so that every
//! foreign key resolves inside its own level.

use crate::error::{CoreError, CoreResult};
use crate::fraction::{validate_ladder, Fraction};
use crate::tables::{EntityTables, Visit};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::path::Path;

/// How parent tables are carried into a subset level.
///
/// A sampler instance holds one policy for its whole run; mixing policies
/// across levels would produce subsets that are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsetPolicy {
    /// Parents are exactly the rows referenced by the level's visits.
    #[default]
    ReferencedOnly,
    /// Referenced rows plus a nested proportional sample of each parent
    /// table, keeping parent cardinality roughly proportional to the
    /// fraction even when few rows are referenced.
    ReferencedPlusProportional,
}

/// One derived dataset level: a fraction and its four tables.
#[derive(Debug, Clone)]
pub struct DatasetLevel {
    pub fraction: Fraction,
    pub tables: EntityTables,
}

impl DatasetLevel {
    /// Storage namespace for this level, e.g. `healthcare_75`.
    pub fn namespace(&self, prefix: &str) -> String {
        self.fraction.namespace(prefix)
    }

    fn file_suffix(fraction: Fraction) -> String {
        format!("_{}percent", fraction.percent())
    }

    /// Write the level's tables as `{table}_{percent}percent.csv`.
    pub fn persist(&self, dir: &Path) -> CoreResult<()> {
        self.tables
            .store_suffixed(dir, &Self::file_suffix(self.fraction))
    }

    /// Read a previously persisted level back, re-validating integrity.
    pub fn load(dir: &Path, fraction: Fraction) -> CoreResult<Self> {
        let tables = EntityTables::load_suffixed(dir, &Self::file_suffix(fraction))?;
        Ok(Self { fraction, tables })
    }
}

/// Derives descending dataset levels from a base dataset.
///
/// Seeded, so the same seed and base produce bit-identical subsets across
/// runs and platforms. The rng state advances across levels; levels are
/// not independently re-seedable.
pub struct SubsetSampler {
    rng: ChaCha8Rng,
    policy: SubsetPolicy,
}

impl SubsetSampler {
    pub fn new(seed: u64, policy: SubsetPolicy) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            policy,
        }
    }

    /// Derive one level per ladder entry.
    ///
    /// The ladder must be strictly decreasing. A leading 1.0 level is the
    /// full dataset, untouched. Level sizes follow
    /// `round(|previous| * f_i / f_prev)`; a level that rounds to zero
    /// visits is an error, not an empty subset.
    pub fn derive(
        &mut self,
        base: &EntityTables,
        ladder: &[Fraction],
    ) -> CoreResult<Vec<DatasetLevel>> {
        validate_ladder(ladder)?;
        if base.visits.is_empty() {
            return Err(CoreError::EmptyBase);
        }
        base.validate()?;

        let mut levels: Vec<DatasetLevel> = Vec::with_capacity(ladder.len());
        let mut current = base.clone();
        let mut prev_ratio = 1.0;

        for &fraction in ladder {
            let scale = fraction.ratio() / prev_ratio;
            let tables = if (scale - 1.0).abs() < f64::EPSILON {
                current.clone()
            } else {
                let target = (current.visits.len() as f64 * scale).round() as usize;
                if target == 0 {
                    return Err(CoreError::EmptySubset(fraction.label()));
                }
                let visits = sample_preserving_order(&mut self.rng, &current.visits, target);
                self.close_over(&current, visits, scale)
            };
            current = tables.clone();
            prev_ratio = fraction.ratio();
            levels.push(DatasetLevel { fraction, tables });
        }
        Ok(levels)
    }

    /// Assemble a level around its sampled visits: parent tables are the
    /// referenced rows, plus a proportional nested sample under the
    /// proportional policy. Row order of the source tables is preserved.
    fn close_over(
        &mut self,
        current: &EntityTables,
        visits: Vec<Visit>,
        scale: f64,
    ) -> EntityTables {
        let mut patient_keep: BTreeSet<u64> = visits.iter().map(|v| v.patient_id).collect();
        let mut doctor_keep: BTreeSet<u64> = visits.iter().map(|v| v.doctor_id).collect();
        let mut procedure_keep: BTreeSet<u64> = visits.iter().map(|v| v.procedure_id).collect();

        if self.policy == SubsetPolicy::ReferencedPlusProportional {
            extend_proportional(&mut self.rng, &mut patient_keep, &current.patients, scale, |p| p.id);
            extend_proportional(&mut self.rng, &mut doctor_keep, &current.doctors, scale, |d| d.id);
            extend_proportional(&mut self.rng, &mut procedure_keep, &current.procedures, scale, |p| {
                p.id
            });
        }

        EntityTables {
            patients: current
                .patients
                .iter()
                .filter(|p| patient_keep.contains(&p.id))
                .cloned()
                .collect(),
            doctors: current
                .doctors
                .iter()
                .filter(|d| doctor_keep.contains(&d.id))
                .cloned()
                .collect(),
            procedures: current
                .procedures
                .iter()
                .filter(|p| procedure_keep.contains(&p.id))
                .cloned()
                .collect(),
            visits,
        }
    }
}

/// Uniform sample of `amount` rows, keeping the source order.
fn sample_preserving_order(rng: &mut ChaCha8Rng, visits: &[Visit], amount: usize) -> Vec<Visit> {
    let mut picked = index::sample(rng, visits.len(), amount.min(visits.len())).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| visits[i].clone()).collect()
}

/// Grow `keep` with a nested proportional draw from `rows`.
fn extend_proportional<T>(
    rng: &mut ChaCha8Rng,
    keep: &mut BTreeSet<u64>,
    rows: &[T],
    scale: f64,
    id: impl Fn(&T) -> u64,
) {
    if rows.is_empty() {
        return;
    }
    let target = ((rows.len() as f64 * scale).round() as usize).min(rows.len());
    for i in index::sample(rng, rows.len(), target) {
        keep.insert(id(&rows[i]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{Doctor, Patient, Procedure};
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn day(offset: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap() + chrono::Days::new(u64::from(offset) % 360)
    }

    fn base_tables(patients: usize, doctors: usize, procedures: usize, visits: usize) -> EntityTables {
        EntityTables {
            patients: (1..=patients as u64)
                .map(|id| Patient {
                    id,
                    name: format!("patient-{}", id),
                    birthdate: day(id as u32),
                    address: format!("{} Main St", id),
                })
                .collect(),
            doctors: (1..=doctors as u64)
                .map(|id| Doctor {
                    id,
                    name: format!("doctor-{}", id),
                    specialization: "General".into(),
                })
                .collect(),
            procedures: (1..=procedures as u64)
                .map(|id| Procedure {
                    id,
                    description: format!("procedure-{}", id),
                    cost_cents: 10_000 + id as u32,
                })
                .collect(),
            visits: (1..=visits as u64)
                .map(|id| Visit {
                    id,
                    patient_id: (id % patients as u64) + 1,
                    doctor_id: (id % doctors as u64) + 1,
                    procedure_id: (id % procedures as u64) + 1,
                    date: day(id as u32),
                    duration_minutes: 30,
                })
                .collect(),
        }
    }

    fn visit_ids(level: &DatasetLevel) -> HashSet<u64> {
        level.tables.visits.iter().map(|v| v.id).collect()
    }

    #[test]
    fn levels_nest_and_sizes_follow_rounding() {
        let base = base_tables(40, 6, 3, 1200);
        let ladder =
            vec![Fraction::new(1.0).unwrap(), Fraction::new(0.75).unwrap(), Fraction::new(0.25).unwrap()];
        let mut sampler = SubsetSampler::new(7, SubsetPolicy::ReferencedOnly);
        let levels = sampler.derive(&base, &ladder).unwrap();

        assert_eq!(levels[0].tables.visits.len(), 1200);
        assert_eq!(levels[1].tables.visits.len(), 900);
        // 0.25 relative to the 0.75 level: round(900 * 0.25 / 0.75)
        assert_eq!(levels[2].tables.visits.len(), 300);

        let full = visit_ids(&levels[0]);
        let mid = visit_ids(&levels[1]);
        let small = visit_ids(&levels[2]);
        assert!(mid.is_subset(&full));
        assert!(small.is_subset(&mid));
    }

    #[test]
    fn every_level_is_referentially_closed() {
        let base = base_tables(50, 8, 4, 600);
        let ladder = vec![
            Fraction::new(1.0).unwrap(),
            Fraction::new(0.5).unwrap(),
            Fraction::new(0.1).unwrap(),
        ];
        let mut sampler = SubsetSampler::new(11, SubsetPolicy::ReferencedOnly);
        for level in sampler.derive(&base, &ladder).unwrap() {
            level.tables.validate().unwrap();
            // referenced-only: parents carry no unreferenced rows
            let referenced: HashSet<u64> =
                level.tables.visits.iter().map(|v| v.patient_id).collect();
            assert!(level.tables.patients.iter().all(|p| referenced.contains(&p.id)));
        }
    }

    #[test]
    fn proportional_policy_stays_closed_and_nested() {
        let base = base_tables(100, 10, 5, 400);
        let ladder = vec![Fraction::new(0.5).unwrap(), Fraction::new(0.25).unwrap()];
        let mut sampler = SubsetSampler::new(3, SubsetPolicy::ReferencedPlusProportional);
        let levels = sampler.derive(&base, &ladder).unwrap();
        for level in &levels {
            level.tables.validate().unwrap();
        }
        let big: HashSet<u64> = levels[0].tables.patients.iter().map(|p| p.id).collect();
        let small: HashSet<u64> = levels[1].tables.patients.iter().map(|p| p.id).collect();
        assert!(small.is_subset(&big));
        assert!(visit_ids(&levels[1]).is_subset(&visit_ids(&levels[0])));
    }

    #[test]
    fn same_seed_same_subsets() {
        let base = base_tables(30, 5, 2, 500);
        let ladder = vec![Fraction::new(0.6).unwrap(), Fraction::new(0.3).unwrap()];
        let run = |seed| {
            let mut sampler = SubsetSampler::new(seed, SubsetPolicy::ReferencedOnly);
            sampler.derive(&base, &ladder).unwrap()
        };
        let a = run(42);
        let b = run(42);
        for (la, lb) in a.iter().zip(&b) {
            assert_eq!(la.tables, lb.tables);
        }
        let c = run(43);
        assert_ne!(a[0].tables.visits, c[0].tables.visits);
    }

    #[test]
    fn sampled_visits_keep_base_order() {
        let base = base_tables(30, 5, 2, 200);
        let ladder = vec![Fraction::new(0.4).unwrap()];
        let mut sampler = SubsetSampler::new(5, SubsetPolicy::ReferencedOnly);
        let levels = sampler.derive(&base, &ladder).unwrap();
        let ids: Vec<u64> = levels[0].tables.visits.iter().map(|v| v.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn zero_sized_level_is_an_error() {
        let base = base_tables(4, 2, 2, 3);
        let ladder = vec![Fraction::new(0.01).unwrap()];
        let mut sampler = SubsetSampler::new(1, SubsetPolicy::ReferencedOnly);
        assert!(matches!(
            sampler.derive(&base, &ladder),
            Err(CoreError::EmptySubset(_))
        ));
    }

    #[test]
    fn empty_base_is_an_error() {
        let mut base = base_tables(4, 2, 2, 3);
        base.visits.clear();
        let ladder = vec![Fraction::new(0.5).unwrap()];
        let mut sampler = SubsetSampler::new(1, SubsetPolicy::ReferencedOnly);
        assert!(matches!(sampler.derive(&base, &ladder), Err(CoreError::EmptyBase)));
    }

    #[test]
    fn persist_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let base = base_tables(20, 4, 2, 100);
        let ladder = vec![Fraction::new(0.5).unwrap()];
        let mut sampler = SubsetSampler::new(9, SubsetPolicy::ReferencedOnly);
        let level = sampler.derive(&base, &ladder).unwrap().remove(0);
        level.persist(dir.path()).unwrap();
        assert!(dir.path().join("visits_50percent.csv").exists());
        let loaded = DatasetLevel::load(dir.path(), level.fraction).unwrap();
        assert_eq!(loaded.tables, level.tables);
    }
}
