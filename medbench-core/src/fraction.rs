//! Sampling fractions and descending fraction ladders.

use crate::error::{CoreError, CoreResult};
use serde::Serialize;

/// A sampling fraction in (0, 1], labelled by whole percent.
///
/// Two fractions compare equal when they round to the same percent, which
/// is also what names their files and storage namespaces.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(into = "f64")]
pub struct Fraction(f64);

impl Fraction {
    pub fn new(ratio: f64) -> CoreResult<Self> {
        if ratio.is_finite() && ratio > 0.0 && ratio <= 1.0 {
            Ok(Self(ratio))
        } else {
            Err(CoreError::BadFraction(ratio))
        }
    }

    pub fn ratio(self) -> f64 {
        self.0
    }

    /// Whole-percent label, e.g. 0.75 -> 75.
    pub fn percent(self) -> u32 {
        (self.0 * 100.0).round() as u32
    }

    pub fn label(self) -> String {
        format!("{}%", self.percent())
    }

    /// Storage namespace for this fraction, e.g. `healthcare_75`.
    pub fn namespace(self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.percent())
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        self.percent() == other.percent()
    }
}

impl Eq for Fraction {}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

impl From<Fraction> for f64 {
    fn from(f: Fraction) -> f64 {
        f.0
    }
}

/// Build a ladder from raw ratios and check it is strictly decreasing.
pub fn ladder_from_ratios(ratios: &[f64]) -> CoreResult<Vec<Fraction>> {
    let ladder: Vec<Fraction> = ratios
        .iter()
        .map(|&r| Fraction::new(r))
        .collect::<CoreResult<_>>()?;
    validate_ladder(&ladder)?;
    Ok(ladder)
}

/// A ladder must be non-empty and strictly decreasing by whole percent.
/// The sampler draws each level out of the previous one, and percent keys
/// every file name and storage namespace, so two levels that round to the
/// same percent would overwrite each other.
pub fn validate_ladder(ladder: &[Fraction]) -> CoreResult<()> {
    if ladder.is_empty() {
        return Err(CoreError::EmptyLadder);
    }
    for pair in ladder.windows(2) {
        if pair[1].percent() >= pair[0].percent() {
            return Err(CoreError::LadderNotDecreasing {
                prev: pair[0].to_string(),
                next: pair[1].to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_labels() {
        let f = Fraction::new(0.75).unwrap();
        assert_eq!(f.percent(), 75);
        assert_eq!(f.label(), "75%");
        assert_eq!(f.namespace("healthcare"), "healthcare_75");
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Fraction::new(0.0).is_err());
        assert!(Fraction::new(1.01).is_err());
        assert!(Fraction::new(f64::NAN).is_err());
        assert!(Fraction::new(1.0).is_ok());
    }

    #[test]
    fn ladder_must_decrease() {
        assert!(ladder_from_ratios(&[1.0, 0.75, 0.5, 0.25]).is_ok());
        assert!(matches!(
            ladder_from_ratios(&[1.0, 0.75, 0.75]),
            Err(CoreError::LadderNotDecreasing { .. })
        ));
        assert!(matches!(
            ladder_from_ratios(&[0.5, 0.75]),
            Err(CoreError::LadderNotDecreasing { .. })
        ));
        assert!(matches!(ladder_from_ratios(&[]), Err(CoreError::EmptyLadder)));
    }

    #[test]
    fn ladder_rejects_percent_collisions() {
        // 0.754 and 0.746 are distinct ratios but both label as 75%, so
        // their files and namespaces would land on the same keys.
        let a = Fraction::new(0.754).unwrap();
        let b = Fraction::new(0.746).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.namespace("healthcare"), b.namespace("healthcare"));
        assert!(matches!(
            ladder_from_ratios(&[1.0, 0.754, 0.746]),
            Err(CoreError::LadderNotDecreasing { .. })
        ));
    }
}
