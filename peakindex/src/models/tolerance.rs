use serde::{
    Deserialize,
    Serialize,
};

use crate::utils::IncludedRange;

/// Mass tolerance for index queries.
///
/// Convention: tolerances are defined in terms of positive values. A ppm
/// tolerance of 10 on a mass of 1000 means the range (999.99, 1000.01).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MzTolerance {
    #[serde(rename = "da")]
    Absolute(f64),
    #[serde(rename = "ppm")]
    Ppm(f64),
}

impl Default for MzTolerance {
    fn default() -> Self {
        MzTolerance::Ppm(10.0)
    }
}

impl MzTolerance {
    pub fn mass_range(&self, mass: f64) -> IncludedRange<f64> {
        match self {
            MzTolerance::Absolute(tol) => (mass - tol, mass + tol).try_into().expect(
                "mass tolerance should never result in an invalid range, since tol is positive",
            ),
            MzTolerance::Ppm(ppm) => {
                let tol = mass * ppm / 1e6;
                (mass - tol, mass + tol).try_into().expect(
                    "mass tolerance should never result in an invalid range, since tol is positive",
                )
            }
        }
    }

    pub fn contains(&self, expected_mass: f64, observed_mass: f64) -> bool {
        self.mass_range(expected_mass).contains(observed_mass)
    }
}
