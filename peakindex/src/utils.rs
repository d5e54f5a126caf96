use thiserror::Error;

/// A closed-closed range [a, b] where both endpoints are inclusive.
///
/// Construction enforces that the first element is less than or equal to the
/// second, so a degenerate window fails loudly at the boundary instead of
/// silently matching nothing downstream.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IncludedRange<T: Copy + PartialOrd>(T, T);

#[derive(Error, Debug)]
pub enum IncludedRangeError<T: Copy + PartialOrd + std::fmt::Debug> {
    #[error(
        "Expected the first element to be less than or equal to the second, got ({0:?}, {1:?})"
    )]
    ExpectedOrderedRange(T, T),
}

impl<T: Copy + PartialOrd + std::fmt::Debug> IncludedRange<T> {
    pub fn try_new(left: T, right: T) -> Result<Self, IncludedRangeError<T>> {
        if left > right {
            Err(IncludedRangeError::ExpectedOrderedRange(left, right))
        } else {
            Ok(Self(left, right))
        }
    }

    pub fn start(&self) -> T {
        self.0
    }

    pub fn end(&self) -> T {
        self.1
    }

    pub fn contains(&self, x: T) -> bool {
        self.0 <= x && x <= self.1
    }

    pub fn intersects(&self, other: Self) -> bool {
        !(self.end() < other.start() || other.end() < self.start())
    }
}

impl<T> TryFrom<(T, T)> for IncludedRange<T>
where
    T: Copy + PartialOrd + std::fmt::Debug,
{
    type Error = IncludedRangeError<T>;

    fn try_from(value: (T, T)) -> Result<Self, Self::Error> {
        IncludedRange::try_new(value.0, value.1)
    }
}

pub fn ppm_tol_range(elem: f64, tol_ppm: f64) -> IncludedRange<f64> {
    let utol = elem * (tol_ppm / 1e6);
    let left_e = elem - utol;
    let right_e = elem + utol;
    (left_e, right_e).try_into().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_tol_range() {
        let rng = ppm_tol_range(1000.0, 10.0);
        assert!((rng.start() - 999.99).abs() < 1e-9);
        assert!((rng.end() - 1000.01).abs() < 1e-9);
        assert!(rng.contains(1000.0));
        assert!(!rng.contains(1000.011));
    }

    #[test]
    fn test_ordered_range_enforced() {
        let bad: Result<IncludedRange<f64>, _> = (2.0, 1.0).try_into();
        assert!(bad.is_err());
    }
}
