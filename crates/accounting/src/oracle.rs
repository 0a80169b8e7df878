//! The privacy-accounting oracle boundary.

use dpsvi_core::Result;

/// Neighboring-dataset relation under which privacy is accounted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighboringRelation {
    /// Datasets differ by adding or removing one example.
    AddRemove,
    /// Datasets differ by substituting one example.
    Substitute,
}

/// An epsilon-for-sigma accounting oracle.
///
/// Implementations must be monotonically decreasing in sigma (unchecked
/// assumption) and report out-of-range sigma values as
/// [`DpError::OracleDomain`](dpsvi_core::DpError::OracleDomain) rather than
/// returning garbage. `precision` scales the oracle's internal evaluation
/// grid; the calibrator compares two precision levels to reject numerically
/// unstable evaluations.
pub trait PrivacyOracle {
    /// Cumulative privacy epsilon for the given noise multiplier.
    fn epsilon(&self, sigma: f64, precision: f64) -> Result<f64>;
}

impl<F> PrivacyOracle for F
where
    F: Fn(f64, f64) -> Result<f64>,
{
    fn epsilon(&self, sigma: f64, precision: f64) -> Result<f64> {
        self(sigma, precision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpsvi_core::DpError;

    #[test]
    fn closures_are_oracles() {
        let oracle = |sigma: f64, _precision: f64| {
            if sigma <= 0.0 {
                Err(DpError::OracleDomain { sigma })
            } else {
                Ok(1.0 / sigma)
            }
        };
        assert!((oracle.epsilon(2.0, 1.0).unwrap() - 0.5).abs() < 1e-12);
        assert!(oracle.epsilon(-1.0, 1.0).is_err());
    }
}
