//! Privacy accounting and noise-multiplier calibration for DP-SVI.
//!
//! The calibrator treats the accountant as an opaque, monotonically
//! decreasing oracle from sigma to epsilon; the bundled
//! [`SubsampledGaussianOracle`] is the standard instantiation for both
//! neighboring-dataset relations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod calibrate;
pub mod moments;
pub mod oracle;

pub use calibrate::{
    approximate_sigma, approximate_sigma_add_remove, calibrate_sigma, Calibration,
    CalibrationConfig,
};
pub use moments::SubsampledGaussianOracle;
pub use oracle::{NeighboringRelation, PrivacyOracle};

/// Common imports for privacy accounting.
pub mod prelude {
    pub use crate::{
        approximate_sigma, approximate_sigma_add_remove, calibrate_sigma, Calibration,
        CalibrationConfig, NeighboringRelation, PrivacyOracle, SubsampledGaussianOracle,
    };
}
