//! Differentially private stochastic variational inference.
//!
//! Training loop plumbing for fitting probabilistic models under an
//! (epsilon, delta)-DP guarantee: per-example gradients are clipped and
//! noised before aggregation, and the noise multiplier is calibrated against
//! a privacy-accounting oracle. This crate re-exports the stable API of the
//! member crates and hosts the DP-SVI engine itself.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod svi;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use dpsvi_accounting as accounting;
pub use dpsvi_core as core;
pub use dpsvi_optim as optim;
pub use dpsvi_prng as prng;

pub use dpsvi_accounting::{
    approximate_sigma, approximate_sigma_add_remove, calibrate_sigma, Calibration,
    CalibrationConfig, NeighboringRelation, PrivacyOracle, SubsampledGaussianOracle,
};
pub use dpsvi_core::{
    add_gaussian_noise, clip_and_sum, clip_tree, l2_norm, perturb_sum, DpError, ParamTree, Result,
    Scalar, Tensor, TreeSpec,
};
pub use dpsvi_optim::{AdaDp, AdaDpState, Adam, AdamState, Optimizer, Sgd};
pub use dpsvi_prng::{KeyRng, PrngKey};
pub use svi::{DpSvi, PerExampleBatch, PerExampleLossGrad, SviState};

/// Convenience prelude covering the common DP-SVI building blocks.
pub mod prelude {
    pub use crate::svi::{DpSvi, PerExampleBatch, PerExampleLossGrad, SviState};
    pub use crate::{
        approximate_sigma, approximate_sigma_add_remove, calibrate_sigma, AdaDp, Adam,
        Calibration, CalibrationConfig, DpError, NeighboringRelation, Optimizer, ParamTree,
        PrivacyOracle, PrngKey, Result, Sgd, SubsampledGaussianOracle, Tensor,
    };
}
