//! Core primitives for differentially private stochastic variational
//! inference.
//!
//! This crate provides the building blocks of the DP-SVI update step:
//! gradient trees with a concrete flatten/unflatten pair, global-norm
//! clipping, and calibrated Gaussian noise injection over summed gradients.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clipping;
pub mod error;
pub mod noise;
pub mod tensor;
pub mod tree;

pub use clipping::{clip_and_sum, clip_tree};
pub use error::{DpError, Result};
pub use noise::{add_gaussian_noise, perturb_sum};
pub use tensor::{l2_norm, Scalar, Tensor};
pub use tree::{ParamTree, TreeSpec};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{
        add_gaussian_noise, clip_and_sum, clip_tree, l2_norm, perturb_sum, DpError, ParamTree,
        Result, Scalar, Tensor, TreeSpec,
    };
}
