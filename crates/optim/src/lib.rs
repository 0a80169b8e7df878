//! Optimizers over parameter trees.
//!
//! An optimizer is a capability triple: initialize state from parameters,
//! update state from a gradient, read parameters back out. The DP-SVI update
//! step is generic over this trait, so any conforming optimizer is
//! interchangeable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use dpsvi_core::{ParamTree, Result};

pub mod adadp;
pub mod adam;
pub mod sgd;

pub use adadp::{AdaDp, AdaDpState};
pub use adam::{Adam, AdamState};
pub use sgd::Sgd;

/// The `(init, update, get_params)` optimizer capability.
pub trait Optimizer {
    /// Opaque optimizer state: parameters plus any auxiliary quantities.
    type State;

    /// Build initial state around starting parameters.
    fn init(&self, params: ParamTree) -> Self::State;

    /// Apply one gradient at the given step index, producing new state.
    fn update(&self, step: u64, grad: &ParamTree, state: Self::State) -> Result<Self::State>;

    /// Read the current parameters out of the state.
    fn get_params<'a>(&self, state: &'a Self::State) -> &'a ParamTree;
}

/// Common imports.
pub mod prelude {
    pub use crate::{AdaDp, Adam, Optimizer, Sgd};
}
