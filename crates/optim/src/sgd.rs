//! Plain stochastic gradient descent.

use dpsvi_core::{ParamTree, Result, Scalar};

use crate::Optimizer;

/// Gradient descent with a fixed step size.
#[derive(Clone, Copy, Debug)]
pub struct Sgd {
    /// Step size.
    pub step_size: f64,
}

impl Sgd {
    /// Create an SGD optimizer.
    pub fn new(step_size: f64) -> Self {
        Self { step_size }
    }
}

impl Optimizer for Sgd {
    type State = ParamTree;

    fn init(&self, params: ParamTree) -> Self::State {
        params
    }

    fn update(&self, _step: u64, grad: &ParamTree, state: Self::State) -> Result<Self::State> {
        let lr = self.step_size as Scalar;
        state.try_zip_with(grad, |x, g| {
            ndarray::Zip::from(x).and(g).map_collect(|&x, &g| x - lr * g)
        })
    }

    fn get_params<'a>(&self, state: &'a Self::State) -> &'a ParamTree {
        state
    }
}
