//! Adam with bias-corrected first and second moments.

use dpsvi_core::{DpError, ParamTree, Result, Scalar, Tensor};

use crate::Optimizer;

/// Adam optimizer.
#[derive(Clone, Copy, Debug)]
pub struct Adam {
    /// Step size.
    pub step_size: f64,
    /// First-moment decay rate.
    pub b1: f64,
    /// Second-moment decay rate.
    pub b2: f64,
    /// Denominator fuzz term.
    pub eps: f64,
}

impl Adam {
    /// Create an Adam optimizer with the usual default decay rates.
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            b1: 0.9,
            b2: 0.999,
            eps: 1e-8,
        }
    }
}

/// Adam state: parameters plus exponential moment estimates.
#[derive(Clone, Debug)]
pub struct AdamState {
    params: ParamTree,
    m: ParamTree,
    v: ParamTree,
}

impl Optimizer for Adam {
    type State = AdamState;

    fn init(&self, params: ParamTree) -> Self::State {
        let m = params.zeros_like();
        let v = params.zeros_like();
        AdamState { params, m, v }
    }

    fn update(&self, step: u64, grad: &ParamTree, state: Self::State) -> Result<Self::State> {
        let (x_leaves, spec) = state.params.flatten();
        let (g_leaves, g_spec) = grad.flatten();
        if g_spec != spec {
            return Err(DpError::shape_mismatch(
                "gradient structure does not match Adam parameters",
            ));
        }
        let (m_leaves, _) = state.m.flatten();
        let (v_leaves, _) = state.v.flatten();

        let b1 = self.b1 as Scalar;
        let b2 = self.b2 as Scalar;
        let lr = self.step_size as Scalar;
        let fuzz = self.eps as Scalar;
        let t = (step + 1) as f64;
        let m_correction = (1.0 - self.b1.powf(t)) as Scalar;
        let v_correction = (1.0 - self.b2.powf(t)) as Scalar;

        let mut new_x = Vec::with_capacity(x_leaves.len());
        let mut new_m = Vec::with_capacity(x_leaves.len());
        let mut new_v = Vec::with_capacity(x_leaves.len());
        for (((x, g), m), v) in x_leaves
            .iter()
            .zip(g_leaves.iter())
            .zip(m_leaves.iter())
            .zip(v_leaves.iter())
        {
            if x.raw_dim() != g.raw_dim() {
                return Err(DpError::shape_mismatch(
                    "gradient leaf shape does not match Adam parameters",
                ));
            }
            let m_next: Tensor = ndarray::Zip::from(m)
                .and(g)
                .map_collect(|&m, &g| b1 * m + (1.0 as Scalar - b1) * g);
            let v_next: Tensor = ndarray::Zip::from(v)
                .and(g)
                .map_collect(|&v, &g| b2 * v + (1.0 as Scalar - b2) * g * g);
            let x_next: Tensor = ndarray::Zip::from(x)
                .and(&m_next)
                .and(&v_next)
                .map_collect(|&x, &m, &v| {
                    let m_hat = m / m_correction;
                    let v_hat = v / v_correction;
                    x - lr * m_hat / (v_hat.sqrt() + fuzz)
                });
            new_x.push(x_next);
            new_m.push(m_next);
            new_v.push(v_next);
        }

        Ok(AdamState {
            params: ParamTree::unflatten(&spec, new_x)?,
            m: ParamTree::unflatten(&spec, new_m)?,
            v: ParamTree::unflatten(&spec, new_v)?,
        })
    }

    fn get_params<'a>(&self, state: &'a Self::State) -> &'a ParamTree {
        &state.params
    }
}
