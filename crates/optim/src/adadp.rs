//! ADADP: learning-rate adaptation from step-size discretization error.
//!
//! Koskela and Honkela, "Learning Rate Adaptation for Federated and
//! Differentially Private Learning" (arXiv:1809.03832).
//!
//! Each pair of update calls forms one logical iteration: the even call takes
//! a half step and records the corresponding full step, the odd call takes
//! the second half step and compares where two half steps and one full step
//! landed. The relative discrepancy drives a bounded multiplicative
//! adjustment of the learning rate, and optionally rejects the whole pair
//! when the discrepancy exceeds the tolerance.

use dpsvi_core::{DpError, ParamTree, Result, Scalar};

use crate::Optimizer;

/// The ADADP adaptive learning-rate optimizer.
#[derive(Clone, Copy, Debug)]
pub struct AdaDp {
    /// Initial step size.
    pub step_size: f64,
    /// Error tolerance for the discretized gradient steps.
    pub tol: f64,
    /// Reject parameter updates whose error exceeds `tol`.
    pub stability_check: bool,
    /// Lower multiplicative bound on the per-iteration rate update.
    pub alpha_min: f64,
    /// Upper multiplicative bound on the per-iteration rate update.
    pub alpha_max: f64,
}

impl AdaDp {
    /// Create an ADADP optimizer with the reference hyperparameters.
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            tol: 1.0,
            stability_check: true,
            alpha_min: 0.9,
            alpha_max: 1.1,
        }
    }
}

impl Default for AdaDp {
    fn default() -> Self {
        Self::new(1e-3)
    }
}

/// ADADP state across the two-call iteration.
#[derive(Clone, Debug)]
pub struct AdaDpState {
    params: ParamTree,
    lr: f64,
    /// Full-step landing point recorded on the even call.
    stepped: ParamTree,
    /// Parameters before the even call, for rejection.
    prev: ParamTree,
}

impl AdaDpState {
    /// Current learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.lr
    }
}

fn descend(params: &ParamTree, grad: &ParamTree, step_size: f64) -> Result<ParamTree> {
    let lr = step_size as Scalar;
    params.try_zip_with(grad, |x, g| {
        ndarray::Zip::from(x).and(g).map_collect(|&x, &g| x - lr * g)
    })
}

/// Relative discrepancy between the full-step and twice-half-step results.
fn discretization_error(full: &ParamTree, halved: &ParamTree) -> Result<f64> {
    if full.spec() != halved.spec() {
        return Err(DpError::shape_mismatch(
            "half-step tree diverged from the recorded full step",
        ));
    }
    let mut sum_sq = 0.0_f64;
    for (f_leaf, h_leaf) in full.leaves().into_iter().zip(halved.leaves()) {
        for (&f, &h) in f_leaf.iter().zip(h_leaf.iter()) {
            let f = f as f64;
            let h = h as f64;
            let rel = (f - h) / f.max(1.0);
            sum_sq += rel * rel;
        }
    }
    Ok(sum_sq.sqrt())
}

impl Optimizer for AdaDp {
    type State = AdaDpState;

    fn init(&self, params: ParamTree) -> Self::State {
        AdaDpState {
            stepped: params.zeros_like(),
            prev: params.clone(),
            params,
            lr: self.step_size,
        }
    }

    fn update(&self, step: u64, grad: &ParamTree, state: Self::State) -> Result<Self::State> {
        let half = descend(&state.params, grad, 0.5 * state.lr)?;

        if step % 2 == 0 {
            let stepped = descend(&state.params, grad, state.lr)?;
            Ok(AdaDpState {
                prev: state.params,
                params: half,
                lr: state.lr,
                stepped,
            })
        } else {
            let err = discretization_error(&state.stepped, &half)?;
            let factor = (self.tol / err)
                .sqrt()
                .max(self.alpha_min)
                .min(self.alpha_max);
            let params = if self.stability_check && err > self.tol {
                state.prev.clone()
            } else {
                half
            };
            Ok(AdaDpState {
                params,
                lr: state.lr * factor,
                stepped: state.stepped,
                prev: state.prev,
            })
        }
    }

    fn get_params<'a>(&self, state: &'a Self::State) -> &'a ParamTree {
        &state.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn leaf(vals: &[f64]) -> ParamTree {
        ParamTree::leaf(ndarray::Array1::from_vec(vals.to_vec()).into_dyn())
    }

    #[test]
    fn even_step_takes_half_step_and_records_full_step() {
        let opt = AdaDp::new(0.1);
        let state = opt.init(leaf(&[1.0]));
        let state = opt.update(0, &leaf(&[1.0]), state).unwrap();
        assert_eq!(*opt.get_params(&state), leaf(&[0.95]));
        assert_eq!(state.stepped, leaf(&[0.9]));
        assert_eq!(state.prev, leaf(&[1.0]));
        assert_eq!(state.learning_rate(), 0.1);
    }

    #[test]
    fn tiny_error_grows_rate_by_alpha_max() {
        let opt = AdaDp::new(0.1);
        let state = opt.init(leaf(&[1.0]));
        let state = opt.update(0, &leaf(&[0.0]), state).unwrap();
        // Zero gradient: full step and both half steps coincide, error is 0.
        let state = opt.update(1, &leaf(&[0.0]), state).unwrap();
        assert!((state.learning_rate() - 0.1 * 1.1).abs() < 1e-12);
        assert_eq!(*opt.get_params(&state), leaf(&[1.0]));
    }

    #[test]
    fn huge_error_shrinks_rate_by_no_more_than_alpha_min() {
        let opt = AdaDp {
            stability_check: false,
            ..AdaDp::new(0.5)
        };
        let state = opt.init(leaf(&[1.0]));
        // A gradient that changes wildly between the two half steps makes the
        // discrepancy enormous; the adjustment still bottoms out at alpha_min.
        let state = opt.update(0, &leaf(&[0.0]), state).unwrap();
        let state = opt.update(1, &leaf(&[1e6]), state).unwrap();
        assert!((state.learning_rate() - 0.5 * 0.9).abs() < 1e-12);
    }

    #[test]
    fn multiplier_stays_clamped_for_arbitrary_gradients() {
        for g in [0.0, 1e-8, 0.3, 7.0, 1e4] {
            let opt = AdaDp {
                stability_check: false,
                ..AdaDp::new(0.05)
            };
            let state = opt.init(leaf(&[0.5, -2.0]));
            let state = opt.update(0, &leaf(&[0.0, 0.0]), state).unwrap();
            let state = opt.update(1, &leaf(&[g, -g]), state).unwrap();
            let ratio = state.learning_rate() / 0.05;
            assert!((0.9..=1.1).contains(&ratio), "ratio {ratio} escaped clamp");
        }
    }

    #[test]
    fn unstable_pair_is_rejected_but_rate_still_adapts() {
        let opt = AdaDp::new(0.5);
        let state = opt.init(leaf(&[1.0]));
        let state = opt.update(0, &leaf(&[0.2]), state).unwrap();
        let state = opt.update(1, &leaf(&[1e6]), state).unwrap();
        // Rejected: back to the parameters before the even call.
        assert_eq!(*opt.get_params(&state), leaf(&[1.0]));
        assert!((state.learning_rate() - 0.5 * 0.9).abs() < 1e-12);
    }

    #[test]
    fn stable_pair_keeps_the_second_half_step() {
        let opt = AdaDp::new(0.1);
        let state = opt.init(leaf(&[1.0]));
        let state = opt.update(0, &leaf(&[0.1]), state).unwrap();
        let before_second = opt.get_params(&state).clone();
        let state = opt.update(1, &leaf(&[0.1]), state).unwrap();
        // Second half step applied on top of the first.
        let expected = descend(&before_second, &leaf(&[0.1]), 0.5 * 0.1).unwrap();
        assert_eq!(*opt.get_params(&state), expected);
    }
}
