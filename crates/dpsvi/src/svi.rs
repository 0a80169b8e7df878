//! The DP-SVI update step.
//!
//! One update obtains per-example losses and gradients from the modeling
//! collaborator, clips every gradient to the configured threshold, sums the
//! clipped gradients, perturbs the sum with noise of standard deviation
//! `clip_threshold * sigma`, rescales by the batch size, and hands the result
//! to the optimizer. Optimizer state and PRNG key are threaded explicitly
//! through [`SviState`]; nothing is committed when a step fails.

use dpsvi_core::{clip_and_sum, perturb_sum, DpError, ParamTree, Result};
use dpsvi_optim::Optimizer;
use dpsvi_prng::PrngKey;

/// Per-example outputs of the modeling collaborator for one minibatch.
#[derive(Clone, Debug)]
pub struct PerExampleBatch {
    /// One scalar loss per example, in batch order.
    pub losses: Vec<f64>,
    /// One gradient tree per example, same order, each matching the
    /// parameter structure.
    pub grads: Vec<ParamTree>,
}

/// The modeling collaborator: given parameters and a minibatch, produce one
/// loss and one gradient tree per example.
///
/// All probabilistic-model evaluation and differentiation lives behind this
/// boundary. A gradient tree that does not match the parameter structure is
/// a fatal configuration error surfaced as
/// [`DpError::ShapeMismatch`](dpsvi_core::DpError::ShapeMismatch).
pub trait PerExampleLossGrad<B> {
    /// Evaluate the batch at the current parameters.
    fn per_example(&self, params: &ParamTree, batch: &B, key: PrngKey) -> Result<PerExampleBatch>;
}

impl<B, F> PerExampleLossGrad<B> for F
where
    F: Fn(&ParamTree, &B, PrngKey) -> Result<PerExampleBatch>,
{
    fn per_example(&self, params: &ParamTree, batch: &B, key: PrngKey) -> Result<PerExampleBatch> {
        self(params, batch, key)
    }
}

/// Threaded state of a DP-SVI run: optimizer state, PRNG key, step counter.
///
/// Concurrent updates sharing one state are not supported; the caller passes
/// the state from each call to the next.
#[derive(Clone, Debug)]
pub struct SviState<S> {
    optim_state: S,
    rng_key: PrngKey,
    step: u64,
}

impl<S> SviState<S> {
    /// The optimizer's opaque state.
    pub fn optim_state(&self) -> &S {
        &self.optim_state
    }

    /// The threaded PRNG key.
    pub fn rng_key(&self) -> PrngKey {
        self.rng_key
    }

    /// Number of completed update steps.
    pub fn step(&self) -> u64 {
        self.step
    }
}

/// Differentially private SVI driver.
#[derive(Clone, Debug)]
pub struct DpSvi<M, O> {
    model: M,
    optimizer: O,
    clip_threshold: f64,
    dp_scale: f64,
}

impl<M, O> DpSvi<M, O> {
    /// Configure a DP-SVI run.
    ///
    /// `clip_threshold` bounds each per-example gradient's L2 norm; `sigma`
    /// is the calibrated noise multiplier. The injected noise has standard
    /// deviation `clip_threshold * sigma` before batch-size normalization.
    pub fn new(model: M, optimizer: O, clip_threshold: f64, sigma: f64) -> Result<Self> {
        if !clip_threshold.is_finite() || clip_threshold <= 0.0 {
            return Err(DpError::invalid("clip_threshold must be finite and positive"));
        }
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(DpError::invalid("sigma must be finite and non-negative"));
        }
        Ok(Self {
            model,
            optimizer,
            clip_threshold,
            dp_scale: clip_threshold * sigma,
        })
    }

    /// Effective noise standard deviation before batch-size normalization.
    pub fn dp_scale(&self) -> f64 {
        self.dp_scale
    }
}

impl<M, O: Optimizer> DpSvi<M, O> {
    /// Initialize the threaded state from starting parameters and a seed key.
    pub fn init(&self, params: ParamTree, key: PrngKey) -> SviState<O::State> {
        SviState {
            optim_state: self.optimizer.init(params),
            rng_key: key,
            step: 0,
        }
    }

    /// Current parameters held by the optimizer state.
    pub fn get_params<'a>(&self, state: &'a SviState<O::State>) -> &'a ParamTree {
        self.optimizer.get_params(&state.optim_state)
    }
}

impl<M, O> DpSvi<M, O>
where
    O: Optimizer,
    O::State: Clone,
{
    /// Clip, aggregate and perturb per-example gradients.
    ///
    /// Returns the state with an advanced PRNG key (the optimizer state is
    /// untouched), the mean per-example loss, and the noised average
    /// gradient. The mean loss is a diagnostic, not a privatized quantity.
    pub fn combine_gradients(
        &self,
        state: &SviState<O::State>,
        px_grads: &[ParamTree],
        px_losses: &[f64],
    ) -> Result<(SviState<O::State>, f64, ParamTree)> {
        if px_grads.len() != px_losses.len() {
            return Err(DpError::invalid(format!(
                "{} gradients for {} losses",
                px_grads.len(),
                px_losses.len()
            )));
        }
        let batch_size = px_grads.len();

        let (noise_key, next_key) = state.rng_key.split2();
        let (summed, _norms) = clip_and_sum(px_grads, self.clip_threshold)?;
        let noised = perturb_sum(&summed, batch_size, self.dp_scale, noise_key)?;
        let loss = px_losses.iter().sum::<f64>() / batch_size as f64;

        Ok((
            SviState {
                optim_state: state.optim_state.clone(),
                rng_key: next_key,
                step: state.step,
            },
            loss,
            noised,
        ))
    }

    /// Run one DP-SVI step on a minibatch.
    ///
    /// Returns the new state and the mean per-example loss. On error the
    /// passed state is untouched, so the caller can abort or retry with a
    /// fixed configuration without holding corrupted optimizer state.
    pub fn update<B>(
        &self,
        state: &SviState<O::State>,
        batch: &B,
    ) -> Result<(SviState<O::State>, f64)>
    where
        M: PerExampleLossGrad<B>,
    {
        let (model_key, carry_key) = state.rng_key.split2();
        let params = self.optimizer.get_params(&state.optim_state);
        let px = self.model.per_example(params, batch, model_key)?;
        if px.grads.len() != px.losses.len() {
            return Err(DpError::invalid(
                "model returned differing numbers of losses and gradients",
            ));
        }

        let carried = SviState {
            optim_state: state.optim_state.clone(),
            rng_key: carry_key,
            step: state.step,
        };
        let (mut new_state, loss, grad) =
            self.combine_gradients(&carried, &px.grads, &px.losses)?;

        new_state.optim_state = self.optimizer.update(state.step, &grad, new_state.optim_state)?;
        new_state.step = state.step + 1;
        Ok((new_state, loss))
    }
}
