//! Moments accountant for the Poisson-subsampled Gaussian mechanism.
//!
//! This is the standard oracle instantiation consumed by the calibrator. It
//! composes the per-iteration Rényi divergence bound of the subsampled
//! Gaussian over `num_iter` iterations and converts to (epsilon, delta)-DP by
//! minimizing over an order grid. The grid length follows the calibration
//! convention `L = max(20, 2 * target_eps)` with density proportional to `L`;
//! the `precision` argument scales both, so evaluations at two precision
//! levels agree only where the conversion has converged.

use dpsvi_core::{DpError, Result};

use crate::oracle::{NeighboringRelation, PrivacyOracle};

// Order-grid density relative to the grid length.
const ORDERS_PER_UNIT_LOW: f64 = 2.0;
const ORDERS_PER_UNIT_HIGH: f64 = 4.0;
const MAX_ORDER_FACTOR: f64 = 8.0;

/// Accounting oracle for DP-SVI with Poisson subsampling and Gaussian noise.
#[derive(Clone, Debug)]
pub struct SubsampledGaussianOracle {
    relation: NeighboringRelation,
    delta: f64,
    q: f64,
    num_iter: u64,
    grid_len: f64,
}

impl SubsampledGaussianOracle {
    /// Create an oracle for the given relation and mechanism parameters.
    ///
    /// `target_eps` only sizes the evaluation grid; the oracle itself answers
    /// for any sigma.
    pub fn new(
        relation: NeighboringRelation,
        target_eps: f64,
        delta: f64,
        q: f64,
        num_iter: u64,
    ) -> Result<Self> {
        if !target_eps.is_finite() || target_eps <= 0.0 {
            return Err(DpError::invalid("target_eps must be finite and positive"));
        }
        if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
            return Err(DpError::invalid("delta must lie in (0, 1)"));
        }
        if !q.is_finite() || q <= 0.0 || q > 1.0 {
            return Err(DpError::invalid("subsampling ratio q must lie in (0, 1]"));
        }
        if num_iter == 0 {
            return Err(DpError::invalid("num_iter must be positive"));
        }
        Ok(Self {
            relation,
            delta,
            q,
            num_iter,
            grid_len: 20.0_f64.max(2.0 * target_eps),
        })
    }

    fn orders(&self, precision: f64) -> Vec<f64> {
        let len = self.grid_len * precision;
        let max_order = MAX_ORDER_FACTOR * len;
        let mut orders = linspace(1.01, 8.0, (ORDERS_PER_UNIT_LOW * len) as usize);
        orders.extend(linspace(8.5, max_order, (ORDERS_PER_UNIT_HIGH * len) as usize));
        orders
    }
}

impl PrivacyOracle for SubsampledGaussianOracle {
    fn epsilon(&self, sigma: f64, precision: f64) -> Result<f64> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(DpError::OracleDomain { sigma });
        }

        // Substitution neighbors change one example in place, doubling the
        // sensitivity relative to add/remove.
        let noise_mult = match self.relation {
            NeighboringRelation::AddRemove => sigma,
            NeighboringRelation::Substitute => sigma / 2.0,
        };

        let orders = self.orders(precision);
        let max_alpha = orders.iter().fold(0.0_f64, |m, &a| m.max(a)).ceil() as usize;
        let log_fact = log_factorials(max_alpha + 1);

        let log_delta_inv = (1.0 / self.delta).ln();
        let mut best = f64::INFINITY;
        for &alpha in &orders {
            let rdp = renyi_subsampled_gaussian(alpha, noise_mult, self.q, &log_fact);
            if !rdp.is_finite() {
                continue;
            }
            let eps = rdp * self.num_iter as f64 + log_delta_inv / (alpha - 1.0);
            if eps < best {
                best = eps;
            }
        }

        if !best.is_finite() {
            // Noise too small for any order on the grid; the caller should
            // retry with a larger sigma.
            return Err(DpError::OracleDomain { sigma });
        }
        Ok(best)
    }
}

/// Rényi divergence of one subsampled-Gaussian iteration at order `alpha`.
fn renyi_subsampled_gaussian(alpha: f64, sigma: f64, q: f64, log_fact: &[f64]) -> f64 {
    if !alpha.is_finite() || alpha <= 1.0 {
        return 0.0;
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return f64::INFINITY;
    }
    if q == 1.0 {
        return alpha / (2.0 * sigma * sigma);
    }

    if (alpha - alpha.round()).abs() < 1e-12 {
        let a = alpha.round() as usize;
        return log_moment(q, sigma, a, log_fact) / (alpha - 1.0);
    }

    // Linear interpolation between the neighboring integer orders.
    let lo = alpha.floor();
    let hi = lo + 1.0;
    let t = alpha - lo;
    let rdp_lo = renyi_subsampled_gaussian(lo, sigma, q, log_fact);
    let rdp_hi = renyi_subsampled_gaussian(hi, sigma, q, log_fact);
    rdp_lo * (1.0 - t) + rdp_hi * t
}

/// `log A_alpha` for integer alpha via the binomial expansion.
fn log_moment(q: f64, sigma: f64, alpha: usize, log_fact: &[f64]) -> f64 {
    debug_assert!(alpha < log_fact.len());
    let log_q = q.ln();
    let log_1mq = (1.0 - q).ln();
    let sigma_sq = sigma * sigma;

    let mut log_sum = f64::NEG_INFINITY;
    for j in 0..=alpha {
        let j_f = j as f64;
        let log_binom = log_fact[alpha] - log_fact[j] - log_fact[alpha - j];
        let log_prob = j_f * log_q + (alpha as f64 - j_f) * log_1mq;
        let log_gauss = j_f * (j_f - 1.0) / (2.0 * sigma_sq);
        log_sum = log_add_exp(log_sum, log_binom + log_prob + log_gauss);
    }
    log_sum
}

fn log_factorials(len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len.max(1)];
    for i in 1..out.len() {
        out[i] = out[i - 1] + (i as f64).ln();
    }
    out
}

/// Numerically stable `log(exp(a) + exp(b))`.
fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num as f64 - 1.0);
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}
