//! Noise-multiplier calibration against a target privacy epsilon.
//!
//! The search brackets the target epsilon between two sigma values and then
//! shrinks the bracket by fitting a log-linear model `sigma = a - b*ln(eps)`
//! through the endpoints. The fit matches the empirical shape of
//! subsampled-Gaussian accounting curves well, so the predicted sigma usually
//! lands close to the target; a midpoint probe keeps the neglected bound
//! moving when the fit repeatedly overshoots one side.

use dpsvi_core::{DpError, Result};

use crate::moments::SubsampledGaussianOracle;
use crate::oracle::{NeighboringRelation, PrivacyOracle};

// Two oracle evaluations must agree to this relative error before their
// sigma counts as a usable starting point.
const STABILITY_RTOL: f64 = 0.1;

/// Tuning knobs for the calibration search.
///
/// The growth factor and anti-stall threshold are empirically chosen; they
/// are fields rather than constants because there is no derivation that makes
/// them universal across oracle shapes.
#[derive(Clone, Debug)]
pub struct CalibrationConfig {
    /// Absolute tolerance on `|eps(sigma) - target_eps|`.
    pub tol: f64,
    /// Require the returned epsilon to be strictly below the target, even if
    /// that violates `tol`.
    pub force_smaller: bool,
    /// Hard cap on oracle evaluations; the only cancellation mechanism.
    pub max_evaluations: usize,
    /// Geometric factor for growing/shrinking sigma while bracketing.
    pub bracket_growth: f64,
    /// Consecutive same-bound updates tolerated before a midpoint probe.
    pub max_consecutive_updates: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            tol: 1e-4,
            force_smaller: false,
            max_evaluations: 10,
            bracket_growth: 4.0,
            max_consecutive_updates: 2,
        }
    }
}

/// Outcome of a calibration run.
#[derive(Clone, Copy, Debug)]
pub struct Calibration {
    /// Calibrated noise multiplier.
    pub sigma: f64,
    /// Epsilon achieved at that sigma.
    pub eps: f64,
    /// Oracle evaluations spent.
    pub evaluations: usize,
}

struct EvalBudget {
    used: usize,
    max: usize,
}

impl EvalBudget {
    fn exhausted(&self) -> bool {
        self.used >= self.max
    }

    fn charge(&mut self) {
        self.used += 1;
    }

    fn error(&self, detail: impl Into<String>) -> DpError {
        DpError::BudgetExhausted {
            evaluations: self.used,
            detail: detail.into(),
        }
    }
}

/// A sigma interval whose epsilons straddle the target.
#[derive(Clone, Copy, Debug)]
struct Bracket {
    sigma: [f64; 2],
    eps: [f64; 2],
}

impl Bracket {
    /// Both invariants must hold before every refinement step; a violation
    /// means the oracle is not monotone and the search would be meaningless.
    fn check(&self, target_eps: f64) -> Result<()> {
        if self.eps[0] < target_eps {
            return Err(DpError::invariant(format!(
                "lower-bound epsilon {:.6} fell below target {:.6}",
                self.eps[0], target_eps
            )));
        }
        if self.eps[1] > target_eps {
            return Err(DpError::invariant(format!(
                "upper-bound epsilon {:.6} rose above target {:.6}",
                self.eps[1], target_eps
            )));
        }
        Ok(())
    }

    /// Move whichever bound the new point straddles; returns which side moved
    /// (0 = lower, 1 = upper).
    fn update(&mut self, sigma: f64, eps: f64, target_eps: f64) -> Result<usize> {
        if eps > self.eps[0] || eps < self.eps[1] {
            return Err(DpError::invariant(format!(
                "epsilon {eps:.6} escaped the bracket {self:?}; oracle is not monotone"
            )));
        }
        if eps > target_eps {
            self.sigma[0] = sigma;
            self.eps[0] = eps;
            Ok(0)
        } else {
            self.sigma[1] = sigma;
            self.eps[1] = eps;
            Ok(1)
        }
    }

    fn describe(&self) -> String {
        format!(
            "sigma in [{:.6}, {:.6}], eps in [{:.6}, {:.6}]",
            self.sigma[0], self.sigma[1], self.eps[1], self.eps[0]
        )
    }
}

/// Calibrate a noise multiplier so that `oracle(sigma)` hits `target_eps`.
///
/// `q` is the subsampling ratio; it seeds the initial sigma guess. See
/// [`CalibrationConfig`] for the remaining knobs. Bracketing failure within
/// the evaluation budget is a hard error; running out of budget during
/// refinement returns the best estimate found (`tol` may then be violated,
/// `force_smaller` is still honored).
pub fn calibrate_sigma<O: PrivacyOracle>(
    oracle: &O,
    target_eps: f64,
    q: f64,
    config: &CalibrationConfig,
) -> Result<Calibration> {
    if !target_eps.is_finite() || target_eps <= 0.0 {
        return Err(DpError::invalid("target_eps must be finite and positive"));
    }
    if !q.is_finite() || q <= 0.0 {
        return Err(DpError::invalid("subsampling ratio q must be positive"));
    }
    if config.max_evaluations == 0 {
        return Err(DpError::invalid("max_evaluations must be positive"));
    }
    if !config.tol.is_finite() || config.tol <= 0.0 {
        return Err(DpError::invalid("tol must be finite and positive"));
    }
    if !config.bracket_growth.is_finite() || config.bracket_growth <= 1.0 {
        return Err(DpError::invalid("bracket_growth must exceed 1"));
    }

    let mut budget = EvalBudget {
        used: 0,
        max: config.max_evaluations,
    };

    // A sigma of 1 corresponds to q = 1%; scale the guess with q.
    let initial_sigma = q / 0.01;
    let mut bracket = bracket_target(
        oracle,
        target_eps,
        initial_sigma,
        config.bracket_growth,
        &mut budget,
    )?;

    // Start from the private side of the bracket.
    let mut sigma = bracket.sigma[1];
    let mut eps = bracket.eps[1];
    let mut consecutive = [0usize; 2];

    while (target_eps - eps).abs() > config.tol && !budget.exhausted() {
        bracket.check(target_eps)?;

        // Closed-form log-linear fit through the two endpoints.
        let b = (bracket.sigma[1] - bracket.sigma[0])
            / (bracket.eps[0].ln() - bracket.eps[1].ln());
        let a = 0.5
            * ((bracket.sigma[0] + b * bracket.eps[0].ln())
                + (bracket.sigma[1] + b * bracket.eps[1].ln()));
        let predicted = a - b * target_eps.ln();
        let slack = 1e-9 * (bracket.sigma[1] - bracket.sigma[0]).max(1.0);
        if !(bracket.sigma[0] - slack..=bracket.sigma[1] + slack).contains(&predicted) {
            return Err(DpError::invariant(format!(
                "predicted sigma {:.6} escaped the bracket ({})",
                predicted,
                bracket.describe()
            )));
        }
        let predicted = predicted.clamp(bracket.sigma[0], bracket.sigma[1]);

        budget.charge();
        eps = oracle.epsilon(predicted, 1.0)?;
        sigma = predicted;
        let side = bracket.update(sigma, eps, target_eps)?;
        consecutive[side] += 1;
        consecutive[1 - side] = 0;

        // The fit can keep landing on one side of the target when the
        // optimum hugs that bound; probing the midpoint guarantees the other
        // bound advances as well.
        if consecutive[side] > config.max_consecutive_updates && !budget.exhausted() {
            let midpoint = 0.5 * (bracket.sigma[0] + bracket.sigma[1]);
            budget.charge();
            eps = oracle.epsilon(midpoint, 1.0)?;
            sigma = midpoint;
            let side = bracket.update(sigma, eps, target_eps)?;
            consecutive[side] += 1;
            consecutive[1 - side] = 0;
        }
    }

    if config.force_smaller && eps > target_eps {
        // The upper sigma bound is the latest point below the target.
        sigma = bracket.sigma[1];
        eps = bracket.eps[1];
    }

    Ok(Calibration {
        sigma,
        eps,
        evaluations: budget.used,
    })
}

/// Find an initial sigma interval whose epsilons straddle the target.
fn bracket_target<O: PrivacyOracle>(
    oracle: &O,
    target_eps: f64,
    initial_sigma: f64,
    growth: f64,
    budget: &mut EvalBudget,
) -> Result<Bracket> {
    // First find a sigma the oracle evaluates stably: results at two
    // precision levels must agree within 10%. Domain errors and unstable
    // evaluations both escalate sigma by a decade.
    let mut sigma = initial_sigma;
    let (anchor_sigma, anchor_eps) = loop {
        if budget.exhausted() {
            return Err(budget.error("no numerically stable oracle evaluation found"));
        }
        budget.charge();
        let eps = match oracle.epsilon(sigma, 1.0) {
            Ok(eps) => eps,
            Err(DpError::OracleDomain { .. }) => {
                sigma *= 10.0;
                continue;
            }
            Err(err) => return Err(err),
        };
        budget.charge();
        match oracle.epsilon(sigma, 2.0) {
            Ok(refined) if (1.0 - eps / refined).abs() <= STABILITY_RTOL => break (sigma, eps),
            Ok(_) | Err(DpError::OracleDomain { .. }) => sigma *= 10.0,
            Err(err) => return Err(err),
        }
    };

    // Walk sigma geometrically until the target is crossed. Shrinking can
    // step out of the oracle's domain; retry from the midpoint back towards
    // the stable anchor.
    let mut sigma = anchor_sigma;
    let mut eps = anchor_eps;
    if eps >= target_eps {
        while eps >= target_eps {
            sigma *= growth;
            eps = eval_retrying_domain(oracle, &mut sigma, anchor_sigma, budget)?;
        }
        Ok(Bracket {
            sigma: [anchor_sigma, sigma],
            eps: [anchor_eps, eps],
        })
    } else {
        while eps < target_eps {
            sigma /= growth;
            eps = eval_retrying_domain(oracle, &mut sigma, anchor_sigma, budget)?;
        }
        Ok(Bracket {
            sigma: [sigma, anchor_sigma],
            eps: [eps, anchor_eps],
        })
    }
}

fn eval_retrying_domain<O: PrivacyOracle>(
    oracle: &O,
    sigma: &mut f64,
    anchor_sigma: f64,
    budget: &mut EvalBudget,
) -> Result<f64> {
    loop {
        if budget.exhausted() {
            return Err(budget.error(format!("bracketing stalled at sigma={:.6}", *sigma)));
        }
        budget.charge();
        match oracle.epsilon(*sigma, 1.0) {
            Ok(eps) => return Ok(eps),
            Err(DpError::OracleDomain { .. }) => *sigma = 0.5 * (*sigma + anchor_sigma),
            Err(err) => return Err(err),
        }
    }
}

/// Calibrate sigma under substitution-neighboring accounting.
///
/// `delta`, `q` and `num_iter` parameterize the subsampled-Gaussian oracle;
/// the evaluation grid is sized from `target_eps`.
pub fn approximate_sigma(
    target_eps: f64,
    delta: f64,
    q: f64,
    num_iter: u64,
    config: &CalibrationConfig,
) -> Result<Calibration> {
    let oracle = SubsampledGaussianOracle::new(
        NeighboringRelation::Substitute,
        target_eps,
        delta,
        q,
        num_iter,
    )?;
    calibrate_sigma(&oracle, target_eps, q, config)
}

/// Calibrate sigma under add/remove-neighboring accounting.
pub fn approximate_sigma_add_remove(
    target_eps: f64,
    delta: f64,
    q: f64,
    num_iter: u64,
    config: &CalibrationConfig,
) -> Result<Calibration> {
    let oracle = SubsampledGaussianOracle::new(
        NeighboringRelation::AddRemove,
        target_eps,
        delta,
        q,
        num_iter,
    )?;
    calibrate_sigma(&oracle, target_eps, q, config)
}
