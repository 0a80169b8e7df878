//! Calibrated Gaussian noise injection.

use dpsvi_prng::PrngKey;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{DpError, Result};
use crate::tensor::{Scalar, Tensor};
use crate::tree::ParamTree;

/// Add i.i.d. zero-mean Gaussian noise with standard deviation `sigma` to a
/// tensor in-place.
pub fn add_gaussian_noise<R: Rng>(tensor: &mut Tensor, sigma: f64, rng: &mut R) {
    if !sigma.is_finite() || sigma <= 0.0 || tensor.is_empty() {
        return;
    }

    let dist = match Normal::new(0.0, sigma) {
        Ok(d) => d,
        Err(_) => return,
    };

    tensor.mapv_inplace(|x| x + (dist.sample(rng) as Scalar));
}

/// Perturb a summed, clipped gradient tree and rescale it to a batch mean.
///
/// Every scalar element receives one independent draw from
/// `N(0, dp_scale^2)`; the whole tree is then divided by `batch_size`, so the
/// effective per-element noise on the averaged gradient has standard
/// deviation `dp_scale / batch_size`.
///
/// `key` must be a fresh subkey: the caller splits its threaded key and keeps
/// the sibling, so successive calls never repeat a draw. Each leaf derives
/// its own stream by folding in the leaf index, making noise independent
/// across sites.
pub fn perturb_sum(
    summed: &ParamTree,
    batch_size: usize,
    dp_scale: f64,
    key: PrngKey,
) -> Result<ParamTree> {
    if batch_size == 0 {
        return Err(DpError::invalid("batch_size must be positive"));
    }
    if !dp_scale.is_finite() || dp_scale < 0.0 {
        return Err(DpError::invalid("dp_scale must be finite and non-negative"));
    }

    let (leaves, spec) = summed.flatten();
    let scale = 1.0 / batch_size as f64;
    let noised = leaves
        .into_iter()
        .enumerate()
        .map(|(site, mut leaf)| {
            let mut rng = key.fold_in(site as u64).to_rng();
            add_gaussian_noise(&mut leaf, dp_scale, &mut rng);
            leaf.mapv_inplace(|x| x * (scale as Scalar));
            leaf
        })
        .collect();
    ParamTree::unflatten(&spec, noised)
}
