//! Per-example gradient clipping for bounded sensitivity.

use crate::error::{DpError, Result};
use crate::tree::ParamTree;

/// Clip a gradient tree to a maximum global L2 norm.
///
/// Returns the clipped tree and the pre-clip norm. The norm is taken over all
/// leaves combined; if it does not exceed `threshold` (including the
/// zero-gradient case) the tree is returned unchanged.
pub fn clip_tree(tree: &ParamTree, threshold: f64) -> (ParamTree, f64) {
    let norm = tree.global_l2_norm();
    if norm.is_finite() && norm > threshold {
        (tree.scale(threshold / norm), norm)
    } else {
        (tree.clone(), norm)
    }
}

/// Clip every per-example gradient independently and sum across the batch.
///
/// Returns the summed tree plus each example's pre-clip norm. All examples
/// must share one structure; a mismatch is a fatal configuration error.
pub fn clip_and_sum(examples: &[ParamTree], threshold: f64) -> Result<(ParamTree, Vec<f64>)> {
    let first = examples
        .first()
        .ok_or_else(|| DpError::invalid("per-example gradient batch is empty"))?;

    let mut norms = Vec::with_capacity(examples.len());
    let mut summed = first.zeros_like();
    for example in examples {
        let (clipped, norm) = clip_tree(example, threshold);
        norms.push(norm);
        summed = summed.try_zip_with(&clipped, |acc, g| acc + g)?;
    }
    Ok((summed, norms))
}
