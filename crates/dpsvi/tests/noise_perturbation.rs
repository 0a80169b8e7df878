//! Noise-injection behavior of the DP-SVI gradient combination step.

use dpsvi::prelude::*;
use dpsvi::Tensor;
use ndarray::IxDyn;

const BATCH_SIZE: usize = 10;
const DIM: usize = 1000;

fn zero_sites() -> ParamTree {
    ParamTree::from_entries([
        ("site0", ParamTree::leaf(Tensor::zeros(IxDyn(&[DIM])))),
        ("site1", ParamTree::leaf(Tensor::zeros(IxDyn(&[DIM])))),
    ])
}

fn per_example_grads() -> Vec<ParamTree> {
    (0..BATCH_SIZE).map(|_| zero_sites()).collect()
}

fn per_example_losses() -> Vec<f64> {
    (0..BATCH_SIZE).map(|i| i as f64).collect()
}

fn unused_model(
    _params: &ParamTree,
    _batch: &(),
    _key: PrngKey,
) -> Result<PerExampleBatch> {
    Err(DpError::invalid("model must not be called by these tests"))
}

fn svi() -> DpSvi<
    fn(&ParamTree, &(), PrngKey) -> Result<PerExampleBatch>,
    Sgd,
> {
    // clip 1.0, sigma 1.0 => dp_scale 1.0
    let model = unused_model as fn(&ParamTree, &(), PrngKey) -> Result<PerExampleBatch>;
    DpSvi::new(model, Sgd::new(1.0), 1.0, 1.0).unwrap()
}

fn site_stats(t: &Tensor) -> (f64, f64) {
    let n = t.len() as f64;
    let mean: f64 = t.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var: f64 = t.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[test]
fn perturbation_has_calibrated_statistics() {
    let svi = svi();
    let state = svi.init(zero_sites(), PrngKey::new(9_782_346));

    let (new_state, loss, grads) = svi
        .combine_gradients(&state, &per_example_grads(), &per_example_losses())
        .unwrap();

    // Optimizer state untouched, PRNG key advanced.
    assert_eq!(svi.get_params(&new_state), svi.get_params(&state));
    assert_ne!(new_state.rng_key(), state.rng_key());

    // Mean of 0..10.
    assert_eq!(loss, 4.5);

    // Structure preserved.
    assert_eq!(grads.spec(), zero_sites().spec());

    // Per-site noise: mean ~ 0, std ~ dp_scale / batch_size.
    for site in ["site0", "site1"] {
        let (mean, std) = site_stats(grads.tensor_at(site).unwrap());
        assert!(mean.abs() < 1e-2, "{site} mean {mean}");
        assert!((std - 0.1).abs() < 1e-2, "{site} std {std}");
    }
}

#[test]
fn perturbation_is_not_deterministic_over_calls() {
    let svi = svi();
    let state = svi.init(zero_sites(), PrngKey::new(9_782_346));

    let (next, _, first) = svi
        .combine_gradients(&state, &per_example_grads(), &per_example_losses())
        .unwrap();
    let (_, _, second) = svi
        .combine_gradients(&next, &per_example_grads(), &per_example_losses())
        .unwrap();

    for site in ["site0", "site1"] {
        assert_ne!(
            first.tensor_at(site).unwrap(),
            second.tensor_at(site).unwrap(),
            "noise repeated at {site}"
        );
    }
}

#[test]
fn perturbation_is_not_deterministic_over_sites() {
    let svi = svi();
    let state = svi.init(zero_sites(), PrngKey::new(9_782_346));

    let (_, _, grads) = svi
        .combine_gradients(&state, &per_example_grads(), &per_example_losses())
        .unwrap();

    assert_ne!(
        grads.tensor_at("site0").unwrap(),
        grads.tensor_at("site1").unwrap()
    );
}

#[test]
fn mismatched_losses_and_gradients_are_rejected() {
    let svi = svi();
    let state = svi.init(zero_sites(), PrngKey::new(0));
    let err = svi
        .combine_gradients(&state, &per_example_grads(), &[1.0, 2.0])
        .unwrap_err();
    assert!(matches!(err, DpError::InvalidParameters { .. }));
}
