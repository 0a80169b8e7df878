use dpsvi::prelude::*;
use ndarray::array;

fn mean_model(params: &ParamTree, batch: &Vec<f64>, _key: PrngKey) -> Result<PerExampleBatch> {
    let theta = params
        .tensor_at("theta")
        .ok_or_else(|| DpError::shape_mismatch("missing theta"))?[[0]];
    let losses = batch.iter().map(|t| 0.5 * (theta - t).powi(2)).collect();
    let grads = batch
        .iter()
        .map(|t| ParamTree::from_entries([("theta", ParamTree::leaf(array![theta - t].into_dyn()))]))
        .collect();
    Ok(PerExampleBatch { losses, grads })
}

fn main() {
    let target_eps = 4.0;
    let delta = 1e-5;
    let q = 0.01;
    let num_iter = 200;

    let config = CalibrationConfig {
        tol: 1e-2,
        max_evaluations: 100,
        ..CalibrationConfig::default()
    };
    let calibration =
        approximate_sigma(target_eps, delta, q, num_iter, &config).expect("calibrated sigma");
    println!(
        "sigma {:.4} gives eps {:.4} after {} oracle evaluations",
        calibration.sigma, calibration.eps, calibration.evaluations
    );

    let batch = vec![1.0, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 3.5];
    let svi = DpSvi::new(mean_model, AdaDp::new(0.1), 4.0, calibration.sigma)
        .expect("valid DP-SVI configuration");
    let mut state = svi.init(
        ParamTree::from_entries([("theta", ParamTree::leaf(array![0.0].into_dyn()))]),
        PrngKey::new(0),
    );

    for epoch in 0..num_iter {
        let (next, loss) = svi.update(&state, &batch).expect("update step");
        state = next;
        if epoch % 50 == 0 {
            println!("step {epoch:3}: loss {loss:.4}");
        }
    }

    let theta = svi.get_params(&state).tensor_at("theta").expect("theta")[[0]];
    println!("estimated mean: {theta:.4}");
}
