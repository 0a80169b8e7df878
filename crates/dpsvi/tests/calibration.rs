//! End-to-end sigma calibration against the bundled accounting oracle.

use dpsvi::prelude::*;

fn config() -> CalibrationConfig {
    CalibrationConfig {
        tol: 1e-2,
        max_evaluations: 100,
        ..CalibrationConfig::default()
    }
}

#[test]
fn substitution_calibration_hits_the_target() {
    let result = approximate_sigma(2.0, 1e-5, 0.01, 1000, &config()).unwrap();
    assert!(result.sigma.is_finite() && result.sigma > 0.0);
    assert!((result.eps - 2.0).abs() <= 1e-2, "eps {}", result.eps);
    assert!(result.evaluations <= 101);
}

#[test]
fn add_remove_calibration_hits_the_target() {
    let result = approximate_sigma_add_remove(2.0, 1e-5, 0.01, 1000, &config()).unwrap();
    assert!((result.eps - 2.0).abs() <= 1e-2, "eps {}", result.eps);
}

#[test]
fn substitution_needs_more_noise_than_add_remove() {
    let sub = approximate_sigma(2.0, 1e-5, 0.01, 1000, &config()).unwrap();
    let ar = approximate_sigma_add_remove(2.0, 1e-5, 0.01, 1000, &config()).unwrap();
    assert!(sub.sigma > ar.sigma);
}

#[test]
fn force_smaller_stays_strictly_below_the_target() {
    let config = CalibrationConfig {
        force_smaller: true,
        ..config()
    };
    let result = approximate_sigma(2.0, 1e-5, 0.01, 1000, &config).unwrap();
    assert!(result.eps < 2.0);
}

#[test]
fn starved_budget_surfaces_as_budget_exhaustion() {
    let config = CalibrationConfig {
        max_evaluations: 1,
        ..CalibrationConfig::default()
    };
    let err = approximate_sigma(2.0, 1e-5, 0.01, 1000, &config).unwrap_err();
    assert!(matches!(err, DpError::BudgetExhausted { .. }));
}

#[test]
fn bundled_oracle_is_monotone_in_sigma() {
    for relation in [NeighboringRelation::AddRemove, NeighboringRelation::Substitute] {
        let oracle = SubsampledGaussianOracle::new(relation, 2.0, 1e-5, 0.01, 1000).unwrap();
        let mut prev = f64::INFINITY;
        for sigma in [0.6, 1.0, 1.7, 3.0, 5.0, 9.0] {
            let eps = oracle.epsilon(sigma, 1.0).unwrap();
            assert!(eps < prev, "relation {relation:?}: eps({sigma}) = {eps} >= {prev}");
            prev = eps;
        }
    }
}
