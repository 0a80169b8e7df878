//! Tensor types and low-level numeric operations.

use ndarray::ArrayD;

/// Scalar type (f64 by default, f32 with feature flag).
#[cfg(not(feature = "f32"))]
pub type Scalar = f64;

/// Scalar type (f64 by default, f32 with feature flag).
#[cfg(feature = "f32")]
pub type Scalar = f32;

/// Dynamic-dimensional tensor.
pub type Tensor = ArrayD<Scalar>;

/// Compute the L2 norm of a tensor, propagating NaN/inf.
pub fn l2_norm(t: &Tensor) -> f64 {
    let mut sum_sq: f64 = 0.0;
    for &v in t.iter() {
        let v = v as f64;
        if v.is_nan() {
            return f64::NAN;
        }
        if !v.is_finite() {
            return f64::INFINITY;
        }
        sum_sq += v * v;
    }
    sum_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn l2_norm_of_pythagorean_pair() {
        let t = array![3.0, 4.0].into_dyn();
        assert!((l2_norm(&t) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn l2_norm_of_empty_tensor_is_zero() {
        let t = Tensor::zeros(ndarray::IxDyn(&[0]));
        assert_eq!(l2_norm(&t), 0.0);
    }

    #[test]
    fn l2_norm_propagates_nan() {
        let t = array![1.0, f64::NAN].into_dyn();
        assert!(l2_norm(&t).is_nan());
    }
}
