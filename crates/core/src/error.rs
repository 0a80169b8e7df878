//! Error types shared across the DP-SVI crates.

/// Errors that can occur during calibration or a DP update step.
#[derive(Debug, thiserror::Error)]
pub enum DpError {
    /// The privacy oracle rejected a sigma value.
    ///
    /// Recoverable during bracketing (the calibrator escalates sigma); fatal
    /// anywhere else.
    #[error("privacy oracle rejected sigma={sigma:.6}")]
    OracleDomain {
        /// The rejected noise multiplier.
        sigma: f64,
    },

    /// The oracle evaluation budget was consumed before bracketing finished.
    #[error("evaluation budget exhausted after {evaluations} oracle calls ({detail})")]
    BudgetExhausted {
        /// Number of oracle evaluations spent.
        evaluations: usize,
        /// Best bracket found so far, for diagnosing whether a larger budget
        /// would help.
        detail: String,
    },

    /// A calibration bracket invariant was broken.
    ///
    /// Implies a non-monotonic oracle or a defect; calibration aborts rather
    /// than return a misleading sigma.
    #[error("calibration invariant violated: {detail}")]
    InvariantViolation {
        /// Human-readable description of the broken invariant.
        detail: String,
    },

    /// Per-example gradients do not match the parameter structure.
    #[error("gradient/parameter structure mismatch: {detail}")]
    ShapeMismatch {
        /// Human-readable description of the mismatch.
        detail: String,
    },

    /// Invalid parameter provided.
    #[error("invalid parameter: {msg}")]
    InvalidParameters {
        /// Human-readable error description.
        msg: String,
    },
}

/// Result type for DP-SVI operations.
pub type Result<T> = std::result::Result<T, DpError>;

impl DpError {
    /// Create an invalid parameter error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters { msg: msg.into() }
    }

    /// Create a structure mismatch error.
    pub fn shape_mismatch<S: Into<String>>(detail: S) -> Self {
        Self::ShapeMismatch {
            detail: detail.into(),
        }
    }

    /// Create an invariant violation error.
    pub fn invariant<S: Into<String>>(detail: S) -> Self {
        Self::InvariantViolation {
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_evaluation_count() {
        let err = DpError::BudgetExhausted {
            evaluations: 10,
            detail: "no stable bracket".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("no stable bracket"));
    }
}
