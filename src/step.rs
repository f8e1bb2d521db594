//! Adaptive step size for the descent update.
//!
//! With the residual `f` and the Jacobian `J` evaluated at the current point,
//!
//! ```text
//! A0   = J · Jᵗ · f
//! step = (fᵗ · A0) / (A0ᵗ · A0)
//! ```
//!
//! The solver then moves to `x - step · J · f`.

use nalgebra::{DMatrix, DVector};

use crate::errors::StepError;

/// Computes the adaptive step length.
///
/// # Errors
/// - [`StepError::DimensionMismatch`] if `j` is not square with one row per residual
/// - [`StepError::NonFinite`] if `fᵗ·A0`, `A0ᵗ·A0` or their quotient is NaN or infinite
/// - [`StepError::Degenerate`] if `A0ᵗ·A0` is exactly zero
pub fn step_size(f: &DVector<f64>, j: &DMatrix<f64>) -> Result<f64, StepError> {
    if j.nrows() != f.len() || j.ncols() != f.len() {
        return Err(StepError::DimensionMismatch {
            residual: f.len(),
            rows: j.nrows(),
            cols: j.ncols(),
        });
    }

    let a0 = (j * j.transpose()) * f;
    let numerator = f.dot(&a0);
    let denominator = a0.dot(&a0);

    let non_finite = StepError::NonFinite {
        numerator,
        denominator,
    };
    if !(numerator.is_finite() && denominator.is_finite()) {
        return Err(non_finite);
    }
    if denominator == 0.0 {
        return Err(StepError::Degenerate);
    }

    let step = numerator / denominator;
    if !step.is_finite() {
        return Err(non_finite);
    }
    Ok(step)
}

/// Applies one update: `x - step · J · f`.
pub fn descend(x: &DVector<f64>, step: f64, f: &DVector<f64>, j: &DMatrix<f64>) -> DVector<f64> {
    x - (j * f) * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_jacobian_gives_unit_step() {
        let f = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let j = DMatrix::identity(3, 3);
        assert_relative_eq!(step_size(&f, &j).unwrap(), 1.0);
    }

    #[test]
    fn test_scaled_jacobian() {
        // J = 2I: A0 = 4f, step = 4|f|² / 16|f|² = 1/4
        let f = DVector::from_vec(vec![3.0, 4.0]);
        let j = DMatrix::identity(2, 2) * 2.0;
        assert_relative_eq!(step_size(&f, &j).unwrap(), 0.25);

        let next = descend(&DVector::zeros(2), 0.25, &f, &j);
        assert_relative_eq!(next, DVector::from_vec(vec![-1.5, -2.0]));
    }

    #[test]
    fn test_general_case_matches_formula() {
        let f = DVector::from_vec(vec![-0.1, -0.2, -0.3]);
        let j = DMatrix::from_row_slice(3, 3, &[3.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, -1.0]);
        // J·Jᵗ = diag(9, 4, 1), A0 = (-0.9, -0.8, -0.3)
        let expected = (0.09 + 0.16 + 0.09) / (0.81 + 0.64 + 0.09);
        assert_relative_eq!(step_size(&f, &j).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_step() {
        let zero_j = DMatrix::zeros(3, 3);
        let f = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(step_size(&f, &zero_j), Err(StepError::Degenerate));

        let zero_f = DVector::zeros(3);
        assert_eq!(
            step_size(&zero_f, &DMatrix::identity(3, 3)),
            Err(StepError::Degenerate)
        );
    }

    #[test]
    fn test_non_finite_step() {
        // A0 = 1e180 and fᵗ·A0 = 1e240 fit, A0ᵗ·A0 = 1e360 does not
        let f = DVector::from_vec(vec![1e60]);
        let j = DMatrix::from_element(1, 1, 1e60);
        assert!(matches!(
            step_size(&f, &j),
            Err(StepError::NonFinite { numerator, denominator })
                if numerator.is_finite() && denominator == f64::INFINITY
        ));

        let f = DVector::from_vec(vec![f64::NAN, 1.0]);
        assert!(matches!(
            step_size(&f, &DMatrix::identity(2, 2)),
            Err(StepError::NonFinite { .. })
        ));

        // still finite just below the overflow
        let f = DVector::from_vec(vec![1e50]);
        let j = DMatrix::from_element(1, 1, 1e50);
        assert_relative_eq!(step_size(&f, &j).unwrap(), 1e-100, max_relative = 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let f = DVector::from_vec(vec![1.0, 2.0]);
        assert_eq!(
            step_size(&f, &DMatrix::identity(3, 3)),
            Err(StepError::DimensionMismatch {
                residual: 2,
                rows: 3,
                cols: 3
            })
        );
    }
}
