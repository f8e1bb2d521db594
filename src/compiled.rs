//! Native evaluation of an equation system and its Jacobian.

use nalgebra::{DMatrix, DVector};

use crate::builder::build_combined_function;
use crate::errors::{BuilderError, ExprError};
use crate::expr::Expr;
use crate::matrix::SymbolicMatrix;
use crate::system::EquationSystem;
use crate::types::CombinedJITFunction;

/// An equation system with its residuals and Jacobian compiled to machine code.
///
/// Both functions are compiled once; evaluation afterwards performs no
/// allocation beyond the returned vector or matrix.
#[derive(Clone)]
pub struct CompiledSystem {
    dimension: usize,
    residuals: CombinedJITFunction,
    jacobian: CombinedJITFunction,
    /// Source expressions, residuals then Jacobian entries in row-major order
    exprs: Vec<Expr>,
}

impl CompiledSystem {
    /// Compiles `system` together with its symbolic Jacobian.
    ///
    /// # Errors
    /// Returns a [`BuilderError`] if either function fails to compile.
    pub fn new(system: &EquationSystem, jacobian: &SymbolicMatrix) -> Result<Self, BuilderError> {
        let layout = system.variable_map();
        let residuals = build_combined_function(system.equations(), layout)?;
        let jacobian_fn = build_combined_function(jacobian.entries(), layout)?;

        let exprs = system
            .equations()
            .iter()
            .chain(jacobian.entries())
            .cloned()
            .collect();

        Ok(Self {
            dimension: system.dimension(),
            residuals,
            jacobian: jacobian_fn,
            exprs,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Evaluates every equation at `point`.
    ///
    /// # Errors
    /// - [`ExprError::DimensionMismatch`] if `point` has the wrong length
    /// - [`ExprError::Undefined`] if an equation is not finite at `point`
    pub fn residuals(&self, point: &DVector<f64>) -> Result<DVector<f64>, ExprError> {
        self.check_point(point)?;
        let mut out = DVector::zeros(self.dimension);
        (self.residuals)(point.as_slice(), out.as_mut_slice());
        self.check_finite(out.as_slice(), 0)?;
        Ok(out)
    }

    /// Evaluates the Jacobian at `point`.
    ///
    /// # Errors
    /// - [`ExprError::DimensionMismatch`] if `point` has the wrong length
    /// - [`ExprError::Undefined`] if a partial derivative is not finite at `point`
    pub fn jacobian(&self, point: &DVector<f64>) -> Result<DMatrix<f64>, ExprError> {
        self.check_point(point)?;
        let n = self.dimension;
        let mut row_major = vec![0.0; n * n];
        (self.jacobian)(point.as_slice(), &mut row_major);
        self.check_finite(&row_major, n)?;
        Ok(DMatrix::from_row_slice(n, n, &row_major))
    }

    fn check_point(&self, point: &DVector<f64>) -> Result<(), ExprError> {
        if point.len() != self.dimension {
            return Err(ExprError::DimensionMismatch {
                expected: self.dimension,
                got: point.len(),
            });
        }
        Ok(())
    }

    /// `offset` is the index of `values[0]` in `self.exprs`.
    fn check_finite(&self, values: &[f64], offset: usize) -> Result<(), ExprError> {
        match values.iter().position(|v| !v.is_finite()) {
            Some(i) => Err(ExprError::Undefined {
                expr: self.exprs[offset + i].to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CompiledSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSystem")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}
