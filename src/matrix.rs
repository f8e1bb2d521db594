//! Dense matrices of symbolic expressions.

use itertools::Itertools;

use crate::expr::Expr;

/// A dense, row-major matrix of expressions.
///
/// Used for the symbolic Jacobian and its transpose. Numeric evaluation is
/// provided by the [`Evaluate`](crate::eval::Evaluate) implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolicMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Expr>,
}

impl SymbolicMatrix {
    /// Builds a matrix by calling `f(i, j)` for every entry.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> Expr) -> Self {
        let data = (0..rows)
            .cartesian_product(0..cols)
            .map(|(i, j)| f(i, j))
            .collect();
        Self { rows, cols, data }
    }

    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns entry (i, j), or `None` when out of bounds.
    pub fn get(&self, i: usize, j: usize) -> Option<&Expr> {
        if i < self.rows && j < self.cols {
            self.data.get(i * self.cols + j)
        } else {
            None
        }
    }

    /// Returns the entries of row `i`, or `None` when out of bounds.
    pub fn row(&self, i: usize) -> Option<&[Expr]> {
        if i < self.rows {
            self.data.get(i * self.cols..(i + 1) * self.cols)
        } else {
            None
        }
    }

    /// All entries in row-major order.
    pub fn entries(&self) -> &[Expr] {
        &self.data
    }

    pub fn transpose(&self) -> SymbolicMatrix {
        SymbolicMatrix::from_fn(self.cols, self.rows, |i, j| {
            self.data[j * self.cols + i].clone()
        })
    }
}

impl std::fmt::Display for SymbolicMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows = (0..self.rows)
            .map(|i| format!("[{}]", self.row(i).into_iter().flatten().join(", ")))
            .join(", ");
        write!(f, "Matrix([{rows}])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolicMatrix {
        // [[x, 1], [2, y], [z, 3]]
        SymbolicMatrix::from_fn(3, 2, |i, j| match (i, j) {
            (0, 0) => Expr::var("x"),
            (1, 1) => Expr::var("y"),
            (2, 0) => Expr::var("z"),
            _ => Expr::Const((i + j) as f64),
        })
    }

    #[test]
    fn test_shape_and_access() {
        let m = sample();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.get(0, 0), Some(&Expr::var("x")));
        assert_eq!(m.get(2, 1), Some(&Expr::Const(3.0)));
        assert_eq!(m.get(3, 0), None);
        assert_eq!(m.get(0, 2), None);
        assert_eq!(m.row(1), Some(&[Expr::Const(1.0), Expr::var("y")][..]));
        assert_eq!(m.row(3), None);
    }

    #[test]
    fn test_transpose() {
        let m = sample();
        let t = m.transpose();
        assert_eq!(t.shape(), (2, 3));
        for i in 0..3 {
            for j in 0..2 {
                assert_eq!(m.get(i, j), t.get(j, i));
            }
        }
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            sample().to_string(),
            "Matrix([[x, 1], [1, y], [z, 3]])"
        );
    }
}
