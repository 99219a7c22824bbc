//! Dense linear solves.

use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};

/// A system that cannot be solved. `row` is the unknown whose pivot
/// vanished or whose value came out non-finite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Singular {
    pub row: usize,
}

/// LU factors of an MNA matrix, reusable across right-hand sides.
#[derive(Debug, Clone)]
pub struct Factorization {
    lu: LU<f64, Dyn, Dyn>,
}

impl Factorization {
    /// Factor `matrix`, rejecting non-finite entries and zero pivots.
    pub fn new(matrix: &DMatrix<f64>) -> Result<Self, Singular> {
        if let Some(row) = first_non_finite_row(matrix) {
            return Err(Singular { row });
        }
        let lu = matrix.clone().lu();
        // partial pivoting permutes rows only, so diagonal i of U belongs
        // to unknown i
        let u = lu.u();
        if let Some(row) = (0..u.nrows()).find(|&i| u[(i, i)] == 0.0) {
            return Err(Singular { row });
        }
        Ok(Self { lu })
    }

    pub fn size(&self) -> usize {
        self.lu.l().nrows()
    }

    pub fn solve(&self, rhs: &DVector<f64>) -> Result<DVector<f64>, Singular> {
        if let Some(row) = rhs.iter().position(|x| !x.is_finite()) {
            return Err(Singular { row });
        }
        let x = self.lu.solve(rhs).ok_or(Singular { row: 0 })?;
        match x.iter().position(|v| !v.is_finite()) {
            Some(row) => Err(Singular { row }),
            None => Ok(x),
        }
    }
}

/// Solve `a x = b` in one shot.
pub fn solve_dense(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, Singular> {
    Factorization::new(a)?.solve(b)
}

fn first_non_finite_row(matrix: &DMatrix<f64>) -> Option<usize> {
    (0..matrix.nrows()).find(|&i| matrix.row(i).iter().any(|x| !x.is_finite()))
}
