//! Linear-system assembly buffer.
//!
//! Stamps accumulate additively as (row, col, value) triplets plus a
//! right-hand side. The builder owns the Newton sign convention: residual
//! stamps land on the RHS negated, so the factorized system is J·Δv = −F.

use amps_core::Diagnostics;
use faer::Mat;
use sprs::{CsMat, TriMat};

use crate::error::{SolverError, SolverResult};
use crate::index::VarIndex;
use crate::stamp::StampEntry;

#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    n: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
    rhs: Vec<f64>,
    debug_checks: bool,
}

impl MatrixBuilder {
    pub fn new(n: usize, debug_checks: bool) -> Self {
        MatrixBuilder {
            n,
            rows: Vec::new(),
            cols: Vec::new(),
            values: Vec::new(),
            rhs: vec![0.0; n],
            debug_checks,
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Number of Jacobian triplets stamped so far.
    pub fn triplet_count(&self) -> usize {
        self.values.len()
    }

    /// Clear all accumulated stamps for the next iteration.
    pub fn reset(&mut self) {
        self.reset_retaining(0);
    }

    /// Clear down to the first `prefix` Jacobian triplets. Lets callers
    /// stamp iteration-invariant linear terms once and keep them across
    /// restamps. The RHS is always cleared.
    pub fn reset_retaining(&mut self, prefix: usize) {
        self.rows.truncate(prefix);
        self.cols.truncate(prefix);
        self.values.truncate(prefix);
        self.rhs.iter_mut().for_each(|r| *r = 0.0);
    }

    pub fn apply(&mut self, entry: StampEntry) -> SolverResult<()> {
        match entry {
            StampEntry::Jacobian { row, col, value } => self.stamp_jacobian(row, col, value),
            StampEntry::Residual { row, value } => self.stamp_residual(row, value),
        }
    }

    pub fn stamp_jacobian(
        &mut self,
        row: VarIndex,
        col: VarIndex,
        value: f64,
    ) -> SolverResult<()> {
        // A NaN or infinite entry poisons the factorization; reject it
        // regardless of debug mode.
        if !value.is_finite() {
            return Err(SolverError::InvalidValue { row, col, value });
        }
        if self.debug_checks && (row >= self.n || col >= self.n) {
            return Err(SolverError::OutOfBounds {
                row,
                col,
                size: self.n,
            });
        }
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
        Ok(())
    }

    pub fn stamp_residual(&mut self, row: VarIndex, value: f64) -> SolverResult<()> {
        if !value.is_finite() {
            return Err(SolverError::InvalidResidual { row, value });
        }
        if self.debug_checks && row >= self.n {
            return Err(SolverError::OutOfBounds {
                row,
                col: 0,
                size: self.n,
            });
        }
        // RHS holds −F so the solve yields the Newton step directly.
        self.rhs[row] -= value;
        Ok(())
    }

    /// Largest |F| component of the accumulated residual.
    pub fn max_abs_residual(&self) -> f64 {
        self.rhs.iter().fold(0.0_f64, |m, r| m.max(r.abs()))
    }

    /// The accumulated residual F itself (the RHS holds −F).
    pub fn residual_vector(&self) -> Vec<f64> {
        self.rhs.iter().map(|r| -r).collect()
    }

    /// The negated residual vector as a faer column.
    pub fn rhs_matrix(&self) -> Mat<f64> {
        let mut b = Mat::zeros(self.n, 1);
        for (i, &r) in self.rhs.iter().enumerate() {
            b.write(i, 0, r);
        }
        b
    }

    /// Accumulate triplets into a dense faer matrix.
    pub fn to_dense(&self) -> Mat<f64> {
        let mut m = Mat::zeros(self.n, self.n);
        for ((&r, &c), &v) in self.rows.iter().zip(&self.cols).zip(&self.values) {
            m.write(r, c, m.read(r, c) + v);
        }
        m
    }

    /// Compress triplets to CSR. Duplicate coordinates sum.
    pub fn to_sparse(&self) -> CsMat<f64> {
        let mut tri = TriMat::new((self.n, self.n));
        for ((&r, &c), &v) in self.rows.iter().zip(&self.cols).zip(&self.values) {
            tri.add_triplet(r, c, v);
        }
        tri.to_csr()
    }

    /// Structural sanity checks on the assembled system. Rows or columns
    /// with no entries mean a variable nothing stamps into, which will
    /// surface later as a singular factorization.
    pub fn validate(&self, diagnostics: &mut Diagnostics) {
        let mut row_touched = vec![false; self.n];
        let mut col_touched = vec![false; self.n];
        for ((&r, &c), &v) in self.rows.iter().zip(&self.cols).zip(&self.values) {
            if v != 0.0 {
                row_touched[r] = true;
                col_touched[c] = true;
            }
        }
        for i in 0..self.n {
            if !row_touched[i] {
                diagnostics.add_warning_with_entity(
                    "assembly",
                    "row has no nonzero entries",
                    &format!("var {i}"),
                );
            }
            if !col_touched[i] {
                diagnostics.add_warning_with_entity(
                    "assembly",
                    "column has no nonzero entries",
                    &format!("var {i}"),
                );
            }
        }
    }
}
