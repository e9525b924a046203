//! Newton-Raphson iteration over the stamped system.

use amps_core::Diagnostics;
use faer::prelude::SpSolver;
use faer::{FaerMat, Mat};
use tracing::{debug, trace, warn};

use crate::component::Stampable;
use crate::error::{SolverError, SolverResult};
use crate::limiter::VoltageLimiter;
use crate::matrix::MatrixBuilder;
use crate::options::{ConvergenceCriterion, MatrixRepr, SolverOptions};
use crate::stamp::StampEntry;

/// Outcome of one Newton solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    pub converged: bool,
    pub iterations: usize,
    /// Largest |F| at the last assembly.
    pub max_residual: f64,
    /// Largest |Δv| component of the last applied step.
    pub max_step: f64,
}

/// Iterates J·Δv = −F to convergence, restamping the full system each
/// pass. The nonlinear models make most of the matrix state-dependent
/// anyway, so nothing is carried between iterations except the iterate.
pub struct NrSolver<'a> {
    options: &'a SolverOptions,
    limiter: Option<VoltageLimiter>,
}

impl<'a> NrSolver<'a> {
    pub fn new(options: &'a SolverOptions, limiter: Option<VoltageLimiter>) -> Self {
        NrSolver { options, limiter }
    }

    pub fn solve(
        &self,
        components: &[Box<dyn Stampable>],
        v: &mut [f64],
    ) -> SolverResult<SolveReport> {
        let n = v.len();
        let mut builder = MatrixBuilder::new(n, self.options.debug_checks);
        let mut entries: Vec<StampEntry> = Vec::new();
        let mut max_residual = f64::INFINITY;
        let mut max_step = f64::INFINITY;

        for iteration in 0..self.options.max_iterations {
            builder.reset();
            entries.clear();
            for component in components {
                component.stamp(v, &mut entries)?;
            }
            for entry in &entries {
                builder.apply(*entry)?;
            }

            if self.options.debug_checks && iteration == 0 {
                let mut diagnostics = Diagnostics::new();
                builder.validate(&mut diagnostics);
                for issue in diagnostics.warnings() {
                    warn!(%issue, "matrix structure");
                }
            }

            max_residual = builder.max_abs_residual();
            trace!(iteration, max_residual, "assembled");

            if self.options.criterion == ConvergenceCriterion::MaxResidual
                && max_residual < self.options.tolerance
            {
                debug!(iteration, max_residual, "converged on residual");
                return Ok(SolveReport {
                    converged: true,
                    iterations: iteration,
                    max_residual,
                    max_step,
                });
            }

            let mut delta = self.solve_linear_system(&builder)?;

            if let Some(limiter) = &self.limiter {
                if limiter.apply(v, &mut delta) {
                    trace!(iteration, "step limited");
                }
            }

            max_step = delta.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
            for (vi, di) in v.iter_mut().zip(&delta) {
                *vi += di;
            }
            trace!(iteration, max_step, "stepped");

            if self.options.criterion == ConvergenceCriterion::MaxStep
                && max_step < self.options.tolerance
            {
                debug!(iteration, max_step, "converged on step size");
                return Ok(SolveReport {
                    converged: true,
                    iterations: iteration + 1,
                    max_residual,
                    max_step,
                });
            }
        }

        debug!(
            max_iterations = self.options.max_iterations,
            max_residual, "iteration limit reached"
        );
        Ok(SolveReport {
            converged: false,
            iterations: self.options.max_iterations,
            max_residual,
            max_step,
        })
    }

    /// Factorize and solve via faer's partially pivoted LU. The sparse
    /// representation compresses duplicates through CSR first; the dense
    /// one accumulates straight into the factorization input.
    fn solve_linear_system(&self, builder: &MatrixBuilder) -> SolverResult<Vec<f64>> {
        let n = builder.size();
        let mat = match self.options.matrix {
            MatrixRepr::Dense => builder.to_dense(),
            MatrixRepr::Sparse => {
                let csr = builder.to_sparse();
                let mut m = Mat::zeros(n, n);
                for (&value, (row, col)) in csr.iter() {
                    m.write(row, col, value);
                }
                m
            }
        };
        let rhs = builder.rhs_matrix();

        let lu = mat.partial_piv_lu();
        let solution = lu.solve(&rhs);

        let x: Vec<f64> = (0..n).map(|i| solution.read(i, 0)).collect();
        if x.iter().any(|value| !value.is_finite()) {
            return Err(SolverError::Singular);
        }
        Ok(x)
    }
}
