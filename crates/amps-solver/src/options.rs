//! Solver configuration surface.

use crate::error::{SolverError, SolverResult};

/// Convergence criterion for the Newton-Raphson loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceCriterion {
    /// Maximum absolute KCL/constraint residual below tolerance.
    MaxResidual,
    /// Maximum absolute coordinate change below tolerance.
    MaxStep,
}

/// Matrix representation used during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixRepr {
    /// Triplets compacted to CSR before the solve.
    Sparse,
    /// Triplets scattered directly into a dense matrix.
    Dense,
}

/// Configuration consumed (not owned) by the solver core.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Convergence tolerance (per-unit residual or step)
    pub tolerance: f64,
    /// Hard Newton-Raphson iteration cap per inner solve
    pub max_iterations: usize,
    /// Convergence criterion
    pub criterion: ConvergenceCriterion,
    /// Seed voltages at 1.0 + j0.0 instead of parsed initial estimates
    pub flat_start: bool,
    /// Clip voltage updates per iteration
    pub voltage_limiting: bool,
    /// Maximum per-coordinate voltage step when limiting (per-unit)
    pub max_voltage_step: f64,
    /// Absolute band for voltage coordinates when limiting (per-unit)
    pub voltage_band: f64,
    /// Enable tx-factor homotopy stepping
    pub tx_stepping: bool,
    /// Initial (stiffest) tx-factor counter value
    pub tx_max: usize,
    /// Admittance stiffening constant K in `1 + K * tx/tx_max`
    pub tx_scale_k: f64,
    /// Allocate dual (Lagrange multiplier) variables and solve the KKT system
    pub optimization: bool,
    /// Add L2-penalized infeasibility currents at every bus (requires
    /// `optimization`)
    pub infeasibility_analysis: bool,
    /// Matrix representation during assembly
    pub matrix: MatrixRepr,
    /// Enable assembly well-formedness assertions (square, no zero row/col)
    pub debug_checks: bool,
    /// Enforce generator reactive power limits (PV to PQ switching)
    pub enforce_q_limits: bool,
    /// Maximum outer iterations for Q-limit enforcement
    pub max_q_iterations: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 50,
            criterion: ConvergenceCriterion::MaxResidual,
            flat_start: false,
            voltage_limiting: false,
            max_voltage_step: 0.1,
            voltage_band: 2.0,
            tx_stepping: false,
            tx_max: 5,
            tx_scale_k: 5.0,
            optimization: false,
            infeasibility_analysis: false,
            matrix: MatrixRepr::Sparse,
            debug_checks: false,
            enforce_q_limits: false,
            max_q_iterations: 10,
        }
    }

    /// Set convergence tolerance
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Set maximum iterations per inner solve
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// Seed voltages flat instead of from parsed estimates
    pub fn with_flat_start(mut self, enable: bool) -> Self {
        self.flat_start = enable;
        self
    }

    /// Enable or disable voltage limiting
    pub fn with_voltage_limiting(mut self, enable: bool) -> Self {
        self.voltage_limiting = enable;
        self
    }

    /// Enable tx-factor homotopy stepping with the given starting counter
    pub fn with_tx_stepping(mut self, tx_max: usize) -> Self {
        self.tx_stepping = true;
        self.tx_max = tx_max;
        self
    }

    /// Enable optimization (dual variable) mode
    pub fn with_optimization(mut self, enable: bool) -> Self {
        self.optimization = enable;
        self
    }

    /// Enable infeasibility-current analysis (implies nothing; callers must
    /// also enable optimization or validation fails)
    pub fn with_infeasibility_analysis(mut self, enable: bool) -> Self {
        self.infeasibility_analysis = enable;
        self
    }

    /// Select matrix representation
    pub fn with_matrix_repr(mut self, repr: MatrixRepr) -> Self {
        self.matrix = repr;
        self
    }

    /// Enable assembly well-formedness assertions
    pub fn with_debug_checks(mut self, enable: bool) -> Self {
        self.debug_checks = enable;
        self
    }

    /// Enable generator Q-limit enforcement
    pub fn with_q_limit_enforcement(mut self, enable: bool) -> Self {
        self.enforce_q_limits = enable;
        self
    }

    /// Set the convergence criterion
    pub fn with_criterion(mut self, criterion: ConvergenceCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Check cross-flag consistency. Called once before index assignment.
    pub fn validate(&self) -> SolverResult<()> {
        if self.infeasibility_analysis && !self.optimization {
            return Err(SolverError::Config(
                "infeasibility analysis requires optimization (dual) mode".into(),
            ));
        }
        if self.tolerance <= 0.0 {
            return Err(SolverError::Config("tolerance must be positive".into()));
        }
        if self.tx_stepping && self.tx_max == 0 {
            return Err(SolverError::Config(
                "tx stepping enabled with tx_max = 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SolverOptions::new();
        assert!((opts.tolerance - 1e-5).abs() < 1e-12);
        assert_eq!(opts.max_iterations, 50);
        assert!(!opts.optimization);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_infeasibility_requires_optimization() {
        let opts = SolverOptions::new().with_infeasibility_analysis(true);
        assert!(matches!(opts.validate(), Err(SolverError::Config(_))));

        let opts = SolverOptions::new()
            .with_optimization(true)
            .with_infeasibility_analysis(true);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_tx_stepping_needs_nonzero_max() {
        let mut opts = SolverOptions::new().with_tx_stepping(3);
        assert!(opts.validate().is_ok());
        opts.tx_max = 0;
        assert!(opts.validate().is_err());
    }
}
