//! Admittance-scaling homotopy for hard-to-start cases.
//!
//! Transmission admittances are inflated by 1 + K·(tx/tx_max), which pulls
//! all bus voltages toward the sources and makes the first Newton solve
//! nearly linear. The factor then steps down tx_max, tx_max−1, ..., 0,
//! reseeding each solve from the previous solution. tx = 0 recovers the
//! unmodified network.

use tracing::{debug, info};

use crate::component::Stampable;
use crate::error::{SolverError, SolverResult};
use crate::limiter::VoltageLimiter;
use crate::nr::{NrSolver, SolveReport};
use crate::options::SolverOptions;

/// Result of a full homotopy run.
#[derive(Debug, Clone, Copy)]
pub struct HomotopyOutcome {
    pub converged: bool,
    /// The tx level at which the continuation stalled, if it did.
    pub failed_at_tx: Option<usize>,
    /// Newton iterations summed over every level.
    pub total_iterations: usize,
    pub final_report: SolveReport,
}

#[derive(Debug, Clone, Copy)]
pub struct HomotopyController {
    tx_max: usize,
    scale_k: f64,
}

impl HomotopyController {
    pub fn new(tx_max: usize, scale_k: f64) -> Self {
        HomotopyController { tx_max, scale_k }
    }

    /// Admittance multiplier at a given tx level. `tx_max = 0` means the
    /// schedule collapses to the single unscaled solve.
    pub fn scale(&self, tx: usize) -> f64 {
        if self.tx_max == 0 {
            return 1.0;
        }
        1.0 + self.scale_k * (tx as f64) / (self.tx_max as f64)
    }

    /// Step tx from tx_max down to zero, solving at each level. A level
    /// that fails to converge, or hits a singular factorization, stops the
    /// continuation and is reported in the outcome rather than unwinding
    /// as an error.
    pub fn run(
        &self,
        components: &mut [Box<dyn Stampable>],
        v: &mut [f64],
        options: &SolverOptions,
        limiter: Option<&VoltageLimiter>,
    ) -> SolverResult<HomotopyOutcome> {
        let solver = NrSolver::new(options, limiter.cloned());
        let mut total_iterations = 0;
        let mut last_report = SolveReport {
            converged: false,
            iterations: 0,
            max_residual: f64::INFINITY,
            max_step: f64::INFINITY,
        };

        for tx in (0..=self.tx_max).rev() {
            let scale = self.scale(tx);
            for component in components.iter_mut() {
                component.set_tx_scale(scale);
            }
            debug!(tx, scale, "homotopy level");

            let report = match solver.solve(components, v) {
                Ok(report) => report,
                Err(SolverError::Singular) => {
                    info!(tx, "singular system during continuation");
                    return Ok(HomotopyOutcome {
                        converged: false,
                        failed_at_tx: Some(tx),
                        total_iterations,
                        final_report: last_report,
                    });
                }
                Err(e) => return Err(e),
            };
            total_iterations += report.iterations;
            last_report = report;

            if !report.converged {
                info!(tx, "continuation stalled");
                return Ok(HomotopyOutcome {
                    converged: false,
                    failed_at_tx: Some(tx),
                    total_iterations,
                    final_report: report,
                });
            }
        }

        info!(total_iterations, "continuation complete");
        Ok(HomotopyOutcome {
            converged: true,
            failed_at_tx: None,
            total_iterations,
            final_report: last_report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_schedule() {
        let h = HomotopyController::new(5, 5.0);
        assert!((h.scale(5) - 6.0).abs() < 1e-12);
        assert!((h.scale(0) - 1.0).abs() < 1e-12);
        // Monotone decreasing as tx falls.
        let scales: Vec<f64> = (0..=5).rev().map(|tx| h.scale(tx)).collect();
        for pair in scales.windows(2) {
            assert!(pair[0] > pair[1]);
        }
    }

    #[test]
    fn test_degenerate_schedule_is_unscaled() {
        let h = HomotopyController::new(0, 5.0);
        assert_eq!(h.scale(0), 1.0);
    }
}
