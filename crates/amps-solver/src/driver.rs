//! Power-flow driver: network to components, solve, results.

use std::collections::BTreeMap;

use amps_core::{BusId, Diagnostics, Edge, GenId, Network};
use num_complex::Complex64;
use tracing::{debug, info, warn};

use crate::component::{
    Branch, ConstantPowerLoad, InfeasibilitySource, NodeRegistry, PvGenerator, ShuntCapacitor,
    SlackSource, Stampable,
};
use crate::error::{SolverError, SolverResult};
use crate::homotopy::HomotopyController;
use crate::index::VariableIndexAllocator;
use crate::limiter::VoltageLimiter;
use crate::matrix::MatrixBuilder;
use crate::nr::NrSolver;
use crate::options::SolverOptions;
use crate::stamp::StampEntry;

/// Results of one power-flow solve.
#[derive(Debug, Clone)]
pub struct PowerFlowReport {
    pub converged: bool,
    /// Newton iterations summed over all continuation levels and Q-limit
    /// rounds.
    pub iterations: usize,
    /// Continuation level the solve stalled at, when it did.
    pub failed_at_tx: Option<usize>,
    pub max_residual: f64,
    /// Full state vector in allocation order.
    pub state: Vec<f64>,
    /// Final residual F per equation row.
    pub residuals: Vec<f64>,
    pub bus_voltage: BTreeMap<BusId, Complex64>,
    /// Solved reactive power per generator.
    pub generator_q: BTreeMap<GenId, f64>,
    /// Generators tripped to a reactive limit.
    pub q_limited: Vec<GenId>,
    /// Per-bus infeasibility current, present when the analysis was enabled.
    pub infeasibility_current: BTreeMap<BusId, Complex64>,
    pub diagnostics: Diagnostics,
}

impl PowerFlowReport {
    pub fn voltage_magnitude(&self, bus: BusId) -> Option<f64> {
        self.bus_voltage.get(&bus).map(|v| v.norm())
    }

    pub fn voltage_angle(&self, bus: BusId) -> Option<f64> {
        self.bus_voltage.get(&bus).map(|v| v.arg())
    }

    /// Sum of squared infeasibility current magnitudes.
    pub fn infeasibility_norm(&self) -> f64 {
        self.infeasibility_current
            .values()
            .map(|i| i.norm_sqr())
            .sum()
    }
}

/// Equivalent-circuit power-flow solver.
///
/// Builds one scalar unknown per voltage component and device internal
/// quantity, stamps every component's linearized contribution each Newton
/// pass, and solves the coupled system directly. Optimization mode adds
/// Lagrange multipliers per bus and turns the same machinery into a KKT
/// solve.
#[derive(Debug, Clone)]
pub struct PowerFlow {
    options: SolverOptions,
}

impl PowerFlow {
    pub fn new(options: SolverOptions) -> Self {
        PowerFlow { options }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn solve(&self, network: &Network) -> SolverResult<PowerFlowReport> {
        self.options.validate()?;

        let mut diagnostics = Diagnostics::new();
        network.validate_into(&mut diagnostics);
        if diagnostics.has_errors() {
            let first = diagnostics
                .errors()
                .next()
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(SolverError::Network(first));
        }

        let optimization = self.options.optimization;
        let infeasibility = self.options.infeasibility_analysis;

        // Bus variables first so voltage indices form a stable prefix.
        let mut alloc = VariableIndexAllocator::new();
        let mut registry = NodeRegistry::new();
        for bus in network.buses() {
            registry.allocate_bus(&mut alloc, bus.id, optimization, infeasibility);
        }

        let mut components = self.build_components(network)?;
        for component in components.iter_mut() {
            component.assign(&registry, &mut alloc, optimization)?;
        }

        let n = alloc.len();
        debug!(
            unknowns = n,
            components = components.len(),
            optimization,
            "system assembled"
        );

        let mut v = vec![0.0; n];
        self.seed_state(network, &registry, &components, &mut v);

        let limiter = self.options.voltage_limiting.then(|| {
            VoltageLimiter::new(
                alloc.voltage_mask(),
                self.options.max_voltage_step,
                self.options.voltage_band,
            )
        });

        // Initial solve, through the continuation when enabled.
        let (mut converged, mut iterations, failed_at_tx) = if self.options.tx_stepping {
            let controller =
                HomotopyController::new(self.options.tx_max, self.options.tx_scale_k);
            let outcome =
                controller.run(&mut components, &mut v, &self.options, limiter.as_ref())?;
            (outcome.converged, outcome.total_iterations, outcome.failed_at_tx)
        } else {
            let solver = NrSolver::new(&self.options, limiter.clone());
            let report = solver.solve(&components, &mut v)?;
            (report.converged, report.iterations, None)
        };

        // Reactive limit enforcement: trip violating generators to fixed Q
        // and re-solve until no new violations appear.
        let mut q_limited: Vec<GenId> = Vec::new();
        if converged && self.options.enforce_q_limits {
            let solver = NrSolver::new(&self.options, limiter.clone());
            for round in 0..self.options.max_q_iterations {
                let tripped = self.trip_q_violations(&mut components, &v, &mut q_limited);
                if tripped == 0 {
                    break;
                }
                info!(round, tripped, "generators at reactive limit");
                let report = solver.solve(&components, &mut v)?;
                iterations += report.iterations;
                if !report.converged {
                    warn!(round, "re-solve after limit trip did not converge");
                    converged = false;
                    break;
                }
            }
        }

        let residuals = self.final_residuals(&components, &v, n)?;
        let max_residual = residuals.iter().fold(0.0_f64, |m, r| m.max(r.abs()));

        let mut bus_voltage = BTreeMap::new();
        let mut infeasibility_current = BTreeMap::new();
        for (&bus, vars) in registry.iter() {
            bus_voltage.insert(bus, Complex64::new(v[vars.vr], v[vars.vi]));
            if let (Some(iir), Some(iii)) = (vars.iir, vars.iii) {
                infeasibility_current.insert(bus, Complex64::new(v[iir], v[iii]));
            }
        }

        let mut generator_q = BTreeMap::new();
        for component in &components {
            if let Some(state) = component.q_limit_state() {
                generator_q.insert(state.id, v[state.q_index]);
            }
        }

        if converged {
            info!(iterations, max_residual, "power flow converged");
        } else {
            warn!(iterations, max_residual, ?failed_at_tx, "power flow failed");
        }

        Ok(PowerFlowReport {
            converged,
            iterations,
            failed_at_tx,
            max_residual,
            state: v,
            residuals,
            bus_voltage,
            generator_q,
            q_limited,
            infeasibility_current,
            diagnostics,
        })
    }

    fn build_components(&self, network: &Network) -> SolverResult<Vec<Box<dyn Stampable>>> {
        let mut components: Vec<Box<dyn Stampable>> = Vec::new();

        for slack in network.slacks() {
            components.push(Box::new(SlackSource::new(slack.clone())));
        }
        for gen in network.generators() {
            if gen.status {
                components.push(Box::new(PvGenerator::new(gen.clone())));
            }
        }
        for load in network.loads() {
            components.push(Box::new(ConstantPowerLoad::new(load.clone())));
        }
        for cap in network.capacitors() {
            if cap.status {
                components.push(Box::new(ShuntCapacitor::new(cap.clone())));
            }
        }
        for edge in network.series_elements() {
            let branch = match edge {
                Edge::Line(line) => line.status.then(|| Branch::from_line(line)),
                Edge::Transformer(xf) => xf.status.then(|| Branch::from_transformer(xf)),
                Edge::Regulator(reg) => reg.status.then(|| Branch::from_regulator(reg)),
                Edge::Switch(sw) => Branch::from_switch(sw),
                Edge::Fuse(fuse) => Branch::from_fuse(fuse),
            };
            if let Some(branch) = branch {
                components.push(Box::new(branch));
            }
        }
        if self.options.infeasibility_analysis {
            for bus in network.buses() {
                components.push(Box::new(InfeasibilitySource::new(bus)));
            }
        }
        Ok(components)
    }

    fn seed_state(
        &self,
        network: &Network,
        registry: &NodeRegistry,
        components: &[Box<dyn Stampable>],
        v: &mut [f64],
    ) {
        for bus in network.buses() {
            if let Ok(vars) = registry.vars(bus.id) {
                let seed = if self.options.flat_start {
                    Complex64::new(1.0, 0.0)
                } else {
                    Complex64::from_polar(bus.voltage_pu, bus.angle_rad)
                };
                v[vars.vr] = seed.re;
                v[vars.vi] = seed.im;
            }
        }
        // Device seeds override the generic bus seed (setpoints, dispatch).
        for component in components {
            component.seed(v);
        }
    }

    fn trip_q_violations(
        &self,
        components: &mut [Box<dyn Stampable>],
        v: &[f64],
        q_limited: &mut Vec<GenId>,
    ) -> usize {
        let mut tripped = 0;
        for component in components.iter_mut() {
            let Some(state) = component.q_limit_state() else {
                continue;
            };
            if state.fixed {
                continue;
            }
            let q = v[state.q_index];
            let qfix = if q > state.qmax {
                state.qmax
            } else if q < state.qmin {
                state.qmin
            } else {
                continue;
            };
            debug!(
                gen = state.id.value(),
                q, qfix, "reactive limit violated"
            );
            component.enforce_q_limit(qfix);
            q_limited.push(state.id);
            tripped += 1;
        }
        tripped
    }

    /// Assemble once more at the solution to expose per-row residuals.
    fn final_residuals(
        &self,
        components: &[Box<dyn Stampable>],
        v: &[f64],
        n: usize,
    ) -> SolverResult<Vec<f64>> {
        let mut builder = MatrixBuilder::new(n, false);
        let mut entries: Vec<StampEntry> = Vec::new();
        for component in components {
            component.stamp(v, &mut entries)?;
        }
        for entry in entries {
            builder.apply(entry)?;
        }
        Ok(builder.residual_vector())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amps_core::{Load, LoadId, Node, Slack, SlackId};

    #[test]
    fn test_rejects_invalid_network() {
        let network = Network::new();
        let pf = PowerFlow::new(SolverOptions::default());
        assert!(matches!(
            pf.solve(&network),
            Err(SolverError::Network(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_options() {
        let mut network = Network::new();
        let bus = amps_core::Bus::new(BusId::new(0), "b0");
        network.graph.add_node(Node::Bus(bus));
        network.graph.add_node(Node::Slack(Slack {
            id: SlackId::new(0),
            name: "s".into(),
            bus: BusId::new(0),
            voltage_pu: 1.0,
            angle_rad: 0.0,
        }));
        network.graph.add_node(Node::Load(Load {
            id: LoadId::new(0),
            name: "ld".into(),
            bus: BusId::new(0),
            active_power_pu: 0.1,
            reactive_power_pu: 0.0,
        }));

        let options = SolverOptions::default().with_infeasibility_analysis(true);
        let pf = PowerFlow::new(options);
        assert!(matches!(pf.solve(&network), Err(SolverError::Config(_))));
    }
}
