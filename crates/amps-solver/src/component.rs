//! Solver-side component instances.
//!
//! Each instance owns its numeric parameters and, once assigned, a
//! [`StampDetails`] binding into the global variable space. The
//! [`NodeRegistry`] hands out per-bus voltage (and, in optimization mode,
//! multiplier and infeasibility-current) indices so every component sharing
//! a bus stamps into the same rows.

use std::collections::BTreeMap;

use amps_core::{Bus, BusId, Capacitor, Fuse, Generator, Line, Load, Regulator, Slack, Switch, Transformer};
use num_complex::Complex64;

use crate::error::{SolverError, SolverResult};
use crate::index::{VarIndex, VarKind, VariableIndexAllocator};
use crate::models::ModelLibrary;
use crate::stamp::{emit_stamps, Binding, StampDetails, StampEntry};

/// Conductance used for closed switches and intact fuses.
pub const G_CLOSED: f64 = 1e6;

/// Global indices allocated for one bus.
#[derive(Debug, Clone, Copy)]
pub struct BusVars {
    pub vr: VarIndex,
    pub vi: VarIndex,
    pub lr: Option<VarIndex>,
    pub li: Option<VarIndex>,
    pub iir: Option<VarIndex>,
    pub iii: Option<VarIndex>,
}

impl BusVars {
    fn dual_binding(&self) -> (Binding, Binding) {
        (
            self.lr.map_or(Binding::Skip, Binding::Index),
            self.li.map_or(Binding::Skip, Binding::Index),
        )
    }
}

/// Bus-to-variable map shared by every component during assignment.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    map: BTreeMap<BusId, BusVars>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate voltage variables for `bus`, plus KCL multipliers and
    /// infeasibility currents when requested.
    pub fn allocate_bus(
        &mut self,
        alloc: &mut VariableIndexAllocator,
        bus: BusId,
        optimization: bool,
        infeasibility: bool,
    ) {
        let vr = alloc.allocate(VarKind::VoltageReal, Some(bus));
        let vi = alloc.allocate(VarKind::VoltageImag, Some(bus));
        let (lr, li) = if optimization {
            (
                Some(alloc.allocate(VarKind::Dual, Some(bus))),
                Some(alloc.allocate(VarKind::Dual, Some(bus))),
            )
        } else {
            (None, None)
        };
        let (iir, iii) = if infeasibility {
            (
                Some(alloc.allocate(VarKind::InfeasCurrent, Some(bus))),
                Some(alloc.allocate(VarKind::InfeasCurrent, Some(bus))),
            )
        } else {
            (None, None)
        };
        self.map.insert(bus, BusVars { vr, vi, lr, li, iir, iii });
    }

    pub fn vars(&self, bus: BusId) -> SolverResult<BusVars> {
        self.map
            .get(&bus)
            .copied()
            .ok_or_else(|| SolverError::Network(format!("bus {} has no allocated variables", bus.value())))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BusId, &BusVars)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Reactive-power limit bookkeeping exposed by generators.
#[derive(Debug, Clone, Copy)]
pub struct QLimitState {
    pub id: amps_core::GenId,
    pub q_index: VarIndex,
    pub qmin: f64,
    pub qmax: f64,
    /// Already tripped to fixed-Q operation.
    pub fixed: bool,
}

/// A component wired into the global system and ready to stamp.
pub trait Stampable {
    fn label(&self) -> String;

    /// Bind bus and device variables. Must run before any other method.
    fn assign(
        &mut self,
        registry: &NodeRegistry,
        alloc: &mut VariableIndexAllocator,
        optimization: bool,
    ) -> SolverResult<()>;

    /// Evaluate at the current iterate and append contributions.
    fn stamp(&self, v: &[f64], out: &mut Vec<StampEntry>) -> SolverResult<()>;

    /// Homotopy scale for transmission elements. Default no-op.
    fn set_tx_scale(&mut self, _scale: f64) {}

    /// Initialize this component's own variables in `v`.
    fn seed(&self, _v: &mut [f64]) {}

    /// Bus pairs this component ties together, for topology tooling such
    /// as island detection. Shunt devices report nothing.
    fn connections(&self) -> Vec<(BusId, BusId)> {
        Vec::new()
    }

    /// This component's residual contributions per global row at `v`,
    /// independent of the live assembly path.
    fn calculate_residuals(&self, v: &[f64]) -> SolverResult<BTreeMap<VarIndex, f64>> {
        let mut entries = Vec::new();
        self.stamp(v, &mut entries)?;
        let mut map = BTreeMap::new();
        for entry in entries {
            if let StampEntry::Residual { row, value } = entry {
                *map.entry(row).or_insert(0.0) += value;
            }
        }
        Ok(map)
    }

    /// Q-limit state, for components that regulate reactive power.
    fn q_limit_state(&self) -> Option<QLimitState> {
        None
    }

    /// Trip this component to fixed reactive power output.
    fn enforce_q_limit(&mut self, _qfix: f64) {}
}

fn require_details<'a>(
    details: &'a Option<StampDetails>,
    label: &str,
) -> SolverResult<&'a StampDetails> {
    details.as_ref().ok_or_else(|| {
        SolverError::UnboundSymbol(format!("{label} stamped before assignment"))
    })
}

// ---------------------------------------------------------------------------
// Slack

#[derive(Debug, Clone)]
pub struct SlackSource {
    slack: Slack,
    vset_r: f64,
    vset_i: f64,
    current_ix: Option<(VarIndex, VarIndex)>,
    details: Option<StampDetails>,
}

impl SlackSource {
    pub fn new(slack: Slack) -> Self {
        let vset = Complex64::from_polar(slack.voltage_pu, slack.angle_rad);
        SlackSource {
            slack,
            vset_r: vset.re,
            vset_i: vset.im,
            current_ix: None,
            details: None,
        }
    }

    pub fn bus(&self) -> BusId {
        self.slack.bus
    }

    /// Injected current indices, available after assignment.
    pub fn current_indices(&self) -> Option<(VarIndex, VarIndex)> {
        self.current_ix
    }
}

impl Stampable for SlackSource {
    fn label(&self) -> String {
        format!("slack {}", self.slack.name)
    }

    fn assign(
        &mut self,
        registry: &NodeRegistry,
        alloc: &mut VariableIndexAllocator,
        optimization: bool,
    ) -> SolverResult<()> {
        let lib = ModelLibrary::get()?;
        let bus = registry.vars(self.slack.bus)?;
        let isr = alloc.allocate(VarKind::DeviceCurrent, Some(self.slack.bus));
        let isi = alloc.allocate(VarKind::DeviceCurrent, Some(self.slack.bus));
        self.current_ix = Some((isr, isi));
        let (lr, li) = bus.dual_binding();
        let (lsr, lsi) = if optimization {
            (
                Binding::Index(alloc.allocate(VarKind::Dual, Some(self.slack.bus))),
                Binding::Index(alloc.allocate(VarKind::Dual, Some(self.slack.bus))),
            )
        } else {
            (Binding::Skip, Binding::Skip)
        };
        self.details = Some(StampDetails::new(
            &lib.slack,
            vec![self.vset_r, self.vset_i],
            vec![bus.vr, bus.vi, isr, isi],
            vec![lr, li, lsr, lsi],
        ));
        Ok(())
    }

    fn stamp(&self, v: &[f64], out: &mut Vec<StampEntry>) -> SolverResult<()> {
        let details = require_details(&self.details, &self.label())?;
        let lib = ModelLibrary::get()?;
        emit_stamps(&lib.slack, details, v, out);
        Ok(())
    }

    fn seed(&self, v: &mut [f64]) {
        if let Some(details) = &self.details {
            v[details.primal_index(0)] = self.vset_r;
            v[details.primal_index(1)] = self.vset_i;
        }
    }
}

// ---------------------------------------------------------------------------
// Generator

/// Reactive-power handling mode. Starts PV; trips to fixed Q at a limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QMode {
    Pv,
    FixedQ(f64),
}

#[derive(Debug, Clone)]
pub struct PvGenerator {
    gen: Generator,
    mode: QMode,
    q_ix: Option<VarIndex>,
    details: Option<StampDetails>,
}

impl PvGenerator {
    pub fn new(gen: Generator) -> Self {
        PvGenerator {
            gen,
            mode: QMode::Pv,
            q_ix: None,
            details: None,
        }
    }

    pub fn bus(&self) -> BusId {
        self.gen.bus
    }

    pub fn mode(&self) -> QMode {
        self.mode
    }

    pub fn q_index(&self) -> Option<VarIndex> {
        self.q_ix
    }

    pub fn q_limits(&self) -> (f64, f64) {
        (self.gen.qmin_pu, self.gen.qmax_pu)
    }

    pub fn voltage_setpoint(&self) -> f64 {
        self.gen.voltage_setpoint_pu
    }

    /// Switch to fixed-Q operation. The variable layout is unchanged; only
    /// the model and its constants swap.
    pub fn fix_q(&mut self, qfix: f64) {
        self.mode = QMode::FixedQ(qfix);
        if let Some(details) = &mut self.details {
            details.set_constant(1, qfix);
            details.set_constant(0, self.gen.active_power_pu);
        }
    }

    fn model<'a>(&self, lib: &'a ModelLibrary) -> &'a crate::equations::CompiledModel {
        match self.mode {
            QMode::Pv => &lib.generator_pv,
            QMode::FixedQ(_) => &lib.generator_qfixed,
        }
    }
}

impl Stampable for PvGenerator {
    fn label(&self) -> String {
        format!("generator {}", self.gen.name)
    }

    fn assign(
        &mut self,
        registry: &NodeRegistry,
        alloc: &mut VariableIndexAllocator,
        optimization: bool,
    ) -> SolverResult<()> {
        let lib = ModelLibrary::get()?;
        let bus = registry.vars(self.gen.bus)?;
        let q = alloc.allocate(VarKind::ReactivePower, Some(self.gen.bus));
        self.q_ix = Some(q);
        let (lr, li) = bus.dual_binding();
        let lq = if optimization {
            Binding::Index(alloc.allocate(VarKind::Dual, Some(self.gen.bus)))
        } else {
            Binding::Skip
        };
        let constants = match self.mode {
            QMode::Pv => vec![
                self.gen.active_power_pu,
                self.gen.voltage_setpoint_pu * self.gen.voltage_setpoint_pu,
            ],
            QMode::FixedQ(qfix) => vec![self.gen.active_power_pu, qfix],
        };
        self.details = Some(StampDetails::new(
            self.model(lib),
            constants,
            vec![bus.vr, bus.vi, q],
            vec![lr, li, lq],
        ));
        Ok(())
    }

    fn stamp(&self, v: &[f64], out: &mut Vec<StampEntry>) -> SolverResult<()> {
        let details = require_details(&self.details, &self.label())?;
        let lib = ModelLibrary::get()?;
        emit_stamps(self.model(lib), details, v, out);
        Ok(())
    }

    fn seed(&self, v: &mut [f64]) {
        if let Some(details) = &self.details {
            // Voltage magnitude to setpoint, Q to the dispatch value.
            v[details.primal_index(0)] = self.gen.voltage_setpoint_pu;
            v[details.primal_index(2)] = self.gen.reactive_power_pu;
        }
    }

    fn q_limit_state(&self) -> Option<QLimitState> {
        self.q_ix.map(|q_index| QLimitState {
            id: self.gen.id,
            q_index,
            qmin: self.gen.qmin_pu,
            qmax: self.gen.qmax_pu,
            fixed: matches!(self.mode, QMode::FixedQ(_)),
        })
    }

    fn enforce_q_limit(&mut self, qfix: f64) {
        self.fix_q(qfix);
    }
}

// ---------------------------------------------------------------------------
// Load

#[derive(Debug, Clone)]
pub struct ConstantPowerLoad {
    load: Load,
    details: Option<StampDetails>,
}

impl ConstantPowerLoad {
    pub fn new(load: Load) -> Self {
        ConstantPowerLoad { load, details: None }
    }
}

impl Stampable for ConstantPowerLoad {
    fn label(&self) -> String {
        format!("load {}", self.load.name)
    }

    fn assign(
        &mut self,
        registry: &NodeRegistry,
        _alloc: &mut VariableIndexAllocator,
        _optimization: bool,
    ) -> SolverResult<()> {
        let lib = ModelLibrary::get()?;
        let bus = registry.vars(self.load.bus)?;
        let (lr, li) = bus.dual_binding();
        self.details = Some(StampDetails::new(
            &lib.pq_load,
            vec![self.load.active_power_pu, self.load.reactive_power_pu],
            vec![bus.vr, bus.vi],
            vec![lr, li],
        ));
        Ok(())
    }

    fn stamp(&self, v: &[f64], out: &mut Vec<StampEntry>) -> SolverResult<()> {
        let details = require_details(&self.details, &self.label())?;
        let lib = ModelLibrary::get()?;
        emit_stamps(&lib.pq_load, details, v, out);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shunt capacitor

#[derive(Debug, Clone)]
pub struct ShuntCapacitor {
    cap: Capacitor,
    details: Option<StampDetails>,
}

impl ShuntCapacitor {
    pub fn new(cap: Capacitor) -> Self {
        ShuntCapacitor { cap, details: None }
    }
}

impl Stampable for ShuntCapacitor {
    fn label(&self) -> String {
        format!("capacitor {}", self.cap.name)
    }

    fn assign(
        &mut self,
        registry: &NodeRegistry,
        _alloc: &mut VariableIndexAllocator,
        _optimization: bool,
    ) -> SolverResult<()> {
        let lib = ModelLibrary::get()?;
        let bus = registry.vars(self.cap.bus)?;
        let (lr, li) = bus.dual_binding();
        self.details = Some(StampDetails::new(
            &lib.shunt,
            vec![self.cap.susceptance_pu],
            vec![bus.vr, bus.vi],
            vec![lr, li],
        ));
        Ok(())
    }

    fn stamp(&self, v: &[f64], out: &mut Vec<StampEntry>) -> SolverResult<()> {
        let details = require_details(&self.details, &self.label())?;
        let lib = ModelLibrary::get()?;
        emit_stamps(&lib.shunt, details, v, out);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Branches

#[derive(Debug, Clone)]
enum BranchKind {
    /// π-section: [g, b, bsh_half]
    Pi { g: f64, b: f64, bsh_half: f64 },
    /// Explicit admittance blocks: [gff, bff, gft, bft, gtf, btf, gtt, btt]
    TwoPort { y: [f64; 8] },
}

#[derive(Debug, Clone)]
pub struct Branch {
    label: String,
    from: BusId,
    to: BusId,
    kind: BranchKind,
    /// Whether the homotopy scale applies to this branch.
    tx_scalable: bool,
    tx_scale: f64,
    details: Option<StampDetails>,
}

impl Branch {
    /// Series impedance to rectangular admittance.
    fn series_admittance(r: f64, x: f64) -> Complex64 {
        Complex64::new(r, x).inv()
    }

    pub fn from_line(line: &Line) -> Self {
        let y = Self::series_admittance(line.resistance, line.reactance);
        Branch {
            label: format!("line {}", line.name),
            from: line.from_bus,
            to: line.to_bus,
            kind: BranchKind::Pi {
                g: y.re,
                b: y.im,
                bsh_half: line.charging_b / 2.0,
            },
            tx_scalable: true,
            tx_scale: 1.0,
            details: None,
        }
    }

    pub fn from_transformer(xf: &Transformer) -> Self {
        let y = Self::series_admittance(xf.resistance, xf.reactance);
        let t = Complex64::from_polar(xf.tap_ratio, xf.phase_shift_rad);
        Self::two_port_from_tap(
            format!("transformer {}", xf.name),
            xf.from_bus,
            xf.to_bus,
            y,
            t,
            true,
        )
    }

    pub fn from_regulator(reg: &Regulator) -> Self {
        let y = Self::series_admittance(reg.resistance, reg.reactance);
        let t = Complex64::new(reg.tap_ratio, 0.0);
        Self::two_port_from_tap(
            format!("regulator {}", reg.name),
            reg.from_bus,
            reg.to_bus,
            y,
            t,
            false,
        )
    }

    /// Closed switch or intact fuse: a stiff series conductance.
    pub fn closed_contact(label: String, from: BusId, to: BusId) -> Self {
        Branch {
            label,
            from,
            to,
            kind: BranchKind::TwoPort {
                y: [G_CLOSED, 0.0, -G_CLOSED, 0.0, -G_CLOSED, 0.0, G_CLOSED, 0.0],
            },
            tx_scalable: false,
            tx_scale: 1.0,
            details: None,
        }
    }

    pub fn from_switch(sw: &Switch) -> Option<Self> {
        sw.closed
            .then(|| Self::closed_contact(format!("switch {}", sw.name), sw.from_bus, sw.to_bus))
    }

    pub fn from_fuse(fuse: &Fuse) -> Option<Self> {
        (!fuse.blown).then(|| {
            Self::closed_contact(format!("fuse {}", fuse.name), fuse.from_bus, fuse.to_bus)
        })
    }

    /// Standard tap model: yff = y/|t|², yft = −y/conj(t), ytf = −y/t,
    /// ytt = y.
    fn two_port_from_tap(
        label: String,
        from: BusId,
        to: BusId,
        y: Complex64,
        t: Complex64,
        tx_scalable: bool,
    ) -> Self {
        let yff = y / (t * t.conj());
        let yft = -y / t.conj();
        let ytf = -y / t;
        let ytt = y;
        Branch {
            label,
            from,
            to,
            kind: BranchKind::TwoPort {
                y: [yff.re, yff.im, yft.re, yft.im, ytf.re, ytf.im, ytt.re, ytt.im],
            },
            tx_scalable,
            tx_scale: 1.0,
            details: None,
        }
    }

    pub fn terminals(&self) -> (BusId, BusId) {
        (self.from, self.to)
    }

    fn model<'a>(&self, lib: &'a ModelLibrary) -> &'a crate::equations::CompiledModel {
        match self.kind {
            BranchKind::Pi { .. } => &lib.pi_line,
            BranchKind::TwoPort { .. } => &lib.two_port,
        }
    }

    fn constants(&self) -> Vec<f64> {
        match &self.kind {
            BranchKind::Pi { g, b, bsh_half } => vec![*g, *b, *bsh_half, self.tx_scale],
            BranchKind::TwoPort { y } => {
                let mut c = y.to_vec();
                c.push(self.tx_scale);
                c
            }
        }
    }

    fn scale_slot(&self) -> usize {
        match self.kind {
            BranchKind::Pi { .. } => 3,
            BranchKind::TwoPort { .. } => 8,
        }
    }
}

impl Stampable for Branch {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn assign(
        &mut self,
        registry: &NodeRegistry,
        _alloc: &mut VariableIndexAllocator,
        _optimization: bool,
    ) -> SolverResult<()> {
        let lib = ModelLibrary::get()?;
        let from = registry.vars(self.from)?;
        let to = registry.vars(self.to)?;
        let (lrf, lif) = from.dual_binding();
        let (lrt, lit) = to.dual_binding();
        self.details = Some(StampDetails::new(
            self.model(lib),
            self.constants(),
            vec![from.vr, from.vi, to.vr, to.vi],
            vec![lrf, lif, lrt, lit],
        ));
        Ok(())
    }

    fn stamp(&self, v: &[f64], out: &mut Vec<StampEntry>) -> SolverResult<()> {
        let details = require_details(&self.details, &self.label)?;
        let lib = ModelLibrary::get()?;
        emit_stamps(self.model(lib), details, v, out);
        Ok(())
    }

    fn connections(&self) -> Vec<(BusId, BusId)> {
        vec![(self.from, self.to)]
    }

    fn set_tx_scale(&mut self, scale: f64) {
        if !self.tx_scalable {
            return;
        }
        self.tx_scale = scale;
        let slot = self.scale_slot();
        if let Some(details) = &mut self.details {
            details.set_constant(slot, scale);
        }
    }
}

// ---------------------------------------------------------------------------
// Infeasibility current source

#[derive(Debug, Clone)]
pub struct InfeasibilitySource {
    bus: BusId,
    current_ix: Option<(VarIndex, VarIndex)>,
    details: Option<StampDetails>,
}

impl InfeasibilitySource {
    pub fn new(bus: &Bus) -> Self {
        InfeasibilitySource {
            bus: bus.id,
            current_ix: None,
            details: None,
        }
    }

    pub fn bus(&self) -> BusId {
        self.bus
    }

    pub fn current_indices(&self) -> Option<(VarIndex, VarIndex)> {
        self.current_ix
    }
}

impl Stampable for InfeasibilitySource {
    fn label(&self) -> String {
        format!("infeasibility source at bus {}", self.bus.value())
    }

    fn assign(
        &mut self,
        registry: &NodeRegistry,
        _alloc: &mut VariableIndexAllocator,
        optimization: bool,
    ) -> SolverResult<()> {
        if !optimization {
            return Err(SolverError::Config(
                "infeasibility sources require optimization mode".into(),
            ));
        }
        let lib = ModelLibrary::get()?;
        let bus = registry.vars(self.bus)?;
        let (iir, iii) = match (bus.iir, bus.iii) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(SolverError::Network(format!(
                    "bus {} has no infeasibility current variables",
                    self.bus.value()
                )))
            }
        };
        self.current_ix = Some((iir, iii));
        let (lr, li) = bus.dual_binding();
        self.details = Some(StampDetails::new(
            &lib.infeasibility,
            vec![],
            vec![bus.vr, bus.vi, iir, iii],
            vec![lr, li],
        ));
        Ok(())
    }

    fn stamp(&self, v: &[f64], out: &mut Vec<StampEntry>) -> SolverResult<()> {
        let details = require_details(&self.details, &self.label())?;
        let lib = ModelLibrary::get()?;
        emit_stamps(&lib.infeasibility, details, v, out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amps_core::{LineId, LoadId, SlackId, SwitchId};

    fn registry_with_buses(n: usize, optimization: bool) -> (NodeRegistry, VariableIndexAllocator) {
        let mut alloc = VariableIndexAllocator::new();
        let mut registry = NodeRegistry::new();
        for i in 0..n {
            registry.allocate_bus(&mut alloc, BusId::new(i), optimization, optimization);
        }
        (registry, alloc)
    }

    #[test]
    fn test_slack_assignment_allocates_currents() {
        let (registry, mut alloc) = registry_with_buses(1, false);
        let mut slack = SlackSource::new(Slack {
            id: SlackId::new(0),
            name: "s1".into(),
            bus: BusId::new(0),
            voltage_pu: 1.02,
            angle_rad: 0.0,
        });
        slack.assign(&registry, &mut alloc, false).unwrap();
        let (isr, isi) = slack.current_indices().unwrap();
        assert_eq!(alloc.kind(isr), VarKind::DeviceCurrent);
        assert_eq!(alloc.kind(isi), VarKind::DeviceCurrent);

        let mut v = vec![0.0; alloc.len()];
        slack.seed(&mut v);
        assert!((v[0] - 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_line_stamp_couples_both_buses() {
        let (registry, mut alloc) = registry_with_buses(2, false);
        let line = Line::new(
            LineId::new(0),
            "l1",
            BusId::new(0),
            BusId::new(1),
            0.01,
            0.1,
        );
        let mut branch = Branch::from_line(&line);
        branch.assign(&registry, &mut alloc, false).unwrap();

        let v = vec![1.0, 0.0, 0.98, -0.02];
        let mut out = Vec::new();
        branch.stamp(&v, &mut out).unwrap();
        let mut rows: Vec<usize> = out
            .iter()
            .filter_map(|e| match e {
                StampEntry::Residual { row, .. } => Some(*row),
                _ => None,
            })
            .collect();
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 1, 2, 3]);

        assert_eq!(branch.connections(), vec![(BusId::new(0), BusId::new(1))]);
        let residuals = branch.calculate_residuals(&v).unwrap();
        assert_eq!(residuals.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        // Without charging, the series current leaves one end and enters
        // the other, so the real rows cancel.
        assert!((residuals[&0] + residuals[&2]).abs() < 1e-12);
    }

    #[test]
    fn test_open_switch_produces_no_branch() {
        let sw = Switch {
            id: SwitchId::new(0),
            name: "sw1".into(),
            from_bus: BusId::new(0),
            to_bus: BusId::new(1),
            closed: false,
        };
        assert!(Branch::from_switch(&sw).is_none());
    }

    #[test]
    fn test_tx_scale_only_affects_scalable_branches() {
        let (registry, mut alloc) = registry_with_buses(2, false);
        let line = Line::new(
            LineId::new(0),
            "l1",
            BusId::new(0),
            BusId::new(1),
            0.0,
            0.5,
        );
        let mut branch = Branch::from_line(&line);
        branch.assign(&registry, &mut alloc, false).unwrap();
        branch.set_tx_scale(3.0);

        let mut contact =
            Branch::closed_contact("sw".into(), BusId::new(0), BusId::new(1));
        contact.assign(&registry, &mut alloc, false).unwrap();
        contact.set_tx_scale(3.0);

        let v = vec![1.0, 0.0, 0.5, 0.0];
        let mut line_out = Vec::new();
        branch.stamp(&v, &mut line_out).unwrap();
        let mut contact_out = Vec::new();
        contact.stamp(&v, &mut contact_out).unwrap();

        // Line: y = 1/(j0.5) = -j2, scaled by 3. Residual at row 0 is
        // 3·(−b·(Vif−Vit)) with b = −2: 3·2·0 = 0; row 1: 3·(b·(Vrf−Vrt)) = −3.
        let r1 = line_out
            .iter()
            .find_map(|e| match e {
                StampEntry::Residual { row: 1, value } => Some(*value),
                _ => None,
            })
            .unwrap();
        assert!((r1 - (-3.0)).abs() < 1e-9);

        // Contact residual unaffected by the scale call: G·(Vrf−Vrt).
        let c0 = contact_out
            .iter()
            .find_map(|e| match e {
                StampEntry::Residual { row: 0, value } => Some(*value),
                _ => None,
            })
            .unwrap();
        assert!((c0 - G_CLOSED * 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unassigned_stamp_is_an_error() {
        let load = ConstantPowerLoad::new(Load {
            id: LoadId::new(0),
            name: "ld1".into(),
            bus: BusId::new(0),
            active_power_pu: 0.5,
            reactive_power_pu: 0.1,
        });
        let mut out = Vec::new();
        assert!(matches!(
            load.stamp(&[1.0, 0.0], &mut out),
            Err(SolverError::UnboundSymbol(_))
        ));
    }

    #[test]
    fn test_infeasibility_requires_optimization() {
        let (registry, mut alloc) = registry_with_buses(1, false);
        let bus = Bus::new(BusId::new(0), "b0");
        let mut src = InfeasibilitySource::new(&bus);
        assert!(matches!(
            src.assign(&registry, &mut alloc, false),
            Err(SolverError::Config(_))
        ));
    }
}
