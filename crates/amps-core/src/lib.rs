//! # amps-core: Power Network Modeling Core
//!
//! Fundamental data structures for equivalent-circuit power flow analysis.
//!
//! Networks are modeled as **undirected multigraphs** where:
//! - **Nodes**: buses and the shunt-connected devices attached to them
//!   (slack sources, generators, loads, capacitors)
//! - **Edges**: series-connected devices (lines, transformers, regulators,
//!   switches, fuses)
//!
//! All electrical parameters are per-unit on the system base; angles are in
//! radians. Importers (RAW, GLM, taxonomy feeders) live outside this crate
//! and populate a [`Network`] from external data.
//!
//! ## Quick Start
//!
//! ```rust
//! use amps_core::*;
//!
//! let mut network = Network::new();
//!
//! let b1 = network.graph.add_node(Node::Bus(Bus::new(BusId::new(1), "Bus 1")));
//! let b2 = network.graph.add_node(Node::Bus(Bus::new(BusId::new(2), "Bus 2")));
//!
//! network.graph.add_node(Node::Slack(Slack {
//!     id: SlackId::new(1),
//!     name: "Swing".to_string(),
//!     bus: BusId::new(1),
//!     voltage_pu: 1.0,
//!     angle_rad: 0.0,
//! }));
//!
//! network.graph.add_node(Node::Load(Load {
//!     id: LoadId::new(1),
//!     name: "Load 2".to_string(),
//!     bus: BusId::new(2),
//!     active_power_pu: 0.5,
//!     reactive_power_pu: 0.1,
//! }));
//!
//! network.graph.add_edge(b1, b2, Edge::Line(Line::new(
//!     LineId::new(1), "Line 1-2", BusId::new(1), BusId::new(2), 0.01, 0.1,
//! )));
//! ```

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{AmpsError, AmpsResult};
pub use petgraph::graph::NodeIndex;

/// Defines the newtype ID wrappers shared by every network element.
macro_rules! element_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub fn new(value: usize) -> Self {
                $name(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
    };
}

element_id!(
    /// Identifier of a bus (electrical node).
    BusId
);
element_id!(
    /// Identifier of a slack (swing) voltage source.
    SlackId
);
element_id!(
    /// Identifier of a PV generator.
    GenId
);
element_id!(
    /// Identifier of a constant-power load.
    LoadId
);
element_id!(
    /// Identifier of a transmission line.
    LineId
);
element_id!(
    /// Identifier of a two-winding transformer.
    TransformerId
);
element_id!(
    /// Identifier of a voltage regulator.
    RegulatorId
);
element_id!(
    /// Identifier of a switch.
    SwitchId
);
element_id!(
    /// Identifier of a fuse.
    FuseId
);
element_id!(
    /// Identifier of a shunt capacitor bank.
    CapacitorId
);

/// An electrical node of the network.
///
/// Buses carry the voltage unknowns; everything else references its bus by ID,
/// never by ownership, so buses outlive the devices attached to them for the
/// duration of a run.
#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Base voltage in kilovolts (informational, for post-processing)
    pub base_kv: f64,
    /// Initial voltage magnitude estimate (per-unit)
    pub voltage_pu: f64,
    /// Initial voltage angle estimate (radians)
    pub angle_rad: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            base_kv: 0.0,
            voltage_pu: 1.0,
            angle_rad: 0.0,
        }
    }
}

impl Bus {
    pub fn new(id: BusId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Slack (swing) source: holds its bus at a fixed complex voltage and absorbs
/// the system generation/load mismatch through its injected current.
#[derive(Debug, Clone)]
pub struct Slack {
    pub id: SlackId,
    pub name: String,
    pub bus: BusId,
    /// Voltage magnitude setpoint (per-unit)
    pub voltage_pu: f64,
    /// Voltage angle setpoint (radians)
    pub angle_rad: f64,
}

/// PV generator: fixed active power injection and regulated voltage magnitude;
/// reactive power is solved for, optionally within [qmin, qmax].
#[derive(Debug, Clone)]
pub struct Generator {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    /// Active power injection (per-unit)
    pub active_power_pu: f64,
    /// Initial reactive power estimate (per-unit)
    pub reactive_power_pu: f64,
    /// Regulated voltage magnitude (per-unit)
    pub voltage_setpoint_pu: f64,
    /// Minimum reactive power output (per-unit)
    pub qmin_pu: f64,
    /// Maximum reactive power output (per-unit)
    pub qmax_pu: f64,
    /// In-service status
    pub status: bool,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            id: GenId(0),
            name: String::new(),
            bus: BusId(0),
            active_power_pu: 0.0,
            reactive_power_pu: 0.0,
            voltage_setpoint_pu: 1.0,
            qmin_pu: f64::NEG_INFINITY,
            qmax_pu: f64::INFINITY,
            status: true,
        }
    }
}

impl Generator {
    pub fn new(id: GenId, name: &str, bus: BusId) -> Self {
        Self {
            id,
            name: name.to_string(),
            bus,
            ..Self::default()
        }
    }

    /// Set reactive power limits (per-unit).
    pub fn with_q_limits(mut self, qmin: f64, qmax: f64) -> Self {
        self.qmin_pu = qmin;
        self.qmax_pu = qmax;
        self
    }

    /// Set active power injection and voltage setpoint.
    pub fn with_dispatch(mut self, p_pu: f64, vset_pu: f64) -> Self {
        self.active_power_pu = p_pu;
        self.voltage_setpoint_pu = vset_pu;
        self
    }
}

/// Constant-power (PQ) load.
#[derive(Debug, Clone)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    /// Active power demand (per-unit)
    pub active_power_pu: f64,
    /// Reactive power demand (per-unit)
    pub reactive_power_pu: f64,
}

/// Shunt capacitor bank (or reactor, for negative susceptance).
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub id: CapacitorId,
    pub name: String,
    pub bus: BusId,
    /// Shunt susceptance (per-unit; positive = capacitive)
    pub susceptance_pu: f64,
    /// In-service status
    pub status: bool,
}

/// Transmission line, π-equivalent.
#[derive(Debug, Clone)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (per-unit)
    pub resistance: f64,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Total line charging susceptance (per-unit, split half/half)
    pub charging_b: f64,
    /// Operational status flag
    pub status: bool,
}

impl Line {
    pub fn new(
        id: LineId,
        name: &str,
        from_bus: BusId,
        to_bus: BusId,
        resistance: f64,
        reactance: f64,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            from_bus,
            to_bus,
            resistance,
            reactance,
            charging_b: 0.0,
            status: true,
        }
    }

    /// Attach total line charging susceptance (per-unit).
    pub fn with_charging(mut self, b_pu: f64) -> Self {
        self.charging_b = b_pu;
        self
    }
}

/// Two-winding transformer with off-nominal tap and optional phase shift.
///
/// The tap is applied on the from side; winding impedance derivation from
/// nameplate data is the importer's job.
#[derive(Debug, Clone)]
pub struct Transformer {
    pub id: TransformerId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (per-unit)
    pub resistance: f64,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Off-nominal tap magnitude
    pub tap_ratio: f64,
    /// Phase shift from from_bus to to_bus (radians)
    pub phase_shift_rad: f64,
    /// Operational status flag
    pub status: bool,
}

impl Default for Transformer {
    fn default() -> Self {
        Self {
            id: TransformerId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            resistance: 0.0,
            reactance: 0.0,
            tap_ratio: 1.0,
            phase_shift_rad: 0.0,
            status: true,
        }
    }
}

/// Step-voltage regulator: a tap-changing series element. The tap position is
/// fixed for the duration of one solve; tap control loops live outside the
/// solver core.
#[derive(Debug, Clone)]
pub struct Regulator {
    pub id: RegulatorId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (per-unit)
    pub resistance: f64,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Current tap magnitude
    pub tap_ratio: f64,
    /// Operational status flag
    pub status: bool,
}

/// Switch: an ideal series connection that is either closed or open.
#[derive(Debug, Clone)]
pub struct Switch {
    pub id: SwitchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    pub closed: bool,
}

/// Fuse: a switch whose open state is called "blown".
#[derive(Debug, Clone)]
pub struct Fuse {
    pub id: FuseId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    pub blown: bool,
}

/// Node kinds of the network graph.
#[derive(Debug, Clone)]
pub enum Node {
    Bus(Bus),
    Slack(Slack),
    Gen(Generator),
    Load(Load),
    Capacitor(Capacitor),
}

/// Edge kinds of the network graph.
#[derive(Debug, Clone)]
pub enum Edge {
    Line(Line),
    Transformer(Transformer),
    Regulator(Regulator),
    Switch(Switch),
    Fuse(Fuse),
}

impl Node {
    /// Returns a human-readable label for the node.
    pub fn label(&self) -> &str {
        match self {
            Node::Bus(b) => &b.name,
            Node::Slack(s) => &s.name,
            Node::Gen(g) => &g.name,
            Node::Load(l) => &l.name,
            Node::Capacitor(c) => &c.name,
        }
    }
}

impl Edge {
    /// Returns a human-readable label for the edge.
    pub fn label(&self) -> &str {
        match self {
            Edge::Line(l) => &l.name,
            Edge::Transformer(t) => &t.name,
            Edge::Regulator(r) => &r.name,
            Edge::Switch(s) => &s.name,
            Edge::Fuse(f) => &f.name,
        }
    }

    /// The pair of buses this edge connects.
    pub fn terminals(&self) -> (BusId, BusId) {
        match self {
            Edge::Line(l) => (l.from_bus, l.to_bus),
            Edge::Transformer(t) => (t.from_bus, t.to_bus),
            Edge::Regulator(r) => (r.from_bus, r.to_bus),
            Edge::Switch(s) => (s.from_bus, s.to_bus),
            Edge::Fuse(f) => (f.from_bus, f.to_bus),
        }
    }
}

/// The core power network graph.
#[derive(Debug, Default)]
pub struct Network {
    pub graph: Graph<Node, Edge, Undirected>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
        }
    }

    /// All buses, sorted by ID.
    pub fn buses(&self) -> Vec<&Bus> {
        let mut buses: Vec<&Bus> = self
            .graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Bus(b) => Some(b),
                _ => None,
            })
            .collect();
        buses.sort_by_key(|b| b.id);
        buses
    }

    /// All slack sources.
    pub fn slacks(&self) -> Vec<&Slack> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Slack(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// All generators.
    pub fn generators(&self) -> Vec<&Generator> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Gen(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    /// All loads.
    pub fn loads(&self) -> Vec<&Load> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Load(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    /// All capacitor banks.
    pub fn capacitors(&self) -> Vec<&Capacitor> {
        self.graph
            .node_weights()
            .filter_map(|n| match n {
                Node::Capacitor(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// All series elements (every edge kind).
    pub fn series_elements(&self) -> Vec<&Edge> {
        self.graph.edge_weights().collect()
    }

    /// Look up a bus by ID.
    pub fn bus(&self, id: BusId) -> Option<&Bus> {
        self.graph.node_weights().find_map(|n| match n {
            Node::Bus(b) if b.id == id => Some(b),
            _ => None,
        })
    }

    /// Compute basic statistics about the network.
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();
        for node in self.graph.node_weights() {
            match node {
                Node::Bus(_) => stats.num_buses += 1,
                Node::Slack(_) => stats.num_slacks += 1,
                Node::Gen(g) => {
                    stats.num_gens += 1;
                    stats.total_gen_pu += g.active_power_pu;
                }
                Node::Load(l) => {
                    stats.num_loads += 1;
                    stats.total_load_pu += l.active_power_pu;
                }
                Node::Capacitor(_) => stats.num_capacitors += 1,
            }
        }
        stats.num_series = self.graph.edge_count();
        stats
    }

    /// Validate network data for issues that cause solver failures.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();

        if stats.num_buses == 0 {
            diag.add_error("structure", "Network has no buses");
            return;
        }

        if stats.num_slacks == 0 {
            diag.add_error("structure", "Network has no slack source");
        } else if stats.num_slacks > 1 {
            diag.add_warning(
                "structure",
                &format!(
                    "Network has {} slack sources; expected one per island",
                    stats.num_slacks
                ),
            );
        }

        if stats.num_loads == 0 {
            diag.add_warning("structure", "Network has no loads");
        }

        if stats.num_series == 0 && stats.num_buses > 1 {
            diag.add_error("structure", "Network has multiple buses but no series elements");
        }

        // Every device must reference an existing bus.
        for node in self.graph.node_weights() {
            let referenced = match node {
                Node::Bus(_) => continue,
                Node::Slack(s) => vec![s.bus],
                Node::Gen(g) => vec![g.bus],
                Node::Load(l) => vec![l.bus],
                Node::Capacitor(c) => vec![c.bus],
            };
            for bus in referenced {
                if self.bus(bus).is_none() {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("Device references non-existent bus {}", bus.value()),
                        node.label(),
                    );
                }
            }
        }
        for edge in self.graph.edge_weights() {
            let (f, t) = edge.terminals();
            for bus in [f, t] {
                if self.bus(bus).is_none() {
                    diag.add_error_with_entity(
                        "reference",
                        &format!("Series element references non-existent bus {}", bus.value()),
                        edge.label(),
                    );
                }
            }
        }
    }
}

/// Statistics about a network's size.
#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_slacks: usize,
    pub num_gens: usize,
    pub num_loads: usize,
    pub num_capacitors: usize,
    pub num_series: usize,
    pub total_gen_pu: f64,
    pub total_load_pu: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} series elements, {} gens ({:.2} pu), {} loads ({:.2} pu)",
            self.num_buses, self.num_series, self.num_gens, self.total_gen_pu, self.num_loads,
            self.total_load_pu
        )
    }
}
