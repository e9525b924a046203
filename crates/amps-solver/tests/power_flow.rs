use amps_core::{
    Bus, BusId, GenId, Generator, Line, LineId, Load, LoadId, Network, Node, Edge, Slack, SlackId,
    Switch, SwitchId,
};
use amps_solver::{MatrixRepr, PowerFlow, SolverOptions};

/// Four buses: slack at 0, PV generator at 1, loads at 2 and 3, meshed by
/// four lines. Small but enough to exercise every row kind at once.
fn four_bus_network() -> Network {
    let mut network = Network::new();
    let mut bus_ix = Vec::new();
    for i in 0..4 {
        bus_ix.push(
            network
                .graph
                .add_node(Node::Bus(Bus::new(BusId::new(i), &format!("bus{i}")))),
        );
    }

    network.graph.add_node(Node::Slack(Slack {
        id: SlackId::new(0),
        name: "slack".into(),
        bus: BusId::new(0),
        voltage_pu: 1.02,
        angle_rad: 0.0,
    }));

    network.graph.add_node(Node::Gen(Generator::new(
        GenId::new(0),
        "gen1",
        BusId::new(1),
    )
    .with_dispatch(0.5, 1.01)));

    for (i, bus, p, q) in [(0usize, 2usize, 0.6, 0.2), (1, 3, 0.4, 0.15)] {
        network.graph.add_node(Node::Load(Load {
            id: LoadId::new(i),
            name: format!("load{bus}"),
            bus: BusId::new(bus),
            active_power_pu: p,
            reactive_power_pu: q,
        }));
    }

    for (i, (f, t)) in [(0, 1), (1, 2), (2, 3), (0, 2)].iter().enumerate() {
        network.graph.add_edge(
            bus_ix[*f],
            bus_ix[*t],
            Edge::Line(Line::new(
                LineId::new(i),
                &format!("line{f}{t}"),
                BusId::new(*f),
                BusId::new(*t),
                0.01,
                0.06,
            )),
        );
    }

    network
}

/// Two buses over a purely resistive line have a closed-form solution:
/// with V1 = 1, r = 0.05 and a 0.95 pu resistive load, the KCL equation
/// a·(1 − a) = r·P is satisfied exactly by V2 = 0.95 + j0.
#[test]
fn test_two_bus_analytic_reference() {
    let mut network = Network::new();
    let b0 = network
        .graph
        .add_node(Node::Bus(Bus::new(BusId::new(0), "bus0")));
    let b1 = network
        .graph
        .add_node(Node::Bus(Bus::new(BusId::new(1), "bus1")));
    network.graph.add_node(Node::Slack(Slack {
        id: SlackId::new(0),
        name: "slack".into(),
        bus: BusId::new(0),
        voltage_pu: 1.0,
        angle_rad: 0.0,
    }));
    network.graph.add_node(Node::Load(Load {
        id: LoadId::new(0),
        name: "load1".into(),
        bus: BusId::new(1),
        active_power_pu: 0.95,
        reactive_power_pu: 0.0,
    }));
    network.graph.add_edge(
        b0,
        b1,
        Edge::Line(Line::new(
            LineId::new(0),
            "line01",
            BusId::new(0),
            BusId::new(1),
            0.05,
            0.0,
        )),
    );

    let report = PowerFlow::new(SolverOptions::default())
        .solve(&network)
        .unwrap();
    assert!(report.converged);
    assert!(report.iterations < 20);
    let vm = report.voltage_magnitude(BusId::new(1)).unwrap();
    let va = report.voltage_angle(BusId::new(1)).unwrap();
    assert!((vm - 0.95).abs() < 1e-4, "magnitude {vm}");
    assert!(va.abs() < 1e-4, "angle {va}");
}

#[test]
fn test_four_bus_converges() {
    let network = four_bus_network();
    let report = PowerFlow::new(SolverOptions::default())
        .solve(&network)
        .unwrap();

    assert!(report.converged, "did not converge: {report:?}");
    assert!(report.iterations < 30);
    assert!(report.max_residual < 1e-4);

    // Slack bus pinned exactly, PV bus held at its setpoint.
    let v0 = report.voltage_magnitude(BusId::new(0)).unwrap();
    assert!((v0 - 1.02).abs() < 1e-6);
    let v1 = report.voltage_magnitude(BusId::new(1)).unwrap();
    assert!((v1 - 1.01).abs() < 1e-4);

    // Load buses sag below the sources but stay in a sane band.
    for bus in [2, 3] {
        let vm = report.voltage_magnitude(BusId::new(bus)).unwrap();
        assert!(vm < 1.02 && vm > 0.85, "bus {bus} at {vm}");
    }
}

#[test]
fn test_flat_and_seeded_starts_agree() {
    let mut network = four_bus_network();
    // Perturb the stored bus voltage estimates so the two starts differ.
    for node in network.graph.node_weights_mut() {
        if let Node::Bus(bus) = node {
            bus.voltage_pu = 0.97;
            bus.angle_rad = -0.02;
        }
    }

    let flat = PowerFlow::new(SolverOptions::default().with_flat_start(true))
        .solve(&network)
        .unwrap();
    let seeded = PowerFlow::new(SolverOptions::default().with_flat_start(false))
        .solve(&network)
        .unwrap();

    assert!(flat.converged && seeded.converged);
    for bus in 0..4 {
        let id = BusId::new(bus);
        let d = (flat.bus_voltage[&id] - seeded.bus_voltage[&id]).norm();
        assert!(d < 1e-5, "bus {bus} differs by {d}");
    }
}

#[test]
fn test_continuation_matches_direct_solve() {
    let network = four_bus_network();
    let direct = PowerFlow::new(SolverOptions::default())
        .solve(&network)
        .unwrap();
    let stepped = PowerFlow::new(SolverOptions::default().with_tx_stepping(5))
        .solve(&network)
        .unwrap();

    assert!(stepped.converged);
    assert!(stepped.failed_at_tx.is_none());
    for bus in 0..4 {
        let id = BusId::new(bus);
        let d = (direct.bus_voltage[&id] - stepped.bus_voltage[&id]).norm();
        assert!(d < 1e-5, "bus {bus} differs by {d}");
    }
}

#[test]
fn test_dense_and_sparse_agree() {
    let network = four_bus_network();
    let sparse = PowerFlow::new(SolverOptions::default().with_matrix_repr(MatrixRepr::Sparse))
        .solve(&network)
        .unwrap();
    let dense = PowerFlow::new(SolverOptions::default().with_matrix_repr(MatrixRepr::Dense))
        .solve(&network)
        .unwrap();

    assert!(sparse.converged && dense.converged);
    for bus in 0..4 {
        let id = BusId::new(bus);
        let d = (sparse.bus_voltage[&id] - dense.bus_voltage[&id]).norm();
        assert!(d < 1e-8);
    }
}

#[test]
fn test_voltage_limiting_still_converges() {
    let network = four_bus_network();
    let report = PowerFlow::new(SolverOptions::default().with_voltage_limiting(true))
        .solve(&network)
        .unwrap();
    assert!(report.converged);
    let v0 = report.voltage_magnitude(BusId::new(0)).unwrap();
    assert!((v0 - 1.02).abs() < 1e-6);
}

/// Swapping a charged line's terminals must not change the solution; the
/// half-charging shunts are mirror images of each other at the two ends.
#[test]
fn test_charged_line_orientation_invariant() {
    let build = |from: usize, to: usize| {
        let mut network = Network::new();
        let b0 = network
            .graph
            .add_node(Node::Bus(Bus::new(BusId::new(0), "bus0")));
        let b1 = network
            .graph
            .add_node(Node::Bus(Bus::new(BusId::new(1), "bus1")));
        network.graph.add_node(Node::Slack(Slack {
            id: SlackId::new(0),
            name: "slack".into(),
            bus: BusId::new(0),
            voltage_pu: 1.0,
            angle_rad: 0.0,
        }));
        network.graph.add_node(Node::Load(Load {
            id: LoadId::new(0),
            name: "load1".into(),
            bus: BusId::new(1),
            active_power_pu: 0.4,
            reactive_power_pu: 0.1,
        }));
        let (nf, nt) = if from == 0 { (b0, b1) } else { (b1, b0) };
        network.graph.add_edge(
            nf,
            nt,
            Edge::Line(
                Line::new(
                    LineId::new(0),
                    "line01",
                    BusId::new(from),
                    BusId::new(to),
                    0.02,
                    0.08,
                )
                .with_charging(0.3),
            ),
        );
        network
    };

    let forward = PowerFlow::new(SolverOptions::default())
        .solve(&build(0, 1))
        .unwrap();
    let reversed = PowerFlow::new(SolverOptions::default())
        .solve(&build(1, 0))
        .unwrap();

    assert!(forward.converged && reversed.converged);
    for bus in 0..2 {
        let id = BusId::new(bus);
        let d = (forward.bus_voltage[&id] - reversed.bus_voltage[&id]).norm();
        assert!(d < 1e-6, "bus {bus} differs by {d}");
    }
}

#[test]
fn test_q_limit_trips_generator() {
    let mut network = Network::new();
    let b0 = network
        .graph
        .add_node(Node::Bus(Bus::new(BusId::new(0), "bus0")));
    let b1 = network
        .graph
        .add_node(Node::Bus(Bus::new(BusId::new(1), "bus1")));

    network.graph.add_node(Node::Slack(Slack {
        id: SlackId::new(0),
        name: "slack".into(),
        bus: BusId::new(0),
        voltage_pu: 1.0,
        angle_rad: 0.0,
    }));

    // Generator that would need far more than 0.02 pu reactive to hold
    // 1.05 pu against the reactive load at its bus.
    network.graph.add_node(Node::Gen(
        Generator::new(GenId::new(0), "gen1", BusId::new(1))
            .with_dispatch(0.3, 1.05)
            .with_q_limits(-0.02, 0.02),
    ));
    network.graph.add_node(Node::Load(Load {
        id: LoadId::new(0),
        name: "load1".into(),
        bus: BusId::new(1),
        active_power_pu: 0.5,
        reactive_power_pu: 0.4,
    }));

    network.graph.add_edge(
        b0,
        b1,
        Edge::Line(Line::new(
            LineId::new(0),
            "line01",
            BusId::new(0),
            BusId::new(1),
            0.01,
            0.1,
        )),
    );

    let report = PowerFlow::new(SolverOptions::default().with_q_limit_enforcement(true))
        .solve(&network)
        .unwrap();

    assert!(report.converged);
    assert_eq!(report.q_limited, vec![GenId::new(0)]);
    let q = report.generator_q[&GenId::new(0)];
    assert!((q - 0.02).abs() < 1e-6, "expected qmax, got {q}");
    // With Q pinned, the setpoint is no longer held.
    let v1 = report.voltage_magnitude(BusId::new(1)).unwrap();
    assert!(v1 < 1.05);
}

#[test]
fn test_infeasibility_currents_vanish_on_feasible_network() {
    let network = four_bus_network();
    let options = SolverOptions::default()
        .with_optimization(true)
        .with_infeasibility_analysis(true);
    let report = PowerFlow::new(options).solve(&network).unwrap();

    assert!(report.converged, "KKT solve failed: {report:?}");
    assert_eq!(report.infeasibility_current.len(), 4);
    assert!(
        report.infeasibility_norm() < 1e-8,
        "norm {}",
        report.infeasibility_norm()
    );

    // Voltages match the plain power-flow solution.
    let plain = PowerFlow::new(SolverOptions::default())
        .solve(&network)
        .unwrap();
    for bus in 0..4 {
        let id = BusId::new(bus);
        let d = (plain.bus_voltage[&id] - report.bus_voltage[&id]).norm();
        assert!(d < 1e-5, "bus {bus} differs by {d}");
    }
}

#[test]
fn test_closed_switch_ties_buses_together() {
    let mut network = Network::new();
    let b0 = network
        .graph
        .add_node(Node::Bus(Bus::new(BusId::new(0), "bus0")));
    let b1 = network
        .graph
        .add_node(Node::Bus(Bus::new(BusId::new(1), "bus1")));

    network.graph.add_node(Node::Slack(Slack {
        id: SlackId::new(0),
        name: "slack".into(),
        bus: BusId::new(0),
        voltage_pu: 1.0,
        angle_rad: 0.0,
    }));
    network.graph.add_node(Node::Load(Load {
        id: LoadId::new(0),
        name: "load1".into(),
        bus: BusId::new(1),
        active_power_pu: 0.2,
        reactive_power_pu: 0.05,
    }));
    network.graph.add_edge(
        b0,
        b1,
        Edge::Switch(Switch {
            id: SwitchId::new(0),
            name: "sw01".into(),
            from_bus: BusId::new(0),
            to_bus: BusId::new(1),
            closed: true,
        }),
    );

    let report = PowerFlow::new(SolverOptions::default())
        .solve(&network)
        .unwrap();
    assert!(report.converged);
    // A stiff closed contact keeps both ends at essentially one voltage.
    let d = (report.bus_voltage[&BusId::new(0)] - report.bus_voltage[&BusId::new(1)]).norm();
    assert!(d < 1e-4, "contact drop {d}");
}

#[test]
fn test_residual_map_is_small_everywhere() {
    let network = four_bus_network();
    let report = PowerFlow::new(SolverOptions::default())
        .solve(&network)
        .unwrap();
    assert!(report.converged);
    assert_eq!(report.state.len(), report.residuals.len());
    for (row, r) in report.residuals.iter().enumerate() {
        assert!(r.abs() < 1e-4, "row {row} residual {r}");
    }
}
