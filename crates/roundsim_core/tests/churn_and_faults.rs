//! Runs under edge churn and runs that fail mid-flight.

use roundsim_core::{
    Coordinator, GraphSpec, Node, Protocol, ProtocolKind, ReliabilityModel, SimError, SimResult,
    SimulationConfig, Station,
};

fn churn_coordinator(spec: &str, p: f64, model: ReliabilityModel) -> Coordinator {
    let topology = spec.parse::<GraphSpec>().unwrap().build(p).unwrap();
    let config = SimulationConfig::default()
        .with_reliability(model)
        .with_seed(17);
    Coordinator::new(topology, config).unwrap()
}

#[test]
fn remover_with_zero_probability_matches_static_run() {
    let mut coordinator = churn_coordinator("path,6", 0.0, ReliabilityModel::EdgeRemover);
    let stats = coordinator
        .run_simulation(ProtocolKind::MinPropagation)
        .unwrap();
    assert_eq!(stats.nof_rounds, 5);
    assert_eq!(stats.all_sent_msgs, stats.all_received_msgs);
    for station in &stats.stations {
        assert_eq!(station.result, stats.result);
    }
    assert_eq!(coordinator.into_topology().edge_count(), 5);
}

#[test]
fn remover_with_certain_failure_cuts_every_edge_before_round_zero() {
    let length = 4;
    let mut coordinator =
        churn_coordinator(&format!("path,{length}"), 1.0, ReliabilityModel::EdgeRemover);
    let stats = coordinator
        .run_simulation(ProtocolKind::MinPropagation)
        .unwrap();

    // Only the initial broadcast travels; every later propagate finds no
    // neighbors.
    assert_eq!(stats.all_sent_msgs, 2 * (length - 1));
    assert_eq!(stats.all_received_msgs, stats.all_sent_msgs);
    assert_eq!(stats.nof_rounds, length - 1);

    let topology = coordinator.into_topology();
    assert_eq!(topology.edge_count(), 0);
    assert_eq!(topology.original_edges().len(), length - 1);
}

#[test]
fn remover_adder_with_zero_probability_keeps_topology() {
    let mut coordinator =
        churn_coordinator("grid,3,3", 0.0, ReliabilityModel::EdgeRemoverAdder);
    let stats = coordinator.run_simulation(ProtocolKind::Hll).unwrap();
    assert_eq!(stats.nof_rounds, 4);
    assert_eq!(stats.all_sent_msgs, stats.all_received_msgs);
    assert_eq!(coordinator.topology().edge_count(), 12);
}

#[test]
fn churn_run_finishes_under_partial_failure() {
    let mut coordinator =
        churn_coordinator("hypercube,5", 0.3, ReliabilityModel::EdgeRemoverAdder);
    let stats = coordinator.run_simulation(ProtocolKind::Hll).unwrap();
    assert_eq!(stats.size, 32);
    assert_eq!(stats.nof_rounds, 5);
    assert!(stats.stations.iter().all(|s| s.nof_rounds == 5));
}

/// Floods every round and fails at one node in one round.
struct Failing {
    node: usize,
    round: usize,
    panic: bool,
    /// Broadcasts sent during round 0 setup.
    greetings: usize,
}

impl Protocol for Failing {
    type Context = ();

    fn name(&self) -> &'static str {
        "failing"
    }

    fn initial_data(&self, station: &mut Station<'_>, _ctx: &mut ()) {
        station.set_current_data(vec![station.id() as f64]);
    }

    fn on_initialize(&self, station: &mut Station<'_>, _ctx: &mut ()) -> SimResult<()> {
        for _ in 0..self.greetings {
            station.broadcast()?;
        }
        Ok(())
    }

    fn on_data_receive(&self, station: &mut Station<'_>, _ctx: &mut ()) -> SimResult<()> {
        while station.dequeue().is_some() {}
        if station.id() == self.node && station.round() == self.round {
            if self.panic {
                panic!("injected panic");
            }
            return Err(SimError::RuntimeFault {
                node: station.id(),
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    fn on_data_propagate(&self, station: &mut Station<'_>, _ctx: &mut ()) -> SimResult<()> {
        station.synchronized_broadcast()
    }

    fn stop_condition(&self, station: &Station<'_>, _ctx: &()) -> bool {
        station.round() < 6
    }

    fn on_finalize(&self, _station: &mut Station<'_>, _ctx: &mut ()) -> SimResult<()> {
        Ok(())
    }

    fn station_exact_result(&self, _node: &Node, _ctx: &()) -> f64 {
        0.0
    }

    fn global_exact_result(&self, _nodes: &[Node]) -> f64 {
        0.0
    }
}

#[test]
fn protocol_fault_aborts_the_whole_run() {
    let topology = "clique,6".parse::<GraphSpec>().unwrap().build(0.0).unwrap();
    let mut coordinator = Coordinator::new(topology, SimulationConfig::default()).unwrap();
    let protocol = Failing {
        node: 2,
        round: 1,
        panic: false,
        greetings: 1,
    };
    match coordinator.run_with(&protocol) {
        Err(SimError::RuntimeFault { node, reason }) => {
            assert_eq!(node, 2);
            assert_eq!(reason, "injected fault");
        }
        other => panic!("expected runtime fault, got {other:?}"),
    }
    assert!(coordinator.nodes().is_empty());
}

#[test]
fn protocol_panic_aborts_the_whole_run() {
    let topology = "path,5".parse::<GraphSpec>().unwrap().build(0.0).unwrap();
    let mut coordinator = Coordinator::new(topology, SimulationConfig::default()).unwrap();
    let protocol = Failing {
        node: 3,
        round: 2,
        panic: true,
        greetings: 1,
    };
    let err = coordinator.run_with(&protocol).unwrap_err();
    assert!(!err.is_cascade());
    assert!(matches!(err, SimError::RuntimeFault { node: 3, .. }));
}

#[test]
fn fault_under_churn_releases_the_updater() {
    let topology = "grid,3,3".parse::<GraphSpec>().unwrap().build(0.5).unwrap();
    let config = SimulationConfig::default()
        .with_reliability(ReliabilityModel::EdgeRemoverAdder)
        .with_seed(2);
    let mut coordinator = Coordinator::new(topology, config).unwrap();
    let protocol = Failing {
        node: 0,
        round: 3,
        panic: false,
        greetings: 1,
    };
    let err = coordinator.run_with(&protocol).unwrap_err();
    assert!(matches!(err, SimError::RuntimeFault { node: 0, .. }));
}

#[test]
fn second_broadcast_before_a_drain_overflows_the_inbox() {
    let topology = "clique,4".parse::<GraphSpec>().unwrap().build(0.0).unwrap();
    let mut coordinator = Coordinator::new(topology, SimulationConfig::default()).unwrap();
    let protocol = Failing {
        node: usize::MAX,
        round: 0,
        panic: false,
        greetings: 2,
    };
    match coordinator.run_with(&protocol) {
        Err(SimError::RuntimeFault { reason, .. }) => {
            assert!(reason.ends_with("is full"), "unexpected reason: {reason}");
        }
        other => panic!("expected an inbox overflow, got {other:?}"),
    }
}
