//! Drives one simulation run from node creation to aggregated statistics.

use std::io;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Instant;

use crossbeam::channel;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::barrier::RoundBarrier;
use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::mailbox::Mailbox;
use crate::node::{Abort, Node, NodeTask};
use crate::protocol::{CountDistinct, MinPropagation, Protocol, ProtocolKind};
use crate::reliability::{EdgeUpdater, UpdaterReport};
use crate::router::{read_topology, Router};
use crate::stats::SimulationStats;
use crate::topology::Topology;

/// Offset between the run seed and the updater's RNG seed.
const UPDATER_SEED_OFFSET: u64 = 0xDEAD_BEEF;

/// Owns the topology, the node arena and the round barrier for one run.
#[derive(Debug)]
pub struct Coordinator {
    topology: RwLock<Topology>,
    nodes: Vec<Node>,
    barrier: RoundBarrier,
    config: SimulationConfig,
    seed: u64,
    finished: bool,
    /// Threads a run may start before spawning fails.
    thread_limit: usize,
}

impl Coordinator {
    /// Build one node per vertex and a barrier sized to the vertex count.
    pub fn new(topology: Topology, config: SimulationConfig) -> SimResult<Self> {
        let order = topology.order();
        if order == 0 {
            return Err(SimError::Configuration(
                "topology has no vertices".to_string(),
            ));
        }

        let diameter = topology.diameter();
        let nodes = (0..order)
            .map(|id| Node::new(id, topology.degree(id)))
            .collect();
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());

        info!(
            vertices = order,
            edges = topology.edge_count(),
            diameter,
            seed,
            reliability = ?config.reliability_model,
            "coordinator ready"
        );

        Ok(Self {
            topology: RwLock::new(topology),
            nodes,
            barrier: RoundBarrier::new(order),
            config,
            seed,
            finished: false,
            thread_limit: usize::MAX,
        })
    }

    /// Resolve `name` in the protocol registry and run it.
    pub fn run_named(&mut self, name: &str) -> SimResult<SimulationStats> {
        let kind: ProtocolKind = name.parse()?;
        self.run_simulation(kind)
    }

    pub fn run_simulation(&mut self, kind: ProtocolKind) -> SimResult<SimulationStats> {
        match kind {
            ProtocolKind::Hll => self.run_with(&CountDistinct::default()),
            ProtocolKind::MinPropagation => self.run_with(&MinPropagation),
        }
    }

    /// Run `protocol` on every node until all of them finish.
    ///
    /// A coordinator runs exactly once. If any node task fails the whole run
    /// fails with the first root-cause error and the node arena is left
    /// empty.
    pub fn run_with<P: Protocol>(&mut self, protocol: &P) -> SimResult<SimulationStats> {
        if self.finished {
            return Err(SimError::Configuration(
                "coordinator has already run a simulation".to_string(),
            ));
        }
        self.finished = true;

        let n = self.nodes.len();
        let seed = self.seed;
        let barrier = &self.barrier;
        let capacities: Vec<usize> = {
            let topology = read_topology(&self.topology);
            let original = topology.original_degrees();
            original
                .iter()
                .enumerate()
                .map(|(id, &degree)| degree.max(topology.degree(id)))
                .collect()
        };
        let (inboxes, postboxes): (Vec<_>, Vec<_>) = capacities
            .into_iter()
            .enumerate()
            .map(|(id, capacity)| Mailbox::open(id, capacity))
            .unzip();
        let router = Router::new(postboxes, &self.topology);

        let (cancel_tx, cancel_rx) = channel::bounded(1);
        let abort = Abort {
            barrier,
            cancel: cancel_tx.clone(),
        };
        let (updater, handshake) = match self.config.reliability_model {
            Some(model) => {
                let rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(UPDATER_SEED_OFFSET));
                let (updater, handshake) =
                    EdgeUpdater::new(model, &self.topology, rng, n, cancel_rx);
                (Some(updater), Some(handshake))
            }
            None => (None, None),
        };

        info!(protocol = protocol.name(), nodes = n, seed, "simulation started");
        let started = Instant::now();
        let nodes = std::mem::take(&mut self.nodes);

        let thread_limit = self.thread_limit;

        let (outcomes, report) = thread::scope(|s| {
            let mut budget = thread_limit;
            let mut outcomes: Vec<SimResult<Node>> = Vec::with_capacity(n);

            let updater = match updater {
                Some(updater) => {
                    match spawn_named(s, "edge-updater".to_string(), &mut budget, move || {
                        updater.run()
                    }) {
                        Ok(handle) => Some(handle),
                        Err(e) => {
                            abort.trip();
                            outcomes.push(Err(e));
                            None
                        }
                    }
                }
                None => None,
            };

            let mut tasks = Vec::with_capacity(n);
            if outcomes.is_empty() {
                for (node, inbox) in nodes.into_iter().zip(inboxes) {
                    let id = node.id();
                    let task = NodeTask {
                        rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(id as u64)),
                        node,
                        inbox,
                        protocol,
                        router: &router,
                        barrier,
                        handshake: handshake.clone(),
                        abort: abort.clone(),
                    };
                    match spawn_named(s, format!("node-{id}"), &mut budget, move || task.run()) {
                        Ok(handle) => tasks.push((id, handle)),
                        Err(e) => {
                            // Started tasks unblock with cascade errors.
                            abort.trip();
                            outcomes.push(Err(e));
                            break;
                        }
                    }
                }
            }
            drop(handshake);

            outcomes.extend(tasks.into_iter().map(|(id, task)| {
                task.join()
                    .unwrap_or_else(|_| Err(SimError::fault(id, "node task panicked")))
            }));

            let _ = cancel_tx.try_send(());
            let report = updater.and_then(|updater| updater.join().ok());
            (outcomes, report)
        });
        self.barrier.close();

        let finished = Self::settle(outcomes)?;
        if let Some(UpdaterReport {
            cycles,
            removed,
            added,
        }) = report
        {
            info!(cycles, removed, added, "edge updater stopped");
        }

        let result = protocol.global_exact_result(&finished);
        let stats = SimulationStats::collect(&finished, result);
        self.nodes = finished;

        info!(
            protocol = protocol.name(),
            rounds = stats.nof_rounds,
            result,
            sent = stats.all_sent_msgs,
            received = stats.all_received_msgs,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "simulation finished"
        );
        Ok(stats)
    }

    /// Collect finished nodes, or the root-cause error of a failed run.
    fn settle(outcomes: Vec<SimResult<Node>>) -> SimResult<Vec<Node>> {
        let mut nodes = Vec::with_capacity(outcomes.len());
        let mut root_cause = None;
        let mut cascade = None;
        for outcome in outcomes {
            match outcome {
                Ok(node) => nodes.push(node),
                Err(e) if e.is_cascade() => {
                    cascade.get_or_insert(e);
                }
                Err(e) => {
                    root_cause.get_or_insert(e);
                }
            }
        }
        match root_cause.or(cascade) {
            Some(e) => {
                warn!(error = %e, "simulation aborted");
                Err(e)
            }
            None => Ok(nodes),
        }
    }

    pub fn node(&self, id: usize) -> SimResult<&Node> {
        self.nodes.get(id).ok_or(SimError::NodeNotFound(id))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> RwLockReadGuard<'_, Topology> {
        read_topology(&self.topology)
    }

    /// Give back the topology, including any edge churn applied by the run.
    pub fn into_topology(self) -> Topology {
        self.topology
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Start a named scoped thread, charging it against `budget`.
fn spawn_named<'scope, T, F>(
    s: &'scope Scope<'scope, '_>,
    name: String,
    budget: &mut usize,
    f: F,
) -> SimResult<ScopedJoinHandle<'scope, T>>
where
    T: Send + 'scope,
    F: FnOnce() -> T + Send + 'scope,
{
    let spawned = match budget.checked_sub(1) {
        Some(left) => {
            *budget = left;
            thread::Builder::new().name(name.clone()).spawn_scoped(s, f)
        }
        None => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "thread limit reached",
        )),
    };
    spawned.map_err(|e| SimError::ThreadSpawn {
        task: name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reliability::ReliabilityModel;

    #[test]
    fn test_empty_topology_is_rejected() {
        let err = Coordinator::new(Topology::new(0), SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_unknown_protocol_spawns_nothing() {
        let topology = Topology::from_edges(2, [(0, 1)], 0.0).unwrap();
        let mut coordinator = Coordinator::new(topology, SimulationConfig::default()).unwrap();
        assert!(matches!(
            coordinator.run_named("flooding"),
            Err(SimError::Configuration(_))
        ));
        // The rejected name did not consume the single run.
        assert!(coordinator.run_named("minPropagation").is_ok());
    }

    #[test]
    fn test_second_run_is_rejected() {
        let topology = Topology::from_edges(2, [(0, 1)], 0.0).unwrap();
        let config = SimulationConfig::default().with_seed(1);
        let mut coordinator = Coordinator::new(topology, config).unwrap();
        coordinator.run_simulation(ProtocolKind::MinPropagation).unwrap();
        assert!(matches!(
            coordinator.run_simulation(ProtocolKind::MinPropagation),
            Err(SimError::Configuration(_))
        ));
        assert_eq!(coordinator.nodes().len(), 2);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let run = || {
            let topology = Topology::from_edges(4, [(0, 1), (1, 2), (2, 3)], 0.0).unwrap();
            let config = SimulationConfig::default().with_seed(42);
            let mut coordinator = Coordinator::new(topology, config).unwrap();
            coordinator.run_simulation(ProtocolKind::MinPropagation).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_node_lookup() {
        let coordinator =
            Coordinator::new(Topology::new(3), SimulationConfig::default()).unwrap();
        assert_eq!(coordinator.node(2).unwrap().id(), 2);
        assert_eq!(coordinator.node(3).unwrap_err(), SimError::NodeNotFound(3));
    }

    fn spawn_failure(err: SimError) -> String {
        match err {
            SimError::ThreadSpawn { task, .. } => task,
            other => panic!("expected a spawn failure, got {other:?}"),
        }
    }

    #[test]
    fn test_refused_node_thread_on_edgeless_graph() {
        let config = SimulationConfig::default().with_seed(3);
        let mut coordinator = Coordinator::new(Topology::new(8), config).unwrap();
        coordinator.thread_limit = 3;

        let err = coordinator
            .run_simulation(ProtocolKind::MinPropagation)
            .unwrap_err();
        assert_eq!(spawn_failure(err), "node-3");
        assert!(coordinator.nodes().is_empty());
    }

    #[test]
    fn test_refused_node_thread_on_connected_graph() {
        let topology = Topology::from_edges(6, [(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)], 0.0)
            .unwrap();
        let config = SimulationConfig::default().with_seed(3);
        let mut coordinator = Coordinator::new(topology, config).unwrap();
        coordinator.thread_limit = 4;

        let err = coordinator.run_simulation(ProtocolKind::Hll).unwrap_err();
        assert_eq!(spawn_failure(err), "node-4");
    }

    #[test]
    fn test_refused_thread_under_churn() {
        let topology = || {
            Topology::from_edges(4, [(0, 1), (1, 2), (2, 3)], 0.0).unwrap()
        };
        let config = SimulationConfig::default()
            .with_seed(3)
            .with_reliability(ReliabilityModel::EdgeRemover);

        let mut no_updater = Coordinator::new(topology(), config.clone()).unwrap();
        no_updater.thread_limit = 0;
        let err = no_updater
            .run_simulation(ProtocolKind::MinPropagation)
            .unwrap_err();
        assert_eq!(spawn_failure(err), "edge-updater");

        let mut partial = Coordinator::new(topology(), config).unwrap();
        partial.thread_limit = 2;
        let err = partial
            .run_simulation(ProtocolKind::MinPropagation)
            .unwrap_err();
        assert_eq!(spawn_failure(err), "node-1");
    }
}
