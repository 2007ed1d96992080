//! Stochastic edge churn between rounds.
//!
//! The updater runs as one extra task. Each cycle it collects one "begin"
//! signal per node, mutates the topology while every node is parked on its
//! handshake, then releases the nodes with one "finish" signal each. No node
//! can read adjacency while the write lock is held.

use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use crossbeam::channel::{self, select, Receiver, Sender};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::router::write_topology;
use crate::topology::Topology;

/// Edge-churn strategy. Each edge's configured reliability `p` is compared
/// against one uniform draw per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReliabilityModel {
    /// A present edge is removed with probability `p` and never comes back.
    EdgeRemover,
    /// A present edge is removed with probability `p`; an absent edge is
    /// re-added with probability `1 - p`.
    EdgeRemoverAdder,
}

impl ReliabilityModel {
    pub fn name(&self) -> &'static str {
        match self {
            ReliabilityModel::EdgeRemover => "edge-remover",
            ReliabilityModel::EdgeRemoverAdder => "edge-remover-adder",
        }
    }

    /// Parse a model name where the empty string disables churn.
    pub fn parse_optional(name: &str) -> SimResult<Option<Self>> {
        if name.is_empty() {
            Ok(None)
        } else {
            name.parse().map(Some)
        }
    }

    /// Run one update cycle over every original edge. Returns
    /// `(removed, added)`.
    pub fn apply(&self, topology: &mut Topology, rng: &mut impl Rng) -> (usize, usize) {
        let edges = topology.original_edges().to_vec();
        let (mut removed, mut added) = (0, 0);
        for (v, w) in edges {
            let draw: f64 = rng.gen();
            let p = topology.reliability(v, w);
            let present = topology.edge_exists(v, w);
            if draw < p && present {
                if topology.remove_edge(v, w).is_ok() {
                    removed += 1;
                }
            } else if *self == ReliabilityModel::EdgeRemoverAdder
                && draw < 1.0 - p
                && !present
                && topology.add_edge(v, w).is_ok()
            {
                added += 1;
            }
        }
        (removed, added)
    }
}

impl fmt::Display for ReliabilityModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReliabilityModel {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edge-remover" => Ok(ReliabilityModel::EdgeRemover),
            "edge-remover-adder" => Ok(ReliabilityModel::EdgeRemoverAdder),
            other => Err(SimError::Configuration(format!(
                "unknown reliability model '{other}' (expected 'edge-remover' or 'edge-remover-adder')"
            ))),
        }
    }
}

/// Node side of the update handshake.
#[derive(Debug, Clone)]
pub struct NodeHandshake {
    begin: Sender<()>,
    finish: Receiver<()>,
}

impl NodeHandshake {
    /// Announce the end of the previous round and block until the updater
    /// has finished mutating the topology.
    pub fn wait_for_update(&self) -> SimResult<()> {
        self.begin.send(()).map_err(|_| SimError::Aborted)?;
        self.finish.recv().map_err(|_| SimError::Aborted)
    }
}

/// Totals reported by an updater when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterReport {
    pub cycles: usize,
    pub removed: usize,
    pub added: usize,
}

/// Updater task state.
pub struct EdgeUpdater<'t> {
    model: ReliabilityModel,
    topology: &'t RwLock<Topology>,
    rng: ChaCha8Rng,
    participants: usize,
    begin: Receiver<()>,
    finish: Sender<()>,
    cancel: Receiver<()>,
}

impl<'t> EdgeUpdater<'t> {
    /// Create an updater for `participants` nodes together with the
    /// handshake every node clones.
    pub fn new(
        model: ReliabilityModel,
        topology: &'t RwLock<Topology>,
        rng: ChaCha8Rng,
        participants: usize,
        cancel: Receiver<()>,
    ) -> (Self, NodeHandshake) {
        let (begin_tx, begin_rx) = channel::unbounded();
        let (finish_tx, finish_rx) = channel::unbounded();
        let updater = Self {
            model,
            topology,
            rng,
            participants,
            begin: begin_rx,
            finish: finish_tx,
            cancel,
        };
        let handshake = NodeHandshake {
            begin: begin_tx,
            finish: finish_rx,
        };
        (updater, handshake)
    }

    /// Serve update cycles until cancelled or until every node hung up.
    pub fn run(mut self) -> UpdaterReport {
        let mut report = UpdaterReport::default();
        while self.collect_begin_signals() {
            let (removed, added) = {
                let mut topology = write_topology(self.topology);
                self.model.apply(&mut topology, &mut self.rng)
            };
            report.cycles += 1;
            report.removed += removed;
            report.added += added;
            debug!(
                model = %self.model,
                cycle = report.cycles,
                removed,
                added,
                "edge update cycle"
            );

            for _ in 0..self.participants {
                if self.finish.send(()).is_err() {
                    return report;
                }
            }
        }
        report
    }

    fn collect_begin_signals(&self) -> bool {
        for _ in 0..self.participants {
            select! {
                recv(self.begin) -> signal => {
                    if signal.is_err() {
                        return false;
                    }
                }
                recv(self.cancel) -> _ => return false,
            }
        }
        true
    }
}
