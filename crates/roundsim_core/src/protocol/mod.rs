//! Pluggable distributed algorithms.
//!
//! Every node runs the same [`Protocol`] against its own [`Station`]. Scratch
//! state lives in a protocol-specific [`Protocol::Context`] created per node,
//! so hooks never need runtime type checks.

pub mod count_distinct;
pub mod min_propagation;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::node::{Node, Station};

pub use count_distinct::CountDistinct;
pub use min_propagation::MinPropagation;

/// Contract between the round engine and an algorithm.
///
/// # Contract
///
/// - `initial_data` runs exactly once, before any broadcast.
/// - `stop_condition` is evaluated once per iteration after the propagate
///   phase and must depend only on the node's own state (typically the round
///   counter against the diameter). Nodes that disagree here desynchronize
///   the barrier.
/// - `on_data_propagate` should only broadcast when local state changed.
/// - A node broadcasts at most once per hook. Inboxes hold one message per
///   neighbor, so a second broadcast before the next drain faults the run.
pub trait Protocol: Sync {
    /// Per-node scratch state.
    type Context: Default;

    /// Registry name of the protocol.
    fn name(&self) -> &'static str;

    /// Seed the node's initial data vector.
    fn initial_data(&self, station: &mut Station<'_>, ctx: &mut Self::Context);

    /// Round 0 setup; may broadcast.
    fn on_initialize(&self, station: &mut Station<'_>, ctx: &mut Self::Context) -> SimResult<()>;

    /// React to the messages drained this round.
    fn on_data_receive(&self, station: &mut Station<'_>, ctx: &mut Self::Context)
        -> SimResult<()>;

    /// Broadcast if state changed this round.
    fn on_data_propagate(
        &self,
        station: &mut Station<'_>,
        ctx: &mut Self::Context,
    ) -> SimResult<()>;

    /// `true` while the node should run another round.
    fn stop_condition(&self, station: &Station<'_>, ctx: &Self::Context) -> bool;

    /// Wrap-up round; records the station result.
    fn on_finalize(&self, station: &mut Station<'_>, ctx: &mut Self::Context) -> SimResult<()>;

    /// Reference result computed from the node's own data.
    fn station_exact_result(&self, node: &Node, ctx: &Self::Context) -> f64;

    /// Ground truth computed from every node's recorded data.
    fn global_exact_result(&self, nodes: &[Node]) -> f64;

    /// Size of the context in `f64` words, for the memory estimate.
    fn context_words(&self, _ctx: &Self::Context) -> usize {
        std::mem::size_of::<Self::Context>().div_ceil(std::mem::size_of::<f64>())
    }
}

/// Closed registry of the available protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    #[serde(rename = "hll")]
    Hll,
    #[serde(rename = "minPropagation")]
    MinPropagation,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 2] = [ProtocolKind::Hll, ProtocolKind::MinPropagation];

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolKind::Hll => "hll",
            ProtocolKind::MinPropagation => "minPropagation",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProtocolKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                SimError::Configuration(format!(
                    "unknown protocol '{s}' (expected 'hll' or 'minPropagation')"
                ))
            })
    }
}

/// Smallest value among the first component of every vector.
pub(crate) fn min_first_component<'v>(vectors: impl IntoIterator<Item = &'v Vec<f64>>) -> f64 {
    vectors
        .into_iter()
        .filter_map(|v| v.first().copied())
        .fold(f64::INFINITY, f64::min)
}
