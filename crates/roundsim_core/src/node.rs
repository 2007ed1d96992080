//! Simulated stations and their round-synchronized execution.
//!
//! A [`Node`] is the plain state of one vertex. While a run is in flight the
//! node is owned by its task, and protocols reach it through a [`Station`]
//! handle that also carries the inbox, the router and the node's RNG.
//!
//! Task lifecycle:
//!
//! ```text
//! Initializing -> { handshake? -> first barrier -> drain inbox -> receive
//!                   -> reopen inbox -> second barrier -> propagate }*
//!              -> first barrier -> drain inbox -> finalize -> second barrier
//! ```

use std::sync::Arc;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::barrier::RoundBarrier;
use crate::error::{SimError, SimResult};
use crate::mailbox::{Mailbox, Message};
use crate::protocol::Protocol;
use crate::reliability::NodeHandshake;
use crate::router::Router;

/// Per-station record in the statistics output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub id: usize,
    pub sent_msgs: usize,
    pub received_msgs: usize,
    pub nof_rounds: usize,
    pub result: f64,
    pub exact_result: Option<f64>,
    pub memory: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: usize,
    degree: usize,
    current_data: Vec<f64>,
    history: Vec<Vec<f64>>,
    observed: Vec<Vec<f64>>,
    sent: usize,
    received: usize,
    rounds: usize,
    memory: usize,
    result: f64,
    exact_result: Option<f64>,
}

impl Node {
    pub fn new(id: usize, degree: usize) -> Self {
        Self {
            id,
            degree,
            current_data: Vec::new(),
            history: Vec::new(),
            observed: Vec::new(),
            sent: 0,
            received: 0,
            rounds: 0,
            memory: 0,
            result: 0.0,
            exact_result: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Degree of the vertex when the node was created.
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn current_data(&self) -> &[f64] {
        &self.current_data
    }

    /// Every data vector ever set on this node, oldest first.
    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }

    /// Raw observations recorded by estimator protocols.
    pub fn observed_values(&self) -> &[Vec<f64>] {
        &self.observed
    }

    pub fn sent_messages(&self) -> usize {
        self.sent
    }

    pub fn received_messages(&self) -> usize {
        self.received
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Memory estimate in `f64` words.
    pub fn memory(&self) -> usize {
        self.memory
    }

    pub fn result(&self) -> f64 {
        self.result
    }

    pub fn exact_result(&self) -> Option<f64> {
        self.exact_result
    }

    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            id: self.id,
            sent_msgs: self.sent,
            received_msgs: self.received,
            nof_rounds: self.rounds,
            result: self.result,
            exact_result: self.exact_result,
            memory: self.memory,
        }
    }

    fn set_current_data(&mut self, data: Vec<f64>) {
        self.history.push(data.clone());
        self.current_data = data;
    }

    fn observed_words(&self) -> usize {
        self.observed.first().map_or(0, Vec::len) * self.observed.len()
    }
}

/// Execution handle passed to every protocol hook.
pub struct Station<'a> {
    node: &'a mut Node,
    inbox: &'a mut Mailbox,
    router: &'a Router<'a>,
    rng: &'a mut ChaCha8Rng,
    diameter: usize,
}

impl<'a> Station<'a> {
    pub fn new(
        node: &'a mut Node,
        inbox: &'a mut Mailbox,
        router: &'a Router<'a>,
        rng: &'a mut ChaCha8Rng,
    ) -> Self {
        let diameter = router.topology().diameter();
        Self {
            node,
            inbox,
            router,
            rng,
            diameter,
        }
    }

    pub fn id(&self) -> usize {
        self.node.id
    }

    pub fn round(&self) -> usize {
        self.node.rounds
    }

    /// Diameter of the topology at the start of the run.
    pub fn diameter(&self) -> usize {
        self.diameter
    }

    /// Current number of neighbors.
    pub fn degree(&self) -> usize {
        self.router.degree(self.node.id)
    }

    pub fn node(&self) -> &Node {
        self.node
    }

    pub fn current_data(&self) -> &[f64] {
        &self.node.current_data
    }

    /// Replace the current data vector and record it in the history.
    pub fn set_current_data(&mut self, data: Vec<f64>) {
        self.node.set_current_data(data);
    }

    pub fn observe_value(&mut self, value: Vec<f64>) {
        self.node.observed.push(value);
    }

    pub fn set_result(&mut self, result: f64) {
        self.node.result = result;
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }

    /// Next message drained from the inbox this round.
    pub fn dequeue(&mut self) -> Option<Message> {
        self.inbox.dequeue()
    }

    /// Send the current data to every current neighbor.
    ///
    /// Only safe without further coordination when at most one broadcasting
    /// epoch touches a given destination per round.
    pub fn broadcast(&mut self) -> SimResult<()> {
        self.send_to_neighbors(false)
    }

    /// Like [`Station::broadcast`], but takes each destination's exclusive
    /// lock around the delivery.
    pub fn synchronized_broadcast(&mut self) -> SimResult<()> {
        self.send_to_neighbors(true)
    }

    fn send_to_neighbors(&mut self, exclusive: bool) -> SimResult<()> {
        let data: Arc<[f64]> = Arc::from(self.node.current_data.as_slice());
        let message = Message::new(self.node.id, self.node.rounds, data);
        let router = self.router;

        let mut sent = 0;
        let mut failure = None;
        router.topology().visit(self.node.id, |w, _| {
            match router.deliver(w, message.clone(), exclusive) {
                Ok(()) => {
                    sent += 1;
                    false
                }
                Err(e) => {
                    failure = Some(e);
                    true
                }
            }
        });
        self.node.sent += sent;
        trace!(node = self.node.id, round = self.node.rounds, sent, "broadcast");
        failure.map_or(Ok(()), Err)
    }

    /// Close the inbox for this round and move delivered messages into the
    /// local queue. Messages tagged older than the previous round mean the
    /// barrier contract was broken.
    fn end_round(&mut self) -> SimResult<usize> {
        let drained = self.inbox.close_round();
        self.node.received += drained;
        let round = self.node.rounds;
        if let Some(stale) = self.inbox.queued().find(|m| m.round + 1 < round) {
            return Err(SimError::fault(
                self.node.id,
                format!(
                    "message from node {} tagged round {} arrived in round {}",
                    stale.sender, stale.round, round
                ),
            ));
        }
        Ok(drained)
    }

    fn reopen_inbox(&mut self) {
        self.inbox.reopen();
    }

    fn advance_round(&mut self) {
        self.node.rounds += 1;
    }
}

/// Shared abort: closes the barrier and cancels the reliability updater so
/// every blocked participant unblocks with a cascade error.
#[derive(Debug, Clone)]
pub(crate) struct Abort<'a> {
    pub(crate) barrier: &'a RoundBarrier,
    pub(crate) cancel: crossbeam::channel::Sender<()>,
}

impl Abort<'_> {
    pub(crate) fn trip(&self) {
        self.barrier.close();
        let _ = self.cancel.try_send(());
    }
}

/// Trips the abort if the owning task unwinds.
struct PanicGuard<'g, 'a> {
    abort: &'g Abort<'a>,
}

impl Drop for PanicGuard<'_, '_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.abort.trip();
        }
    }
}

/// Everything one node task needs for a run.
pub(crate) struct NodeTask<'a, P: Protocol> {
    pub(crate) node: Node,
    pub(crate) inbox: Mailbox,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) protocol: &'a P,
    pub(crate) router: &'a Router<'a>,
    pub(crate) barrier: &'a RoundBarrier,
    pub(crate) handshake: Option<NodeHandshake>,
    pub(crate) abort: Abort<'a>,
}

impl<P: Protocol> NodeTask<'_, P> {
    /// Run the node to completion and hand the finished node back.
    pub(crate) fn run(self) -> SimResult<Node> {
        let NodeTask {
            mut node,
            mut inbox,
            mut rng,
            protocol,
            router,
            barrier,
            handshake,
            abort,
        } = self;

        let _guard = PanicGuard { abort: &abort };
        let outcome = Self::execute(
            protocol,
            barrier,
            handshake.as_ref(),
            Station::new(&mut node, &mut inbox, router, &mut rng),
        );

        match outcome {
            Ok(()) => Ok(node),
            Err(e) => {
                if !e.is_cascade() {
                    debug!(node = node.id, error = %e, "node task failed, aborting run");
                }
                abort.trip();
                Err(e)
            }
        }
    }

    fn execute(
        protocol: &P,
        barrier: &RoundBarrier,
        handshake: Option<&NodeHandshake>,
        mut station: Station<'_>,
    ) -> SimResult<()> {
        let mut ctx = P::Context::default();

        protocol.initial_data(&mut station, &mut ctx);
        protocol.on_initialize(&mut station, &mut ctx)?;

        while protocol.stop_condition(&station, &ctx) {
            if let Some(handshake) = handshake {
                handshake.wait_for_update()?;
            }

            barrier.wait_at_first()?;
            station.end_round()?;
            protocol.on_data_receive(&mut station, &mut ctx)?;
            station.reopen_inbox();
            barrier.wait_at_second()?;

            protocol.on_data_propagate(&mut station, &mut ctx)?;
            station.advance_round();
        }

        barrier.wait_at_first()?;
        station.end_round()?;
        protocol.on_finalize(&mut station, &mut ctx)?;
        let exact = protocol.station_exact_result(station.node(), &ctx);
        station.node.exact_result = Some(exact);
        station.node.memory += protocol.context_words(&ctx)
            + station.inbox.peak_queue()
            + station.node.current_data.len()
            + station.node.observed_words();
        barrier.wait_at_second()?;

        trace!(node = station.node.id, rounds = station.node.rounds, "node finished");
        Ok(())
    }
}
