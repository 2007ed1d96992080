//! Extrema propagation: every node converges to the global minimum of the
//! initial values within `diameter` rounds.

use rand::Rng;

use super::{min_first_component, Protocol};
use crate::error::{SimError, SimResult};
use crate::node::{Node, Station};

#[derive(Debug, Clone, Copy, Default)]
pub struct MinPropagation;

#[derive(Debug, Clone, Copy)]
pub struct MinContext {
    min: f64,
}

impl Default for MinContext {
    fn default() -> Self {
        Self { min: f64::INFINITY }
    }
}

impl Protocol for MinPropagation {
    type Context = MinContext;

    fn name(&self) -> &'static str {
        "minPropagation"
    }

    fn initial_data(&self, station: &mut Station<'_>, _ctx: &mut MinContext) {
        // Exp(1) by inversion; 1 - u lies in (0, 1].
        let u: f64 = station.rng().gen();
        station.set_current_data(vec![-(1.0 - u).ln()]);
    }

    fn on_initialize(&self, station: &mut Station<'_>, ctx: &mut MinContext) -> SimResult<()> {
        ctx.min = current_value(station)?;
        station.broadcast()
    }

    fn on_data_receive(&self, station: &mut Station<'_>, ctx: &mut MinContext) -> SimResult<()> {
        while let Some(message) = station.dequeue() {
            let value = message.data.first().copied().ok_or_else(|| {
                SimError::fault(
                    station.id(),
                    format!("empty payload from node {}", message.sender),
                )
            })?;
            ctx.min = ctx.min.min(value);
        }
        Ok(())
    }

    fn on_data_propagate(&self, station: &mut Station<'_>, ctx: &mut MinContext) -> SimResult<()> {
        if ctx.min < current_value(station)? {
            station.set_current_data(vec![ctx.min]);
            station.synchronized_broadcast()?;
        }
        Ok(())
    }

    fn stop_condition(&self, station: &Station<'_>, _ctx: &MinContext) -> bool {
        station.round() < station.diameter()
    }

    fn on_finalize(&self, station: &mut Station<'_>, _ctx: &mut MinContext) -> SimResult<()> {
        let value = current_value(station)?;
        station.set_result(value);
        Ok(())
    }

    fn station_exact_result(&self, node: &Node, _ctx: &MinContext) -> f64 {
        min_first_component(node.history())
    }

    fn global_exact_result(&self, nodes: &[Node]) -> f64 {
        min_first_component(nodes.iter().flat_map(Node::history))
    }
}

fn current_value(station: &Station<'_>) -> SimResult<f64> {
    station
        .current_data()
        .first()
        .copied()
        .ok_or_else(|| SimError::fault(station.id(), "current data is empty"))
}
