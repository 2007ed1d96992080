//! Distributed distinct-count estimation over HyperLogLog registers.
//!
//! Each node sketches a batch of synthetic observations and gossips its
//! register vector; receivers max-merge and rebroadcast only on change. After
//! `diameter` rounds every sketch holds the union of all observations.

use std::collections::HashSet;

use rand::Rng;

use super::Protocol;
use crate::error::{SimError, SimResult};
use crate::hll::{merge_registers, HyperLogLog};
use crate::node::{Node, Station};

#[derive(Debug, Clone, Copy)]
pub struct CountDistinct {
    /// HyperLogLog register count (power of two).
    pub registers: usize,
    /// Observations generated per node.
    pub observations: usize,
    /// Observations are drawn uniformly from `[1, max_value + 1]`.
    pub max_value: u32,
}

impl Default for CountDistinct {
    fn default() -> Self {
        Self {
            registers: 32,
            observations: 20,
            max_value: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CountDistinctContext {
    registers: Vec<f64>,
    changed: bool,
}

impl Protocol for CountDistinct {
    type Context = CountDistinctContext;

    fn name(&self) -> &'static str {
        "hll"
    }

    fn initial_data(&self, station: &mut Station<'_>, ctx: &mut CountDistinctContext) {
        let mut sketch = HyperLogLog::new(self.registers);
        for _ in 0..self.observations {
            let value: u32 = station.rng().gen_range(1..=self.max_value.saturating_add(1));
            station.observe_value(vec![f64::from(value)]);
            sketch.add(&value.to_le_bytes());
        }
        ctx.registers = sketch.registers().iter().map(|&r| f64::from(r)).collect();
        station.set_current_data(ctx.registers.clone());
    }

    fn on_initialize(
        &self,
        station: &mut Station<'_>,
        _ctx: &mut CountDistinctContext,
    ) -> SimResult<()> {
        station.broadcast()
    }

    fn on_data_receive(
        &self,
        station: &mut Station<'_>,
        ctx: &mut CountDistinctContext,
    ) -> SimResult<()> {
        ctx.changed = false;
        while let Some(message) = station.dequeue() {
            if message.data.len() != ctx.registers.len() {
                return Err(SimError::fault(
                    station.id(),
                    format!(
                        "node {} sent {} registers, expected {}",
                        message.sender,
                        message.data.len(),
                        ctx.registers.len()
                    ),
                ));
            }
            ctx.changed |= merge_registers(&mut ctx.registers, &message.data);
        }
        Ok(())
    }

    fn on_data_propagate(
        &self,
        station: &mut Station<'_>,
        ctx: &mut CountDistinctContext,
    ) -> SimResult<()> {
        if ctx.changed {
            station.set_current_data(ctx.registers.clone());
            station.synchronized_broadcast()?;
        }
        Ok(())
    }

    fn stop_condition(&self, station: &Station<'_>, _ctx: &CountDistinctContext) -> bool {
        station.round() < station.diameter()
    }

    fn on_finalize(
        &self,
        station: &mut Station<'_>,
        _ctx: &mut CountDistinctContext,
    ) -> SimResult<()> {
        let registers = station.current_data().iter().map(|&r| r as u8).collect();
        let sketch = HyperLogLog::from_registers(registers).ok_or_else(|| {
            SimError::fault(station.id(), "current data is not a register vector")
        })?;
        station.set_result(sketch.count() as f64);
        Ok(())
    }

    fn station_exact_result(&self, node: &Node, _ctx: &CountDistinctContext) -> f64 {
        distinct(std::slice::from_ref(node)) as f64
    }

    fn global_exact_result(&self, nodes: &[Node]) -> f64 {
        distinct(nodes) as f64
    }

    fn context_words(&self, ctx: &CountDistinctContext) -> usize {
        ctx.registers.len() + 1
    }
}

fn distinct(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .flat_map(Node::observed_values)
        .filter_map(|v| v.first())
        .map(|v| v.to_bits())
        .collect::<HashSet<_>>()
        .len()
}
