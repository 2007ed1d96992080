//! Aggregated statistics of one finished run.

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::node::{Node, StationSnapshot};

/// Distribution of one per-node counter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub max: usize,
    pub min: usize,
    pub sum: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub stddev: f64,
}

impl Summary {
    /// Summarize `values`; an empty slice yields all zeros.
    pub fn of(values: &[usize]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sum: usize = values.iter().sum();
        let mean = sum as f64 / values.len() as f64;
        let variance = values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / values.len() as f64;
        Self {
            max: values.iter().copied().max().unwrap_or(0),
            min: values.iter().copied().min().unwrap_or(0),
            sum,
            mean,
            stddev: variance.sqrt(),
        }
    }
}

/// Result record written to the statistics file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub size: usize,
    pub result: f64,
    pub nof_rounds: usize,
    pub max_received_msgs: usize,
    pub min_received_msgs: usize,
    pub all_received_msgs: usize,
    pub avg_received_msgs: f64,
    pub stddev_received_msgs: f64,
    pub max_sent_msgs: usize,
    pub min_sent_msgs: usize,
    pub all_sent_msgs: usize,
    pub avg_sent_msgs: f64,
    pub stddev_sent_msgs: f64,
    pub all_memory: usize,
    pub max_memory: usize,
    pub min_memory: usize,
    pub avg_memory: f64,
    pub stddev_memory: f64,
    pub stations: Vec<StationSnapshot>,
}

impl SimulationStats {
    /// Reduce the finished nodes into a result record. `result` is the
    /// protocol's global exact result.
    pub fn collect(nodes: &[Node], result: f64) -> Self {
        let counter = |f: fn(&Node) -> usize| -> Summary {
            Summary::of(&nodes.iter().map(f).collect::<Vec<_>>())
        };
        let received = counter(Node::received_messages);
        let sent = counter(Node::sent_messages);
        let memory = counter(Node::memory);

        Self {
            size: nodes.len(),
            result,
            nof_rounds: nodes.iter().map(Node::rounds).max().unwrap_or(0),
            max_received_msgs: received.max,
            min_received_msgs: received.min,
            all_received_msgs: received.sum,
            avg_received_msgs: received.mean,
            stddev_received_msgs: received.stddev,
            max_sent_msgs: sent.max,
            min_sent_msgs: sent.min,
            all_sent_msgs: sent.sum,
            avg_sent_msgs: sent.mean,
            stddev_sent_msgs: sent.stddev,
            all_memory: memory.sum,
            max_memory: memory.max,
            min_memory: memory.min,
            avg_memory: memory.mean,
            stddev_memory: memory.stddev,
            stations: nodes.iter().map(Node::snapshot).collect(),
        }
    }

    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
