//! Error types shared by every layer of the simulator.
//!
//! All fallible APIs return [`SimResult`]. Configuration, validation and
//! parse errors surface before any node task is spawned; runtime faults
//! abort a run that is already in flight.

use thiserror::Error;

/// Top-level error type for the simulator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Conflicting or missing inputs, unknown protocol or model names.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value was well-formed but outside its admissible range.
    #[error("validation error: {0}")]
    Validation(String),

    /// A persisted document could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// A node task violated the round contract or its protocol failed.
    #[error("runtime fault at node {node}: {reason}")]
    RuntimeFault { node: usize, reason: String },

    /// The OS refused a thread for a node task or the edge updater.
    #[error("failed to spawn {task}: {reason}")]
    ThreadSpawn { task: String, reason: String },

    /// The round barrier was closed while a participant was waiting on it.
    #[error("round barrier closed")]
    BarrierClosed,

    /// A message was routed to a node whose inbox is not accepting.
    #[error("mailbox of node {0} is closed")]
    MailboxClosed(usize),

    /// A node id outside the topology was referenced.
    #[error("node {0} not found")]
    NodeNotFound(usize),

    /// The run was cancelled because another participant faulted.
    #[error("simulation aborted")]
    Aborted,
}

impl SimError {
    /// Returns `true` for errors that only ever appear as a consequence of
    /// some other participant failing first.
    pub fn is_cascade(&self) -> bool {
        matches!(
            self,
            SimError::BarrierClosed | SimError::MailboxClosed(_) | SimError::Aborted
        )
    }

    pub(crate) fn fault(node: usize, reason: impl Into<String>) -> Self {
        SimError::RuntimeFault {
            node,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Parse(e.to_string())
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
