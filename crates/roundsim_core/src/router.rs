//! Narrow routing capability handed to node tasks: deliver to a node id and
//! read the shared topology. Nodes never hold a reference to the coordinator.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{SimError, SimResult};
use crate::mailbox::{Message, Postbox};
use crate::topology::Topology;

/// Read access to the shared topology.
///
/// The reliability handshake keeps the single writer and the readers apart in
/// time, so the lock is never contended during a well-formed run.
pub(crate) fn read_topology(topology: &RwLock<Topology>) -> RwLockReadGuard<'_, Topology> {
    topology.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_topology(topology: &RwLock<Topology>) -> RwLockWriteGuard<'_, Topology> {
    topology.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct Router<'t> {
    postboxes: Vec<Postbox>,
    topology: &'t RwLock<Topology>,
}

impl<'t> Router<'t> {
    pub fn new(postboxes: Vec<Postbox>, topology: &'t RwLock<Topology>) -> Self {
        Self {
            postboxes,
            topology,
        }
    }

    /// Look up the inbox of `id`.
    pub fn postbox(&self, id: usize) -> SimResult<&Postbox> {
        self.postboxes.get(id).ok_or(SimError::NodeNotFound(id))
    }

    /// Deliver `message` to `to`, optionally under the destination's
    /// exclusive lock.
    pub fn deliver(&self, to: usize, message: Message, exclusive: bool) -> SimResult<()> {
        let postbox = self.postbox(to)?;
        if exclusive {
            postbox.deliver_exclusive(message)
        } else {
            postbox.deliver(message)
        }
    }

    pub fn topology(&self) -> RwLockReadGuard<'_, Topology> {
        read_topology(self.topology)
    }

    /// Current number of neighbors of `id`.
    pub fn degree(&self, id: usize) -> usize {
        self.topology().degree(id)
    }

    pub fn len(&self) -> usize {
        self.postboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postboxes.is_empty()
    }
}
