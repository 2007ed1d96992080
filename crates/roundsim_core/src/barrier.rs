//! Reusable two-phase rendezvous for a fixed set of round participants.
//!
//! Every participant calls [`RoundBarrier::wait_at_first`] and then
//! [`RoundBarrier::wait_at_second`] once per cycle. The first phase gates
//! "all inboxes drained", the second gates "all nodes reacted and may
//! broadcast again". A single phase is not enough: a fast node could start
//! broadcasting round `r + 1` into an inbox that a slow node is still
//! draining for round `r`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{SimError, SimResult};

#[derive(Debug, Default)]
struct Gate {
    arrived: usize,
    generation: u64,
}

#[derive(Debug, Default)]
struct BarrierState {
    first: Gate,
    second: Gate,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    First,
    Second,
}

/// Two-phase barrier sized to a fixed participant count.
#[derive(Debug)]
pub struct RoundBarrier {
    participants: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl RoundBarrier {
    /// Create a barrier for `participants` tasks.
    pub fn new(participants: usize) -> Self {
        Self {
            participants,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Block until all participants reached the first phase of this cycle.
    pub fn wait_at_first(&self) -> SimResult<()> {
        self.wait(Phase::First)
    }

    /// Block until all participants reached the second phase of this cycle.
    pub fn wait_at_second(&self) -> SimResult<()> {
        self.wait(Phase::Second)
    }

    /// Permanently close the barrier, releasing every blocked participant
    /// with [`SimError::BarrierClosed`]. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            self.released.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        // A poisoned lock means a participant panicked mid-update; the counters
        // are still consistent because every update is a single statement.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self, phase: Phase) -> SimResult<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(SimError::BarrierClosed);
        }

        let gate = match phase {
            Phase::First => &mut state.first,
            Phase::Second => &mut state.second,
        };
        gate.arrived += 1;
        if gate.arrived == self.participants {
            gate.arrived = 0;
            gate.generation = gate.generation.wrapping_add(1);
            self.released.notify_all();
            return Ok(());
        }

        let generation = gate.generation;
        loop {
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            let gate = match phase {
                Phase::First => &state.first,
                Phase::Second => &state.second,
            };
            if gate.generation != generation {
                return Ok(());
            }
            if state.closed {
                return Err(SimError::BarrierClosed);
            }
        }
    }
}
