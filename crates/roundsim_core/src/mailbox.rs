//! Per-node inboxes.
//!
//! Data transport and round control are separate concerns here: senders push
//! [`Message`]s through a [`Postbox`], and the owning node ends a round
//! explicitly with [`Mailbox::close_round`], which drains everything that
//! arrived into its local FIFO queue. The barrier guarantees that no sender
//! is active while an inbox is closed.
//!
//! Inboxes are bounded by the owner's degree in the original topology: each
//! neighbor broadcasts at most once between two drains, and edge churn only
//! ever restores original edges. A send into a full inbox is a fault of the
//! sender, never a block.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::{SimError, SimResult};

/// Immutable payload tagged with the round it was sent in.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: usize,
    pub round: usize,
    pub data: Arc<[f64]>,
}

impl Message {
    pub fn new(sender: usize, round: usize, data: Arc<[f64]>) -> Self {
        Self {
            sender,
            round,
            data,
        }
    }
}

/// Sender-side handle of one node's inbox.
///
/// Shared by every neighbor. `delivery_lock` is the per-destination exclusive
/// lock taken by synchronized broadcasts; plain sends skip it.
#[derive(Debug)]
pub struct Postbox {
    owner: usize,
    tx: Sender<Message>,
    accepting: Arc<AtomicBool>,
    delivery_lock: Mutex<()>,
}

impl Postbox {
    /// Append a message to the destination inbox.
    pub fn deliver(&self, message: Message) -> SimResult<()> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SimError::MailboxClosed(self.owner));
        }
        let sender = message.sender;
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SimError::fault(
                sender,
                format!("inbox of node {} is full", self.owner),
            ),
            TrySendError::Disconnected(_) => SimError::MailboxClosed(self.owner),
        })
    }

    /// Append a message while holding the destination's exclusive lock.
    pub fn deliver_exclusive(&self, message: Message) -> SimResult<()> {
        let _guard = self.lock();
        self.deliver(message)
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.delivery_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiver-side inbox owned by exactly one node task.
#[derive(Debug)]
pub struct Mailbox {
    owner: usize,
    rx: Receiver<Message>,
    accepting: Arc<AtomicBool>,
    queue: VecDeque<Message>,
    peak_queue: usize,
}

impl Mailbox {
    /// Create an inbox for `owner` holding up to `capacity` undrained
    /// messages, together with its sender-side handle.
    pub fn open(owner: usize, capacity: usize) -> (Mailbox, Postbox) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let accepting = Arc::new(AtomicBool::new(true));
        let mailbox = Mailbox {
            owner,
            rx,
            accepting: Arc::clone(&accepting),
            queue: VecDeque::new(),
            peak_queue: 0,
        };
        let postbox = Postbox {
            owner,
            tx,
            accepting,
            delivery_lock: Mutex::new(()),
        };
        (mailbox, postbox)
    }

    /// End the current round: stop accepting and move every delivered
    /// message into the local queue. Returns the number of messages drained.
    pub fn close_round(&mut self) -> usize {
        self.accepting.store(false, Ordering::Release);
        let before = self.queue.len();
        self.queue.extend(self.rx.try_iter());
        self.peak_queue = self.peak_queue.max(self.queue.len());
        self.queue.len() - before
    }

    /// Accept messages for the next round again.
    pub fn reopen(&mut self) {
        self.accepting.store(true, Ordering::Release);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn dequeue(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    /// Messages drained but not yet consumed by the protocol.
    pub fn queued(&self) -> impl Iterator<Item = &Message> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Largest queue length observed after any drain.
    pub fn peak_queue(&self) -> usize {
        self.peak_queue
    }

    pub fn owner(&self) -> usize {
        self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: usize, round: usize, value: f64) -> Message {
        Message::new(sender, round, Arc::from(vec![value]))
    }

    #[test]
    fn test_drain_preserves_fifo_order() {
        let (mut inbox, postbox) = Mailbox::open(0, 3);
        postbox.deliver(msg(1, 0, 1.0)).unwrap();
        postbox.deliver_exclusive(msg(2, 0, 2.0)).unwrap();
        postbox.deliver(msg(3, 0, 3.0)).unwrap();

        assert_eq!(inbox.close_round(), 3);
        let senders: Vec<usize> = std::iter::from_fn(|| inbox.dequeue())
            .map(|m| m.sender)
            .collect();
        assert_eq!(senders, vec![1, 2, 3]);
        assert_eq!(inbox.peak_queue(), 3);
    }

    #[test]
    fn test_closed_inbox_rejects_delivery() {
        let (mut inbox, postbox) = Mailbox::open(4, 1);
        inbox.close_round();
        assert_eq!(
            postbox.deliver(msg(1, 0, 1.0)),
            Err(SimError::MailboxClosed(4))
        );
        inbox.reopen();
        assert!(postbox.deliver(msg(1, 0, 1.0)).is_ok());
    }

    #[test]
    fn test_dropped_inbox_rejects_delivery() {
        let (inbox, postbox) = Mailbox::open(2, 1);
        drop(inbox);
        assert_eq!(
            postbox.deliver(msg(0, 0, 0.5)),
            Err(SimError::MailboxClosed(2))
        );
    }

    #[test]
    fn test_full_inbox_faults_the_sender() {
        let (mut inbox, postbox) = Mailbox::open(5, 2);
        postbox.deliver(msg(1, 0, 1.0)).unwrap();
        postbox.deliver(msg(2, 0, 2.0)).unwrap();
        assert!(matches!(
            postbox.deliver(msg(3, 0, 3.0)),
            Err(SimError::RuntimeFault { node: 3, .. })
        ));

        // Draining frees the capacity for the next round.
        assert_eq!(inbox.close_round(), 2);
        inbox.reopen();
        assert!(postbox.deliver(msg(3, 1, 3.0)).is_ok());
    }
}
