// crates/serialite/src/queue.rs
// ============================================================================
// Module: Blocking Command Queue
// Description: Unbounded multi-producer, single-consumer FIFO.
// Purpose: Serialize all commands for one connection in push order.
// Dependencies: crossbeam-channel
// ============================================================================

//! ## Overview
//! [`BlockingQueue`] is the only synchronization point between callers and a
//! connection worker. Pushes never block; [`BlockingQueue::pop`] parks the
//! single consumer until an item arrives.
//!
//! Closing is atomic with enqueueing the final item: once
//! [`BlockingQueue::close_with`] returns, every later push is rejected, and
//! every push that was accepted sits ahead of the final item.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::PoisonError;
use std::sync::RwLock;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use crossbeam_channel::unbounded;

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Unbounded FIFO with concurrent push and a single blocking consumer.
///
/// # Invariants
/// - Items are popped in the order their pushes completed.
/// - After close, `push` fails and `pop` drains what remains, then yields `None`.
#[derive(Debug)]
pub struct BlockingQueue<T> {
    /// Producer side; `None` once the queue is closed.
    sender: RwLock<Option<Sender<T>>>,
    /// Consumer side.
    receiver: Receiver<T>,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    /// Creates an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
        }
    }

    /// Appends an item without blocking.
    ///
    /// # Errors
    ///
    /// Returns the item back when the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(item).map_err(|err| err.into_inner()),
            None => Err(item),
        }
    }

    /// Blocks until an item is available.
    ///
    /// Returns `None` only when the queue is closed and fully drained.
    pub fn pop(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Enqueues `last` as the final item and closes the producer side.
    ///
    /// # Errors
    ///
    /// Returns `last` back when the queue was already closed.
    pub fn close_with(&self, last: T) -> Result<(), T> {
        let mut guard = self.sender.write().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(sender) => sender.send(last).map_err(|err| err.into_inner()),
            None => Err(last),
        }
    }

    /// Returns true once the producer side is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Returns the number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true when no items are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Removes and returns every queued item without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}
