use std::fmt;
use std::ops::Range;

use crate::ib::cq::CqHandle;
use crate::ib::type_alias::{Psn, PSN_MASK};

use super::QpHandle;

/// Direction of a work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WqKind {
    /// Send work queue.
    Send,

    /// Receive work queue.
    Recv,
}

/// Handle of a work queue: its queue pair and its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WqHandle {
    /// Owning queue pair.
    pub qp: QpHandle,

    /// Send or receive half.
    pub kind: WqKind,
}

/// Work queue: the send or receive half of a queue pair.
///
/// The buffer slots of both halves live in one array owned by the
/// [`QueuePair`](super::QueuePair); each work queue covers its own range of it.
///
/// `fill` counts the posted and not yet completed entries. The core bumps it
/// after the hardware accepted a post and drops it on every completion, so
/// `0 <= fill <= capacity` holds at all times.
pub struct WorkQueue {
    kind: WqKind,
    qp: QpHandle,
    cq: CqHandle,
    psn: Psn,
    pub(crate) fill: usize,
    next_idx: usize,
    base: usize,
    capacity: usize,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("kind", &self.kind)
            .field("cq", &self.cq)
            .field("psn", &self.psn)
            .field("fill", &self.fill)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl WorkQueue {
    /// Create a work queue covering slots `base..base + capacity`, with a
    /// random starting packet sequence number.
    pub(crate) fn new(kind: WqKind, qp: QpHandle, cq: CqHandle, base: usize, capacity: usize) -> Self {
        Self {
            kind,
            qp,
            cq,
            psn: rand::random::<Psn>() & PSN_MASK,
            fill: 0,
            next_idx: 0,
            base,
            capacity,
        }
    }

    /// Get the handle of this work queue.
    #[inline]
    pub fn handle(&self) -> WqHandle {
        WqHandle {
            qp: self.qp,
            kind: self.kind,
        }
    }

    /// Get the direction of this work queue.
    #[inline]
    pub fn kind(&self) -> WqKind {
        self.kind
    }

    /// Determine whether this is a send work queue.
    #[inline]
    pub fn is_send(&self) -> bool {
        self.kind == WqKind::Send
    }

    /// Get the owning queue pair.
    #[inline]
    pub fn qp(&self) -> QpHandle {
        self.qp
    }

    /// Get the completion queue this work queue reports to.
    #[inline]
    pub fn cq(&self) -> CqHandle {
        self.cq
    }

    /// Get the initial packet sequence number.
    #[inline]
    pub fn psn(&self) -> Psn {
        self.psn
    }

    /// Get the number of outstanding entries.
    #[inline]
    pub fn fill(&self) -> usize {
        self.fill
    }

    /// Get the number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Determine whether every slot is taken.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.fill >= self.capacity
    }

    /// Get the running producer index. Drivers derive ring positions from it.
    #[inline]
    pub fn next_idx(&self) -> usize {
        self.next_idx
    }

    /// Range of this work queue's slots in the queue pair's slot array.
    #[inline]
    pub(crate) fn range(&self) -> Range<usize> {
        self.base..self.base + self.capacity
    }

    /// Advance the producer index and return the ring slot it pointed at.
    pub(crate) fn advance(&mut self) -> usize {
        assert!(self.capacity > 0, "claiming a slot of a zero-capacity work queue");
        let idx = self.next_idx % self.capacity;
        self.next_idx = self.next_idx.wrapping_add(1);
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wq(capacity: usize) -> WorkQueue {
        WorkQueue::new(WqKind::Send, QpHandle(0), CqHandle(0), 3, capacity)
    }

    #[test]
    fn psn_is_24_bit() {
        for _ in 0..32 {
            assert_eq!(wq(1).psn() & !PSN_MASK, 0);
        }
    }

    #[test]
    fn producer_index_wraps_around_ring() {
        let mut wq = wq(2);
        assert_eq!(wq.range(), 3..5);
        assert_eq!(wq.advance(), 0);
        assert_eq!(wq.advance(), 1);
        assert_eq!(wq.advance(), 0);
        assert_eq!(wq.next_idx(), 3);
    }

    #[test]
    #[should_panic(expected = "zero-capacity")]
    fn zero_capacity_ring() {
        wq(0).advance();
    }
}
