// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-driver FIFO request queues with sequence-numbered admission.

use crate::platform::GrantTable;
use crate::pool::{RequestKind, RequestPool, SlotIndex};

/// Which of a driver's two queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Packet send and configuration requests.
    Send,
    /// Packet receive requests.
    Recv,
}

impl From<RequestKind> for Direction {
    fn from(kind: RequestKind) -> Self {
        match kind {
            RequestKind::Conf | RequestKind::Send => Self::Send,
            RequestKind::Recv => Self::Recv,
        }
    }
}

/// Read-only snapshot of a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueInfo {
    /// Sequence number of the oldest pending request.
    pub head: u32,
    pub depth: usize,
    /// Negotiated maximum depth; zero until the driver completed initialization.
    pub max: usize,
}

/// A slot reserved by [`Queue::get`] but not yet committed by [`Queue::add`].
#[derive(Debug)]
pub(crate) struct Ticket {
    slot: SlotIndex,
    seq: u32,
    kind: RequestKind,
}

impl Ticket {
    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }
}

pub(crate) struct Queue {
    head: u32,
    depth: usize,
    max: usize,
    // Depth available without borrowing spares (send queue only).
    guaranteed: usize,
    first: Option<SlotIndex>,
    last: Option<SlotIndex>,
}

impl Queue {
    pub fn new(head: u32, guaranteed: usize) -> Self {
        Self { head, depth: 0, max: 0, guaranteed, first: None, last: None }
    }

    pub fn info(&self) -> QueueInfo {
        QueueInfo { head: self.head, depth: self.depth, max: self.max }
    }

    pub fn head(&self) -> u32 {
        self.head
    }

    pub fn has_room(&self) -> bool {
        self.depth < self.max
    }

    /// Prepares an empty queue for a new driver instance. Sequence numbers only grow.
    pub fn init(&mut self) {
        debug_assert_eq!(self.depth, 0, "init on a queue with pending requests");
        self.head = self.head.wrapping_add(1);
        self.depth = 0;
        self.max = 0;
        self.first = None;
        self.last = None;
    }

    /// Opens the queue up to `max` requests and moves to a fresh sequence number.
    pub fn activate(&mut self, max: usize) {
        self.max = max;
        self.head = self.head.wrapping_add(1);
    }

    /// Reserves the next free slot for a request of `kind`, if admission allows it.
    pub fn get(&self, pool: &mut RequestPool, kind: RequestKind) -> Option<Ticket> {
        if self.depth >= self.max {
            return None;
        }
        if kind.uses_spares() && self.depth >= self.guaranteed && pool.spares() == 0 {
            return None;
        }
        let slot = pool.peek_free(kind)?;
        Some(Ticket { slot, seq: self.head.wrapping_add(self.depth as u32), kind })
    }

    /// Commits a dispatched request to the tail of the queue.
    pub fn add(&mut self, pool: &mut RequestPool, ticket: Ticket) {
        if ticket.kind.uses_spares() && self.depth >= self.guaranteed {
            pool.take_spare();
        }
        let taken = pool.take_free();
        debug_assert_eq!(taken, Some(ticket.slot), "ticket no longer heads the free list");

        match self.last {
            Some(last) => pool.link(last, Some(ticket.slot)),
            None => self.first = Some(ticket.slot),
        }
        self.last = Some(ticket.slot);
        self.depth += 1;
    }

    /// Completes the head request if it has sequence `seq` and kind `kind`.
    ///
    /// Anything else (stale or out-of-order replies) leaves the queue untouched.
    pub fn remove(
        &mut self,
        pool: &mut RequestPool,
        grants: &mut impl GrantTable,
        kind: RequestKind,
        seq: u32,
    ) -> bool {
        if self.depth == 0 || self.head != seq {
            return false;
        }
        match self.first {
            Some(first) if pool.kind(first) == kind => {
                self.advance(pool, grants);
                true
            }
            _ => false,
        }
    }

    /// Cancels every pending request and closes the queue until the next activation.
    pub fn reset(&mut self, pool: &mut RequestPool, grants: &mut impl GrantTable) {
        while self.depth > 0 {
            self.advance(pool, grants);
        }
        self.max = 0;
    }

    fn advance(&mut self, pool: &mut RequestPool, grants: &mut impl GrantTable) {
        let Some(slot) = self.first else {
            debug_assert!(false, "queue depth {} without requests", self.depth);
            self.depth = 0;
            return;
        };
        if pool.kind(slot).uses_spares() && self.depth > self.guaranteed {
            pool.return_spare();
        }
        self.first = pool.next(slot);
        if self.first.is_none() {
            self.last = None;
        }
        pool.link(slot, None);
        pool.release(slot, grants);
        self.head = self.head.wrapping_add(1);
        self.depth -= 1;
    }
}
