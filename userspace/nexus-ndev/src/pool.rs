// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed pool of request slots shared by all drivers.
//!
//! Slots form intrusive singly-linked lists (the free list, and one list per queue) so
//! that acquisition and release are O(1) and never allocate after construction.

use log::error;

use crate::config::IOV_MAX;
use crate::platform::{GrantId, GrantTable};

/// Kind of request a slot tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Conf,
    Send,
    Recv,
}

impl RequestKind {
    /// Send-queue kinds may borrow from the shared spare pool; receives never do.
    pub(crate) fn uses_spares(self) -> bool {
        !matches!(self, Self::Recv)
    }
}

/// Index of a slot in the pool.
pub(crate) type SlotIndex = usize;

#[derive(Clone, Copy)]
struct RequestSlot {
    next: Option<SlotIndex>,
    kind: RequestKind,
    // Grants in use; the first `None` terminates the list.
    grants: [Option<GrantId>; IOV_MAX],
}

impl RequestSlot {
    const EMPTY: Self = Self { next: None, kind: RequestKind::Send, grants: [None; IOV_MAX] };
}

pub(crate) struct RequestPool {
    slots: Box<[RequestSlot]>,
    free_head: Option<SlotIndex>,
    free_len: usize,
    spares: usize,
    spares_total: usize,
}

impl RequestPool {
    pub fn new(total: usize, spares: usize) -> Self {
        let mut slots = vec![RequestSlot::EMPTY; total].into_boxed_slice();
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.next = if index + 1 < total { Some(index + 1) } else { None };
        }
        let free_head = if total > 0 { Some(0) } else { None };
        Self { slots, free_head, free_len: total, spares, spares_total: spares }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn free_len(&self) -> usize {
        self.free_len
    }

    pub fn spares(&self) -> usize {
        self.spares
    }

    pub fn spares_total(&self) -> usize {
        self.spares_total
    }

    /// The slot the next `take_free` will hand out, primed for a request of `kind`.
    ///
    /// The slot stays on the free list, so abandoning it requires no rollback.
    pub fn peek_free(&mut self, kind: RequestKind) -> Option<SlotIndex> {
        let head = self.free_head?;
        let slot = &mut self.slots[head];
        slot.kind = kind;
        slot.grants = [None; IOV_MAX];
        Some(head)
    }

    /// Unlinks the free list head. Must follow a successful `peek_free`.
    pub fn take_free(&mut self) -> Option<SlotIndex> {
        let head = self.free_head?;
        self.free_head = self.slots[head].next.take();
        self.free_len -= 1;
        Some(head)
    }

    /// Revokes the slot's grants and pushes it back on the free list.
    pub fn release(&mut self, slot: SlotIndex, grants: &mut impl GrantTable) {
        self.revoke_grants(slot, grants);
        self.slots[slot].next = self.free_head;
        self.free_head = Some(slot);
        self.free_len += 1;
    }

    /// Revokes every live grant recorded on `slot`.
    ///
    /// # Panics
    ///
    /// A failed revocation means the grant table is corrupted; the process cannot continue.
    pub fn revoke_grants(&mut self, slot: SlotIndex, grants: &mut impl GrantTable) {
        let recorded = core::mem::replace(&mut self.slots[slot].grants, [None; IOV_MAX]);
        for grant in recorded.into_iter().map_while(|g| g) {
            if let Err(err) = grants.revoke(grant) {
                error!("ndev: unable to revoke grant {}: {err}", grant.raw());
                panic!("ndev: unable to revoke grant {}: {err}", grant.raw());
            }
        }
    }

    pub fn set_grant(&mut self, slot: SlotIndex, index: usize, grant: GrantId) {
        self.slots[slot].grants[index] = Some(grant);
    }

    pub fn kind(&self, slot: SlotIndex) -> RequestKind {
        self.slots[slot].kind
    }

    pub fn next(&self, slot: SlotIndex) -> Option<SlotIndex> {
        self.slots[slot].next
    }

    pub fn link(&mut self, slot: SlotIndex, next: Option<SlotIndex>) {
        self.slots[slot].next = next;
    }

    pub fn take_spare(&mut self) {
        debug_assert!(self.spares > 0, "spare pool underflow");
        self.spares = self.spares.saturating_sub(1);
    }

    pub fn return_spare(&mut self) {
        debug_assert!(self.spares < self.spares_total, "spare pool overflow");
        self.spares = (self.spares + 1).min(self.spares_total);
    }
}
