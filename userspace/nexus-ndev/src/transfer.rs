// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Zero-copy packet send and receive requests.

use crate::config::IOV_MAX;
use crate::driver::DriverId;
use crate::error::{NdevError, Result};
use crate::ndev::Ndev;
use crate::platform::{Access, GrantTable, Interface, Segment, Transport};
use crate::pool::RequestKind;
use crate::queue::Direction;
use crate::wire::{Request, TransferRequest};

impl<T: Transport, G: GrantTable, I: Interface> Ndev<T, G, I> {
    /// Asks driver `id` to transmit the packet held in `segments`.
    ///
    /// Returns the request's sequence number; the interface layer's `sent` callback
    /// fires when the driver replies. The segments must stay valid until then.
    pub fn send(&mut self, id: DriverId, segments: &[Segment]) -> Result<u32> {
        self.transfer(id, RequestKind::Send, segments)
    }

    /// Hands driver `id` a buffer to receive the next packet into.
    pub fn recv(&mut self, id: DriverId, segments: &[Segment]) -> Result<u32> {
        self.transfer(id, RequestKind::Recv, segments)
    }

    /// Whether a `recv` for driver `id` would currently be admitted by its queue.
    pub fn can_recv(&self, id: DriverId) -> bool {
        match self.active(id) {
            Ok((index, _)) => self.drivers[index].recvq.has_room(),
            Err(_) => false,
        }
    }

    fn transfer(&mut self, id: DriverId, kind: RequestKind, segments: &[Segment]) -> Result<u32> {
        let (index, endpoint) = self.active(id)?;
        if segments.len() > IOV_MAX {
            return Err(NdevError::TooManySegments);
        }
        let mut lens = [0u16; IOV_MAX];
        for (len, segment) in lens.iter_mut().zip(segments) {
            *len = u16::try_from(segment.len).map_err(|_| NdevError::SegmentTooLarge)?;
        }

        let direction = Direction::from(kind);
        let ticket = self.drivers[index]
            .queue(direction)
            .get(&mut self.pool, kind)
            .ok_or(NdevError::Busy)?;

        let access = match kind {
            RequestKind::Recv => Access::Write,
            RequestKind::Send | RequestKind::Conf => Access::Read,
        };
        let mut request = TransferRequest::new(ticket.seq());
        request.count = segments.len() as u8;
        request.lens = lens;
        for (i, segment) in segments.iter().enumerate() {
            let Some(grant) = self.grants.create(endpoint, *segment, access) else {
                // The slot never left the free list; only the grants need unwinding.
                self.pool.revoke_grants(ticket.slot(), &mut self.grants);
                return Err(NdevError::NoMemory);
            };
            self.pool.set_grant(ticket.slot(), i, grant);
            request.grants[i] = Some(grant);
        }

        let message = match kind {
            RequestKind::Recv => Request::Recv(request),
            RequestKind::Send | RequestKind::Conf => Request::Send(request),
        };
        self.post(endpoint, &message);

        let seq = ticket.seq();
        self.drivers[index].queue_mut(direction).add(&mut self.pool, ticket);
        Ok(seq)
    }
}
