// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Driver configuration requests.

use crate::config::HWADDR_MAX;
use crate::driver::DriverId;
use crate::error::{NdevError, Result};
use crate::ndev::Ndev;
use crate::platform::{Access, GrantTable, HwAddr, Interface, Segment, Transport};
use crate::pool::RequestKind;
use crate::wire::{Caps, ConfRequest, ConfSet, Mode, Request};

/// Array of `count` hardware addresses, [`HWADDR_MAX`] bytes each, owned by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MulticastList {
    pub addr: usize,
    pub count: u32,
}

/// A set of configuration changes. Only fields flagged in `set` are sent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfChange {
    pub set: ConfSet,
    pub mode: Mode,
    /// Required when `mode` contains [`Mode::MCAST_LIST`].
    pub mcast_list: Option<MulticastList>,
    pub caps: Caps,
    pub flags: u32,
    pub media: u32,
    pub hwaddr: HwAddr,
}

impl<T: Transport, G: GrantTable, I: Interface> Ndev<T, G, I> {
    /// Sends a configuration request to driver `id`.
    ///
    /// An empty `set` is legal and simply elicits a confirmation. The multicast list must
    /// stay valid until the `configured` callback fires.
    pub fn configure(&mut self, id: DriverId, change: &ConfChange) -> Result<u32> {
        let (index, endpoint) = self.active(id)?;

        let mcast = if change.set.contains(ConfSet::MODE) && change.mode.contains(Mode::MCAST_LIST)
        {
            match change.mcast_list {
                Some(list) if list.count > 0 => Some(list),
                _ => return Err(NdevError::MissingMulticastList),
            }
        } else {
            None
        };

        let ticket = self.drivers[index]
            .sendq
            .get(&mut self.pool, RequestKind::Conf)
            .ok_or(NdevError::Busy)?;

        let mut request =
            ConfRequest { id: ticket.seq(), set: change.set, ..ConfRequest::default() };
        if change.set.contains(ConfSet::MODE) {
            request.mode = change.mode;
            if let Some(list) = mcast {
                let len = (list.count as usize).saturating_mul(HWADDR_MAX);
                let grant = self
                    .grants
                    .create(endpoint, Segment::new(list.addr, len), Access::Read)
                    .ok_or(NdevError::NoMemory)?;
                self.pool.set_grant(ticket.slot(), 0, grant);
                request.mcast_grant = Some(grant);
                request.mcast_count = list.count;
            }
        }
        if change.set.contains(ConfSet::CAPS) {
            request.caps = change.caps;
        }
        if change.set.contains(ConfSet::FLAGS) {
            request.flags = change.flags;
        }
        if change.set.contains(ConfSet::MEDIA) {
            request.media = change.media;
        }
        if change.set.contains(ConfSet::HWADDR) {
            request.hwaddr = change.hwaddr.0;
        }

        self.post(endpoint, &Request::Conf(request));

        let seq = ticket.seq();
        self.drivers[index].sendq.add(&mut self.pool, ticket);
        Ok(seq)
    }
}
