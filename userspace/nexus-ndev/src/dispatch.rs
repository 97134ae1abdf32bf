// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Routing of driver replies.

use log::{debug, trace};

use crate::driver::DriverState;
use crate::ndev::Ndev;
use crate::platform::{Endpoint, GrantTable, Interface, StatusReport, Transport};
use crate::pool::RequestKind;
use crate::queue::Direction;
use crate::wire::{Reply, Request, WireError};

impl<T: Transport, G: GrantTable, I: Interface> Ndev<T, G, I> {
    /// Handles a reply received from `endpoint`.
    ///
    /// Replies from unknown endpoints, replies for drivers that are not active, and
    /// replies that do not match the head of their queue are dropped.
    pub fn process(&mut self, endpoint: Endpoint, reply: &Reply, iface: &mut I) {
        let Some(index) = self.find_endpoint(endpoint) else {
            trace!("ndev: dropping {:#x} from unknown {endpoint}", reply.message_type());
            return;
        };

        match reply {
            Reply::Init(init) => self.init_reply(index, init, iface),
            Reply::Conf(result) => {
                if let Some(handle) = self.complete(index, RequestKind::Conf, result.id) {
                    iface.configured(handle, result.result);
                }
            }
            Reply::Send(result) => {
                if let Some(handle) = self.complete(index, RequestKind::Send, result.id) {
                    iface.sent(handle, result.result);
                }
            }
            Reply::Recv(result) => {
                if let Some(handle) = self.complete(index, RequestKind::Recv, result.id) {
                    iface.received(handle, result.result);
                }
            }
            Reply::Status { id, report } => self.status(index, *id, report, iface),
        }
    }

    /// Decodes a raw frame from `endpoint` and handles it.
    pub fn process_frame(&mut self, endpoint: Endpoint, bytes: &[u8], iface: &mut I) {
        match Reply::decode(bytes) {
            Ok(reply) => self.process(endpoint, &reply, iface),
            Err(WireError::UnknownType(ty)) => {
                debug!("ndev: ignoring message type {ty:#x} from {endpoint}")
            }
            Err(err) => debug!("ndev: dropping frame from {endpoint}: {err}"),
        }
    }

    // Pops the matching queue head; yields the interface to notify.
    fn complete(&mut self, index: usize, kind: RequestKind, seq: u32) -> Option<I::Handle> {
        let record = &mut self.drivers[index];
        let DriverState::Active { iface, .. } = record.state else {
            trace!("ndev: {kind:?} reply {seq} for inactive driver");
            return None;
        };
        let queue = record.queue_mut(Direction::from(kind));
        if queue.remove(&mut self.pool, &mut self.grants, kind, seq) {
            Some(iface)
        } else {
            trace!("ndev: dropping stale {kind:?} reply {seq}");
            None
        }
    }

    fn status(&mut self, index: usize, id: u32, report: &StatusReport, iface: &mut I) {
        let DriverState::Active { endpoint, iface: handle } = self.drivers[index].state else {
            trace!("ndev: status {id} for inactive driver");
            return;
        };
        iface.status(handle, report);
        // The acknowledgement is the driver's only throttle on status reports.
        self.post(endpoint, &Request::StatusReply { id });
    }
}
