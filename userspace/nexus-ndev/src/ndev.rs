// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The driver table and the driver lifecycle (discovery, restart, init handshake, teardown).

use core::marker::PhantomData;
use core::mem;

use log::{debug, error, info, trace, warn};

use crate::config::{ConfigError, NdevConfig, HWADDR_MAX};
use crate::driver::{DriverId, DriverRecord, DriverState, DriverStateKind};
use crate::error::{NdevError, Result};
use crate::name::{IfName, Label};
use crate::platform::{
    Discovery, DriverStatus, Endpoint, GrantTable, HwAddr, Interface, Transport,
};
use crate::pool::RequestPool;
use crate::queue::{Direction, Queue, QueueInfo};
use crate::wire::{InitReply, Request};

/// Point-in-time counters for management/diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NdevStats {
    /// Drivers discovered or restarted that have not completed initialization.
    pub pending: usize,
    pub active: usize,
    /// One past the highest table slot in use.
    pub high_water: usize,
    pub spare_available: usize,
    pub spare_total: usize,
    pub free_request_slots: usize,
    pub total_request_slots: usize,
    /// Drivers ignored because the table was full.
    pub dropped_drivers: u64,
    /// Times the table-full diagnostic was emitted (at most once).
    pub capacity_reports: u32,
}

/// Driver communication core.
///
/// Owns the outbound transport, the grant table, the request pool and the driver table.
/// The interface layer is borrowed per call so that its callbacks can run while `Ndev`
/// is mid-operation; callbacks must not re-enter `Ndev`.
pub struct Ndev<T, G, I: Interface> {
    pub(crate) config: NdevConfig,
    pub(crate) transport: T,
    pub(crate) grants: G,
    pub(crate) pool: RequestPool,
    pub(crate) drivers: Box<[DriverRecord<I::Handle>]>,
    pub(crate) high_water: usize,
    pending: usize,
    dropped: u64,
    capacity_reported: bool,
    _iface: PhantomData<fn(&mut I)>,
}

impl<T: Transport, G: GrantTable, I: Interface> Ndev<T, G, I> {
    /// Validates `config` and preallocates every request slot and driver record.
    pub fn new(
        config: NdevConfig,
        transport: T,
        grants: G,
    ) -> core::result::Result<Self, ConfigError> {
        config.validate()?;
        let drivers = (0..config.max_drivers)
            .map(|slot| {
                let n = slot as u32;
                DriverRecord::new(
                    Queue::new(n << 21, config.sendq_min),
                    Queue::new((2 * n + 1) << 20, config.recvq_max),
                )
            })
            .collect();
        let pool = RequestPool::new(config.request_slots(), config.spare_requests);
        debug!(
            "ndev: {} driver slots, {} request slots ({} spare)",
            config.max_drivers,
            pool.capacity(),
            config.spare_requests
        );
        Ok(Self {
            config,
            transport,
            grants,
            pool,
            drivers,
            high_water: 0,
            pending: 0,
            dropped: 0,
            capacity_reported: false,
            _iface: PhantomData,
        })
    }

    pub fn config(&self) -> &NdevConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn grants(&self) -> &G {
        &self.grants
    }

    pub fn stats(&self) -> NdevStats {
        let active = self.drivers[..self.high_water]
            .iter()
            .filter(|record| record.kind() == DriverStateKind::Active)
            .count();
        NdevStats {
            pending: self.pending,
            active,
            high_water: self.high_water,
            spare_available: self.pool.spares(),
            spare_total: self.pool.spares_total(),
            free_request_slots: self.pool.free_len(),
            total_request_slots: self.pool.capacity(),
            dropped_drivers: self.dropped,
            capacity_reports: u32::from(self.capacity_reported),
        }
    }

    /// State of a table slot; `None` if `id` is outside the table.
    pub fn driver_state(&self, id: DriverId) -> Option<DriverStateKind> {
        self.drivers.get(id.index()).map(DriverRecord::kind)
    }

    /// Slot of the known driver with `label`.
    pub fn driver_id(&self, label: &Label) -> Option<DriverId> {
        self.find_label(label).map(DriverId::from_index)
    }

    pub fn queue_info(&self, id: DriverId, direction: Direction) -> Option<QueueInfo> {
        self.drivers.get(id.index()).map(|record| record.queue(direction).info())
    }

    /// Applies a batch of driver changes reported by `discovery`.
    ///
    /// Announced drivers are (re)started first; then every known driver whose label is no
    /// longer present is torn down. The presence check is by label only, since a driver
    /// keeps its label but not its endpoint across a restart.
    pub fn reconcile(&mut self, discovery: &mut impl Discovery, iface: &mut I) {
        loop {
            let event = match discovery.poll() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    warn!("ndev: driver discovery check failed: {err}");
                    break;
                }
            };
            if event.status != DriverStatus::Up {
                continue;
            }
            let Some(endpoint) = event.endpoint else {
                continue;
            };
            let Some(label) = event.valid_label() else {
                debug!("ndev: ignoring driver at {endpoint} with malformed label");
                continue;
            };
            self.driver_up(&label, endpoint, iface);
        }

        let mut index = 0;
        while index < self.high_water {
            let record = &self.drivers[index];
            if let (false, Some(label)) = (record.is_free(), record.label) {
                if !discovery.is_present(&label) {
                    self.driver_down(index, iface);
                }
            }
            index += 1;
        }
    }

    fn driver_up(&mut self, label: &Label, endpoint: Endpoint, iface: &mut I) {
        if let Some(index) = self.find_label(label) {
            self.driver_restart(index, endpoint, iface);
            return;
        }

        let Some(index) = self.free_slot() else {
            self.dropped += 1;
            if !self.capacity_reported {
                self.capacity_reported = true;
                warn!("ndev: not enough driver slots, ignoring driver {label}");
            }
            return;
        };
        if index == self.high_water {
            self.high_water += 1;
        }

        let record = &mut self.drivers[index];
        record.label = Some(*label);
        record.state = DriverState::Pending { endpoint, iface: None };
        record.sendq.init();
        record.recvq.init();
        self.pending += 1;

        info!("ndev: driver {label} at {endpoint} is up ({})", DriverId::from_index(index));
        self.send_init(index);
    }

    /// Restarts the handshake for a known driver under a (possibly new) endpoint.
    ///
    /// Any outstanding init request is superseded: the queues move to a fresh sequence
    /// number so a late reply from the previous instance cannot match.
    fn driver_restart(&mut self, index: usize, endpoint: Endpoint, iface: &mut I) {
        let record = &mut self.drivers[index];
        record.sendq.reset(&mut self.pool, &mut self.grants);
        record.recvq.reset(&mut self.pool, &mut self.grants);
        record.sendq.init();
        record.recvq.init();

        let handle = match record.state {
            DriverState::Active { iface: handle, .. } => {
                iface.disable(handle);
                self.pending += 1;
                Some(handle)
            }
            DriverState::Pending { iface: handle, .. } => handle,
            DriverState::Free => {
                debug_assert!(false, "restart of free driver slot {index}");
                return;
            }
        };
        record.state = DriverState::Pending { endpoint, iface: handle };

        info!("ndev: driver {} restarted at {endpoint}", DriverId::from_index(index));
        self.send_init(index);
    }

    /// Forgets a driver: cancels its requests and removes its interface, if any.
    pub(crate) fn driver_down(&mut self, index: usize, iface: &mut I) {
        let record = &mut self.drivers[index];
        record.sendq.reset(&mut self.pool, &mut self.grants);
        record.recvq.reset(&mut self.pool, &mut self.grants);
        record.label = None;

        let endpoint = match mem::replace(&mut record.state, DriverState::Free) {
            DriverState::Free => return,
            DriverState::Pending { endpoint, iface: handle } => {
                self.pending = self.pending.saturating_sub(1);
                if let Some(handle) = handle {
                    iface.remove(handle);
                }
                endpoint
            }
            DriverState::Active { endpoint, iface: handle } => {
                iface.remove(handle);
                endpoint
            }
        };
        info!("ndev: driver {} at {endpoint} is gone", DriverId::from_index(index));

        while self.high_water > 0 && self.drivers[self.high_water - 1].is_free() {
            self.high_water -= 1;
        }
    }

    /// Handles a driver's answer to the outstanding init request.
    pub(crate) fn init_reply(&mut self, index: usize, reply: &InitReply, iface: &mut I) {
        let record = &self.drivers[index];
        let DriverState::Pending { endpoint, iface: existing } = record.state else {
            trace!("ndev: init reply from active driver {}", DriverId::from_index(index));
            return;
        };
        if reply.id != record.sendq.head() {
            trace!("ndev: stale init reply {} from {endpoint}", reply.id);
            return;
        }

        let Some(name) = IfName::from_nul_terminated(&reply.name) else {
            warn!("ndev: driver {endpoint} provided invalid name");
            self.driver_down(index, iface);
            return;
        };
        let hwaddr_len = usize::from(reply.hwaddr_len);
        if !(1..=HWADDR_MAX).contains(&hwaddr_len) {
            warn!("ndev: driver {endpoint} provided invalid HW-addr length {hwaddr_len}");
            self.driver_down(index, iface);
            return;
        }
        if reply.max_send < 1 || reply.max_recv < 1 {
            warn!("ndev: driver {endpoint} provided invalid queue maximum");
            self.driver_down(index, iface);
            return;
        }

        let id = DriverId::from_index(index);
        let (handle, created) = match existing {
            Some(handle) => (handle, false),
            None => match iface.add(id, &name, reply.caps) {
                Some(handle) => {
                    self.drivers[index].state =
                        DriverState::Pending { endpoint, iface: Some(handle) };
                    (handle, true)
                }
                None => {
                    debug!("ndev: interface layer rejected driver {id} ({name})");
                    self.driver_down(index, iface);
                    return;
                }
            },
        };

        // Maxima go first: enabling may make the interface layer issue requests at once.
        let record = &mut self.drivers[index];
        record.sendq.activate(usize::from(reply.max_send));
        record.recvq.activate(usize::from(reply.max_recv).min(self.config.recvq_max));

        let mut hwaddr = HwAddr::default();
        hwaddr.0[..hwaddr_len].copy_from_slice(&reply.hwaddr[..hwaddr_len]);

        let enabled = iface.enable(
            handle,
            created.then_some(&name),
            &hwaddr,
            hwaddr_len,
            reply.caps,
            reply.link,
            reply.media,
        );
        if !enabled {
            debug!("ndev: interface layer failed to enable driver {id} ({name})");
            self.driver_down(index, iface);
            return;
        }

        self.drivers[index].state = DriverState::Active { endpoint, iface: handle };
        self.pending = self.pending.saturating_sub(1);
        info!("ndev: driver {id} at {endpoint} is active as {name}");
    }

    fn send_init(&mut self, index: usize) {
        let record = &self.drivers[index];
        if let Some(endpoint) = record.endpoint() {
            let request = Request::Init { id: record.sendq.head() };
            self.post(endpoint, &request);
        }
    }

    /// Hands `request` to the transport.
    ///
    /// # Panics
    ///
    /// A transport failure leaves driver and queue state inconsistent; it is fatal.
    pub(crate) fn post(&mut self, endpoint: Endpoint, request: &Request) {
        if let Err(err) = self.transport.send(endpoint, request) {
            error!("ndev: unable to send {:#x} to {endpoint}: {err}", request.message_type());
            panic!("ndev: unable to send {:#x} to {endpoint}: {err}", request.message_type());
        }
    }

    /// Entry point validation: the slot and endpoint of an active driver.
    pub(crate) fn active(&self, id: DriverId) -> Result<(usize, Endpoint)> {
        match self.drivers.get(id.index()).map(|record| record.state) {
            None | Some(DriverState::Free) => Err(NdevError::UnknownDriver(id)),
            Some(DriverState::Pending { .. }) => Err(NdevError::NotActive(id)),
            Some(DriverState::Active { endpoint, .. }) => Ok((id.index(), endpoint)),
        }
    }

    pub(crate) fn find_endpoint(&self, endpoint: Endpoint) -> Option<usize> {
        self.drivers[..self.high_water]
            .iter()
            .position(|record| record.endpoint() == Some(endpoint))
    }

    fn find_label(&self, label: &Label) -> Option<usize> {
        self.drivers[..self.high_water]
            .iter()
            .position(|record| !record.is_free() && record.label.as_ref() == Some(label))
    }

    fn free_slot(&self) -> Option<usize> {
        self.drivers[..self.high_water]
            .iter()
            .position(DriverRecord::is_free)
            .or((self.high_water < self.drivers.len()).then_some(self.high_water))
    }
}
