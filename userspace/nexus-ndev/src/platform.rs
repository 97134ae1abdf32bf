// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Collaborator seams: message transport, memory grants, driver discovery and the
//! interface layer above us.

use core::fmt;

use thiserror::Error;

use crate::config::HWADDR_MAX;
use crate::driver::DriverId;
use crate::name::{IfName, Label};
use crate::wire::{Caps, Request};

/// Opaque process identifier used to address drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(pub i32);

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// Handle of a live memory grant. Negative raw values are never valid grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrantId(i32);

impl GrantId {
    pub const fn new(raw: i32) -> Option<Self> {
        if raw < 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub const fn raw(self) -> i32 {
        self.0
    }
}

/// Access a grant gives to the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Driver may read (packet send, multicast list).
    Read,
    /// Driver may write (packet receive).
    Write,
}

/// One contiguous region of a packet buffer chain owned by the interface layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment {
    pub addr: usize,
    pub len: usize,
}

impl Segment {
    pub const fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }
}

/// Hardware address, zero padded to [`HWADDR_MAX`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct HwAddr(pub [u8; HWADDR_MAX]);

/// Link/media state and error counters pushed by a driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub link: u32,
    pub media: u32,
    pub out_errors: u32,
    pub collisions: u32,
    pub in_errors: u32,
    pub in_drops: u32,
}

/// Outbound transport failures. Any of these is fatal to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("endpoint {0} unreachable")]
    Unreachable(Endpoint),
    #[error("asynchronous send queue overflow")]
    Overflow,
}

/// Grant table failures.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("grant {0:?} is not live")]
    NotLive(GrantId),
    #[error("grant table corrupted")]
    Corrupted,
}

/// Failure to query the discovery source.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery check failed ({0})")]
    Check(i32),
}

/// Fire-and-forget message delivery to drivers.
pub trait Transport {
    fn send(&mut self, endpoint: Endpoint, request: &Request) -> Result<(), TransportError>;
}

/// Creation and revocation of memory grants for zero-copy transfers.
pub trait GrantTable {
    /// Returns `None` when no grant can be created (resource exhaustion).
    fn create(&mut self, endpoint: Endpoint, segment: Segment, access: Access) -> Option<GrantId>;

    fn revoke(&mut self, grant: GrantId) -> Result<(), GrantError>;
}

/// Bytes reserved for a label in a discovery event.
pub const EVENT_LABEL_MAX: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStatus {
    Up,
    Down,
}

/// Driver state change reported by the discovery source.
///
/// The label is raw: it is only accepted if it is a valid bounded C string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverEvent {
    pub label: [u8; EVENT_LABEL_MAX],
    pub endpoint: Option<Endpoint>,
    pub status: DriverStatus,
}

impl DriverEvent {
    /// Builds an event from raw label bytes (truncated, zero padded).
    pub fn new(label: &[u8], endpoint: Option<Endpoint>, status: DriverStatus) -> Self {
        let mut raw = [0u8; EVENT_LABEL_MAX];
        let n = label.len().min(EVENT_LABEL_MAX);
        raw[..n].copy_from_slice(&label[..n]);
        Self { label: raw, endpoint, status }
    }

    pub fn up(label: &[u8], endpoint: Endpoint) -> Self {
        Self::new(label, Some(endpoint), DriverStatus::Up)
    }

    pub fn down(label: &[u8]) -> Self {
        Self::new(label, None, DriverStatus::Down)
    }

    /// The label, if it is non-empty and NUL-terminated within [`crate::LABEL_MAX`].
    pub fn valid_label(&self) -> Option<Label> {
        Label::from_nul_terminated(&self.label)
    }
}

/// Source of driver up/down reports.
pub trait Discovery {
    /// Next pending change, `Ok(None)` once all changes were consumed.
    fn poll(&mut self) -> Result<Option<DriverEvent>, DiscoveryError>;

    /// Whether a driver with `label` still exists (possibly mid-restart).
    fn is_present(&self, label: &Label) -> bool;
}

/// The interface layer that owns interface objects and packet buffers.
///
/// Callbacks run synchronously inside [`crate::Ndev`] operations and must not call back
/// into the same `Ndev`; follow-up requests are issued once the operation has returned.
pub trait Interface {
    type Handle: Copy + Eq + fmt::Debug;

    /// Creates the interface object for a newly initialized driver.
    fn add(&mut self, driver: DriverId, name: &IfName, caps: Caps) -> Option<Self::Handle>;

    /// (Re)enables the interface. `name` is only passed for a freshly added interface.
    #[allow(clippy::too_many_arguments)]
    fn enable(
        &mut self,
        handle: Self::Handle,
        name: Option<&IfName>,
        hwaddr: &HwAddr,
        hwaddr_len: usize,
        caps: Caps,
        link: u32,
        media: u32,
    ) -> bool;

    /// The driver restarted; the interface stays but is not operational.
    fn disable(&mut self, handle: Self::Handle);

    /// The driver is gone for good.
    fn remove(&mut self, handle: Self::Handle);

    fn configured(&mut self, handle: Self::Handle, result: i32);

    fn sent(&mut self, handle: Self::Handle, result: i32);

    fn received(&mut self, handle: Self::Handle, result: i32);

    fn status(&mut self, handle: Self::Handle, report: &StatusReport);
}
