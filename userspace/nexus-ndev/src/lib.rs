// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Network driver communication layer for the network stack service
//! OWNERS: @runtime
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + host scenario/property tests under `tests/`
//!
//! Sits between the interface layer of the network stack and out-of-process network
//! drivers. Drivers are discovered through a [`Discovery`] source, initialized with an
//! asynchronous handshake, and then serve send/receive/configure requests over
//! zero-copy memory grants. Replies are matched strictly in FIFO order per queue, so
//! stale replies from a restarted driver can never complete fresh work.
//!
//! PUBLIC API:
//!   - Ndev: the driver table, request pool and per-driver queue pairs
//!   - Ndev::new(): single initialization entry point (preallocates everything)
//!   - Ndev::reconcile(): apply a batch of driver up/down reports
//!   - Ndev::send()/recv()/can_recv()/configure(): issue requests (never block)
//!   - Ndev::process()/process_frame(): route driver replies
//!   - Transport/GrantTable/Discovery/Interface: collaborator seams
//!   - wire: fixed 64-byte frame codec for requests and replies
//!   - host: in-memory collaborators for host tests (feature `backend-host`)
//!
//! INVARIANTS:
//!   - No allocation after `Ndev::new()`: request slots and driver records are fixed
//!   - 0 <= depth <= max for every queue; head sequence numbers only move forward
//!   - The spare counter never goes negative and never exceeds its configured total
//!   - A reply that does not match the queue head (sequence and kind) mutates nothing

#![forbid(unsafe_code)]
#![deny(clippy::all)]

mod conf;
pub mod config;
mod dispatch;
mod driver;
mod error;
mod name;
mod ndev;
mod platform;
mod pool;
mod queue;
mod transfer;
pub mod wire;

#[cfg(feature = "backend-host")]
pub mod host;

pub use conf::{ConfChange, MulticastList};
pub use config::{ConfigError, NdevConfig, HWADDR_MAX, IOV_MAX, LABEL_MAX, NAME_MAX};
pub use driver::{DriverId, DriverStateKind};
pub use error::{NdevError, Result};
pub use name::{BoundedName, IfName, Label};
pub use ndev::{Ndev, NdevStats};
pub use platform::{
    Access, Discovery, DiscoveryError, DriverEvent, DriverStatus, Endpoint, GrantError,
    GrantId, GrantTable, HwAddr, Interface, Segment, StatusReport, Transport, TransportError,
    EVENT_LABEL_MAX,
};
pub use pool::RequestKind;
pub use queue::{Direction, QueueInfo};
pub use wire::{Caps, ConfSet, Mode};
