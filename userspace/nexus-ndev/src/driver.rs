// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Driver table records and their lifecycle state.

use core::fmt;

use crate::name::Label;
use crate::platform::Endpoint;
use crate::queue::{Direction, Queue};

/// Stable identifier of a driver table slot.
///
/// A slot keeps its id across driver restarts (matched by label). Once the driver is gone
/// the id may be reused for an unrelated driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverId(u16);

impl DriverId {
    /// Names table slot `index`. Whether it holds a driver is checked on use.
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    pub(crate) fn from_index(index: usize) -> Self {
        // The table is bounded well below u16::MAX by config validation.
        Self(index as u16)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a table slot, without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStateKind {
    Free,
    /// Initialization request outstanding.
    Pending,
    Active,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DriverState<H> {
    Free,
    /// `iface` survives restarts, disabled until the driver is active again.
    Pending { endpoint: Endpoint, iface: Option<H> },
    Active { endpoint: Endpoint, iface: H },
}

pub(crate) struct DriverRecord<H> {
    pub state: DriverState<H>,
    pub label: Option<Label>,
    pub sendq: Queue,
    pub recvq: Queue,
}

impl<H: Copy> DriverRecord<H> {
    pub fn new(sendq: Queue, recvq: Queue) -> Self {
        Self { state: DriverState::Free, label: None, sendq, recvq }
    }

    pub fn kind(&self) -> DriverStateKind {
        match self.state {
            DriverState::Free => DriverStateKind::Free,
            DriverState::Pending { .. } => DriverStateKind::Pending,
            DriverState::Active { .. } => DriverStateKind::Active,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self.state, DriverState::Free)
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        match self.state {
            DriverState::Free => None,
            DriverState::Pending { endpoint, .. } | DriverState::Active { endpoint, .. } => {
                Some(endpoint)
            }
        }
    }

    pub fn queue(&self, direction: Direction) -> &Queue {
        match direction {
            Direction::Send => &self.sendq,
            Direction::Recv => &self.recvq,
        }
    }

    pub fn queue_mut(&mut self, direction: Direction) -> &mut Queue {
        match direction {
            Direction::Send => &mut self.sendq,
            Direction::Recv => &mut self.recvq,
        }
    }
}
