// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Errors returned by request-issuing operations.

use thiserror::Error;

use crate::driver::DriverId;

/// Result alias for ndev operations.
pub type Result<T> = core::result::Result<T, NdevError>;

/// Why a request could not be issued.
///
/// `Busy` is flow control, not a failure: retry once a reply has completed.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum NdevError {
    #[error("queue full")]
    Busy,
    #[error("out of grants")]
    NoMemory,
    #[error("unknown driver {0}")]
    UnknownDriver(DriverId),
    #[error("driver {0} is not active")]
    NotActive(DriverId),
    #[error("more than {} segments", crate::IOV_MAX)]
    TooManySegments,
    #[error("segment longer than {} bytes", u16::MAX)]
    SegmentTooLarge,
    #[error("multicast list mode without a list")]
    MissingMulticastList,
}
