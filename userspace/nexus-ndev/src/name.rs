// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded, NUL-terminated names (driver labels, interface names).

use core::fmt;

use crate::config::{LABEL_MAX, NAME_MAX};

/// Non-empty byte string that fitted, with its NUL terminator, in `N` bytes.
///
/// Stored inline so that driver records and replies never allocate.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundedName<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

/// Driver label as announced by discovery.
pub type Label = BoundedName<LABEL_MAX>;
/// Interface name as reported in a driver's init reply.
pub type IfName = BoundedName<NAME_MAX>;

impl<const N: usize> BoundedName<N> {
    /// Accepts `raw` only if it is non-empty and has a NUL within its first `N` bytes.
    pub fn from_nul_terminated(raw: &[u8]) -> Option<Self> {
        let window = &raw[..raw.len().min(N)];
        let len = window.iter().position(|&b| b == 0)?;
        if len == 0 {
            return None;
        }
        let mut bytes = [0u8; N];
        bytes[..len].copy_from_slice(&window[..len]);
        Some(Self { bytes, len })
    }

    /// Builds a name from a Rust string; `None` if it is empty, too long or contains NUL.
    pub fn new(name: &str) -> Option<Self> {
        if name.len() >= N || name.as_bytes().contains(&0) {
            return None;
        }
        let mut raw = [0u8; N];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        Self::from_nul_terminated(&raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The name as UTF-8, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    /// NUL-padded representation, as carried on the wire.
    pub fn to_padded(&self) -> [u8; N] {
        self.bytes
    }
}

impl<const N: usize> fmt::Display for BoundedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.write_str(s),
            None => write!(f, "{:x?}", self.as_bytes()),
        }
    }
}

impl<const N: usize> fmt::Debug for BoundedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
