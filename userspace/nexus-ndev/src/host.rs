// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-memory collaborators for host-based testing of the driver layer
//! OWNERS: @runtime
//!
//! PUBLIC API:
//!   - HostTransport: records every encoded request frame; can be told to fail
//!   - HostGrants: grant table with live-grant accounting and a creation budget
//!   - HostDiscovery: label presence set plus a queue of up/down events
//!   - HostInterface: records interface callbacks; can refuse add/enable
//!
//! `HostTransport` and `HostGrants` are cheap clones over shared state, so a test keeps
//! a handle after moving one into [`crate::Ndev`].
//!
//! DEPENDENCIES:
//!   - parking_lot::Mutex: shared state behind the cloned handles

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::driver::DriverId;
use crate::name::{IfName, Label};
use crate::platform::{
    Access, Discovery, DiscoveryError, DriverEvent, Endpoint, GrantError, GrantId, GrantTable,
    HwAddr, Interface, Segment, StatusReport, Transport, TransportError,
};
use crate::wire::{Caps, Frame, Request, FRAME_LEN};

#[derive(Default)]
struct TransportState {
    frames: Vec<(Endpoint, Frame)>,
    fail: bool,
}

/// Transport that keeps every frame it is asked to deliver.
#[derive(Clone, Default)]
pub struct HostTransport {
    inner: Arc<Mutex<TransportState>>,
}

impl HostTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw frames in delivery order.
    pub fn frames(&self) -> Vec<(Endpoint, Frame)> {
        self.inner.lock().frames.clone()
    }

    /// Delivered requests, decoded again.
    pub fn sent(&self) -> Vec<(Endpoint, Request)> {
        self.inner
            .lock()
            .frames
            .iter()
            .filter_map(|(endpoint, frame)| Request::decode(frame).ok().map(|r| (*endpoint, r)))
            .collect()
    }

    /// Requests delivered to `endpoint`.
    pub fn sent_to(&self, endpoint: Endpoint) -> Vec<Request> {
        self.sent().into_iter().filter(|(ep, _)| *ep == endpoint).map(|(_, r)| r).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }

    /// Makes every following send fail with [`TransportError::Unreachable`].
    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().fail = fail;
    }
}

impl Transport for HostTransport {
    fn send(&mut self, endpoint: Endpoint, request: &Request) -> Result<(), TransportError> {
        let mut state = self.inner.lock();
        if state.fail {
            return Err(TransportError::Unreachable(endpoint));
        }
        let mut frame = [0u8; FRAME_LEN];
        request.encode(&mut frame);
        state.frames.push((endpoint, frame));
        Ok(())
    }
}

/// What a live host grant gives access to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostGrant {
    pub endpoint: Endpoint,
    pub segment: Segment,
    pub access: Access,
}

#[derive(Default)]
struct GrantState {
    next: i32,
    live: BTreeMap<GrantId, HostGrant>,
    revoked: Vec<GrantId>,
    budget: Option<usize>,
    fail_revoke: bool,
}

/// Grant table that tracks live grants instead of sharing memory.
#[derive(Clone, Default)]
pub struct HostGrants {
    inner: Arc<Mutex<GrantState>>,
}

impl HostGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows only `budget` more creations (`None`: unlimited).
    pub fn limit(&self, budget: Option<usize>) {
        self.inner.lock().budget = budget;
    }

    /// Number of grants created and not yet revoked.
    pub fn live(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn is_live(&self, grant: GrantId) -> bool {
        self.inner.lock().live.contains_key(&grant)
    }

    pub fn grant(&self, grant: GrantId) -> Option<HostGrant> {
        self.inner.lock().live.get(&grant).copied()
    }

    /// Revoked grants in revocation order.
    pub fn revoked(&self) -> Vec<GrantId> {
        self.inner.lock().revoked.clone()
    }

    /// Makes every following revocation report a corrupted table.
    pub fn fail_revokes(&self, fail: bool) {
        self.inner.lock().fail_revoke = fail;
    }
}

impl GrantTable for HostGrants {
    fn create(&mut self, endpoint: Endpoint, segment: Segment, access: Access) -> Option<GrantId> {
        let mut state = self.inner.lock();
        if let Some(left) = state.budget.as_mut() {
            if *left == 0 {
                return None;
            }
            *left -= 1;
        }
        let grant = GrantId::new(state.next)?;
        state.next += 1;
        state.live.insert(grant, HostGrant { endpoint, segment, access });
        Some(grant)
    }

    fn revoke(&mut self, grant: GrantId) -> Result<(), GrantError> {
        let mut state = self.inner.lock();
        if state.fail_revoke {
            return Err(GrantError::Corrupted);
        }
        if state.live.remove(&grant).is_none() {
            return Err(GrantError::NotLive(grant));
        }
        state.revoked.push(grant);
        Ok(())
    }
}

/// Discovery source driven by the test.
#[derive(Default)]
pub struct HostDiscovery {
    present: BTreeSet<Vec<u8>>,
    events: VecDeque<DriverEvent>,
    fail_next: Option<i32>,
}

impl HostDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver `label` came up at `endpoint`.
    pub fn start(&mut self, label: &str, endpoint: Endpoint) {
        self.present.insert(label.as_bytes().to_vec());
        self.events.push_back(DriverEvent::up(&nul_terminated(label), endpoint));
    }

    /// `label` was restarted: it stays present and comes up at a new endpoint.
    pub fn restart(&mut self, label: &str, endpoint: Endpoint) {
        self.start(label, endpoint);
    }

    /// `label` is gone for good.
    pub fn stop(&mut self, label: &str) {
        self.present.remove(label.as_bytes());
        self.events.push_back(DriverEvent::down(&nul_terminated(label)));
    }

    /// Queues an arbitrary event without touching presence.
    pub fn announce(&mut self, event: DriverEvent) {
        self.events.push_back(event);
    }

    /// The next poll fails with `code`.
    pub fn fail_next_check(&mut self, code: i32) {
        self.fail_next = Some(code);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

fn nul_terminated(label: &str) -> Vec<u8> {
    let mut raw = label.as_bytes().to_vec();
    raw.push(0);
    raw
}

impl Discovery for HostDiscovery {
    fn poll(&mut self) -> Result<Option<DriverEvent>, DiscoveryError> {
        if let Some(code) = self.fail_next.take() {
            return Err(DiscoveryError::Check(code));
        }
        Ok(self.events.pop_front())
    }

    fn is_present(&self, label: &Label) -> bool {
        self.present.contains(label.as_bytes())
    }
}

/// Interface callback, as recorded by [`HostInterface`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IfEvent {
    Added { handle: u32, driver: DriverId, name: String, caps: Caps },
    Enabled {
        handle: u32,
        name: Option<String>,
        hwaddr: HwAddr,
        hwaddr_len: usize,
        caps: Caps,
        link: u32,
        media: u32,
    },
    Disabled(u32),
    Removed(u32),
    Configured(u32, i32),
    Sent(u32, i32),
    Received(u32, i32),
    Status(u32, StatusReport),
}

/// Interface layer stand-in. Handles are 1, 2, 3, ... in creation order.
#[derive(Default)]
pub struct HostInterface {
    next: u32,
    events: Vec<IfEvent>,
    refuse_add: bool,
    refuse_enable: bool,
}

impl HostInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[IfEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<IfEvent> {
        std::mem::take(&mut self.events)
    }

    /// Refused calls are not recorded.
    pub fn refuse_add(&mut self, refuse: bool) {
        self.refuse_add = refuse;
    }

    pub fn refuse_enable(&mut self, refuse: bool) {
        self.refuse_enable = refuse;
    }
}

impl Interface for HostInterface {
    type Handle = u32;

    fn add(&mut self, driver: DriverId, name: &IfName, caps: Caps) -> Option<u32> {
        if self.refuse_add {
            return None;
        }
        self.next += 1;
        let handle = self.next;
        self.events.push(IfEvent::Added { handle, driver, name: name.to_string(), caps });
        Some(handle)
    }

    fn enable(
        &mut self,
        handle: u32,
        name: Option<&IfName>,
        hwaddr: &HwAddr,
        hwaddr_len: usize,
        caps: Caps,
        link: u32,
        media: u32,
    ) -> bool {
        if self.refuse_enable {
            return false;
        }
        self.events.push(IfEvent::Enabled {
            handle,
            name: name.map(ToString::to_string),
            hwaddr: *hwaddr,
            hwaddr_len,
            caps,
            link,
            media,
        });
        true
    }

    fn disable(&mut self, handle: u32) {
        self.events.push(IfEvent::Disabled(handle));
    }

    fn remove(&mut self, handle: u32) {
        self.events.push(IfEvent::Removed(handle));
    }

    fn configured(&mut self, handle: u32, result: i32) {
        self.events.push(IfEvent::Configured(handle, result));
    }

    fn sent(&mut self, handle: u32, result: i32) {
        self.events.push(IfEvent::Sent(handle, result));
    }

    fn received(&mut self, handle: u32, result: i32) {
        self.events.push(IfEvent::Received(handle, result));
    }

    fn status(&mut self, handle: u32, report: &StatusReport) {
        self.events.push(IfEvent::Status(handle, *report));
    }
}
