// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared harness for the host scenario tests.

#![allow(dead_code)]

use nexus_ndev::host::{HostDiscovery, HostGrants, HostInterface, HostTransport, IfEvent};
use nexus_ndev::wire::{InitReply, Reply, Request, ResultReply, FRAME_LEN, LINK_UP};
use nexus_ndev::{Caps, DriverId, Endpoint, Label, Ndev, NdevConfig, Segment, NAME_MAX};

pub type HostNdev = Ndev<HostTransport, HostGrants, HostInterface>;

pub const MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

pub struct Harness {
    pub ndev: HostNdev,
    pub transport: HostTransport,
    pub grants: HostGrants,
    pub discovery: HostDiscovery,
    pub iface: HostInterface,
}

impl Harness {
    pub fn new(config: NdevConfig) -> Self {
        let transport = HostTransport::new();
        let grants = HostGrants::new();
        let ndev = Ndev::new(config, transport.clone(), grants.clone()).expect("valid config");
        Self {
            ndev,
            transport,
            grants,
            discovery: HostDiscovery::new(),
            iface: HostInterface::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(NdevConfig::default())
    }

    pub fn reconcile(&mut self) {
        self.ndev.reconcile(&mut self.discovery, &mut self.iface);
    }

    /// Announces `label` at `endpoint` and reconciles.
    pub fn start(&mut self, label: &str, endpoint: Endpoint) {
        self.discovery.start(label, endpoint);
        self.reconcile();
    }

    pub fn stop(&mut self, label: &str) {
        self.discovery.stop(label);
        self.reconcile();
    }

    pub fn id(&self, label: &str) -> Option<DriverId> {
        self.ndev.driver_id(&Label::new(label).expect("label"))
    }

    /// Id of the most recent init request sent to `endpoint`.
    pub fn last_init(&self, endpoint: Endpoint) -> Option<u32> {
        self.transport.sent_to(endpoint).into_iter().rev().find_map(|request| match request {
            Request::Init { id } => Some(id),
            _ => None,
        })
    }

    /// Delivers `reply` from `endpoint` as an encoded frame.
    pub fn reply(&mut self, endpoint: Endpoint, reply: Reply) {
        let mut frame = [0u8; FRAME_LEN];
        reply.encode(&mut frame);
        self.ndev.process_frame(endpoint, &frame, &mut self.iface);
    }

    pub fn answer_init(&mut self, endpoint: Endpoint, max_send: u8, max_recv: u8) {
        let id = self.last_init(endpoint).expect("init request sent");
        self.reply(endpoint, Reply::Init(init_reply(id, max_send, max_recv)));
    }

    /// Starts `label` and completes its init handshake.
    pub fn activate(
        &mut self,
        label: &str,
        endpoint: Endpoint,
        max_send: u8,
        max_recv: u8,
    ) -> DriverId {
        self.start(label, endpoint);
        self.answer_init(endpoint, max_send, max_recv);
        self.id(label).expect("driver known")
    }

    pub fn send_reply(&mut self, endpoint: Endpoint, id: u32, result: i32) {
        self.reply(endpoint, Reply::Send(ResultReply { id, result }));
    }

    pub fn recv_reply(&mut self, endpoint: Endpoint, id: u32, result: i32) {
        self.reply(endpoint, Reply::Recv(ResultReply { id, result }));
    }

    pub fn conf_reply(&mut self, endpoint: Endpoint, id: u32, result: i32) {
        self.reply(endpoint, Reply::Conf(ResultReply { id, result }));
    }

    /// Handle of the interface most recently added.
    pub fn last_handle(&self) -> Option<u32> {
        self.iface.events().iter().rev().find_map(|event| match event {
            IfEvent::Added { handle, .. } => Some(*handle),
            _ => None,
        })
    }
}

pub fn init_reply(id: u32, max_send: u8, max_recv: u8) -> InitReply {
    let mut name = [0u8; NAME_MAX];
    name[..4].copy_from_slice(b"eth0");
    InitReply {
        id,
        link: LINK_UP,
        media: 0,
        caps: Caps::MCAST | Caps::BCAST,
        name,
        hwaddr: MAC,
        hwaddr_len: 6,
        max_send,
        max_recv,
    }
}

/// `count` packet segments of `len` bytes at distinct addresses.
pub fn segments(count: usize, len: usize) -> Vec<Segment> {
    (0..count).map(|i| Segment::new(0x10_0000 + i * 0x1000, len)).collect()
}
