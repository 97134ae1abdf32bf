// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Driver lifecycle scenarios against the host backend
//! OWNERS: @runtime
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Discovery, restart, init handshake validation, teardown, table capacity
//!
//! TEST_SCENARIOS:
//!   - first_init_reply_creates_and_enables_interface(): Pending -> Active with a new interface
//!   - restart_cancels_outstanding_requests(): restart resets queues and drops stale replies
//!   - restart_before_init_reply_restarts_handshake(): a second restart supersedes the first init
//!   - malformed_init_replies_tear_driver_down(): protocol violations are not retried
//!   - full_table_drops_driver_and_reports_once(): capacity exhaustion is reported once

mod common;

use common::{init_reply, segments, Harness, MAC};
use nexus_ndev::host::IfEvent;
use nexus_ndev::wire::{Reply, LINK_UP};
use nexus_ndev::{
    Caps, Direction, DriverEvent, DriverId, DriverStateKind, DriverStatus, Endpoint, HwAddr,
    NdevConfig, QueueInfo,
};

#[test]
fn first_init_reply_creates_and_enables_interface() {
    let mut h = Harness::with_defaults();
    let ep = Endpoint(10);
    h.start("virtio", ep);

    let id = h.id("virtio").expect("known");
    assert_eq!(id, DriverId::new(0));
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Pending));
    assert_eq!(h.last_init(ep), Some(1));
    assert_eq!(h.ndev.stats().pending, 1);

    h.answer_init(ep, 4, 2);
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Active));
    assert_eq!(h.ndev.stats().pending, 0);
    assert_eq!(h.ndev.stats().active, 1);
    assert_eq!(
        h.iface.events(),
        &[
            IfEvent::Added {
                handle: 1,
                driver: id,
                name: "eth0".to_string(),
                caps: Caps::MCAST | Caps::BCAST,
            },
            IfEvent::Enabled {
                handle: 1,
                name: Some("eth0".to_string()),
                hwaddr: HwAddr(MAC),
                hwaddr_len: 6,
                caps: Caps::MCAST | Caps::BCAST,
                link: LINK_UP,
                media: 0,
            },
        ]
    );
    assert_eq!(
        h.ndev.queue_info(id, Direction::Send),
        Some(QueueInfo { head: 2, depth: 0, max: 4 })
    );
    assert_eq!(
        h.ndev.queue_info(id, Direction::Recv),
        Some(QueueInfo { head: (1 << 20) + 2, depth: 0, max: 2 })
    );
}

#[test]
fn short_hardware_address_is_zero_padded() {
    let mut h = Harness::with_defaults();
    let ep = Endpoint(3);
    h.start("slip", ep);
    let mut reply = init_reply(h.last_init(ep).expect("init"), 1, 1);
    reply.hwaddr = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    reply.hwaddr_len = 2;
    h.reply(ep, Reply::Init(reply));

    let enabled = h.iface.events().iter().find_map(|event| match event {
        IfEvent::Enabled { hwaddr, hwaddr_len, .. } => Some((*hwaddr, *hwaddr_len)),
        _ => None,
    });
    assert_eq!(enabled, Some((HwAddr([0xAA, 0xBB, 0, 0, 0, 0]), 2)));
}

#[test]
fn restart_cancels_outstanding_requests() {
    let mut h = Harness::with_defaults();
    let old_ep = Endpoint(10);
    let new_ep = Endpoint(11);
    let id = h.activate("virtio", old_ep, 4, 2);
    let handle = h.last_handle().expect("interface");

    let first = h.ndev.send(id, &segments(1, 60)).expect("send");
    let second = h.ndev.send(id, &segments(2, 60)).expect("send");
    let recv = h.ndev.recv(id, &segments(1, 1514)).expect("recv");
    assert_eq!(h.grants.live(), 4);
    h.iface.take_events();

    h.discovery.restart("virtio", new_ep);
    h.reconcile();

    let stats = h.ndev.stats();
    assert_eq!(h.grants.live(), 0);
    assert_eq!(stats.free_request_slots, stats.total_request_slots);
    assert_eq!(stats.spare_available, stats.spare_total);
    assert_eq!(stats.pending, 1);
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Pending));
    assert_eq!(h.iface.events(), &[IfEvent::Disabled(handle)]);
    assert_eq!(h.ndev.queue_info(id, Direction::Recv).map(|q| q.max), Some(0));

    let init = h.last_init(new_ep).expect("fresh init request");
    assert!(init > second, "init {init} must follow cancelled sequence {second}");

    // Late replies from the previous instance, at either endpoint.
    h.send_reply(old_ep, first, 0);
    h.send_reply(new_ep, second, 0);
    h.recv_reply(new_ep, recv, 0);
    h.reply(new_ep, Reply::Init(init_reply(1, 4, 2)));
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Pending));
    assert_eq!(h.iface.events().len(), 1);

    h.answer_init(new_ep, 4, 2);
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Active));
    assert_eq!(h.ndev.stats().pending, 0);
    match h.iface.events().last() {
        Some(IfEvent::Enabled { handle: enabled, name, .. }) => {
            assert_eq!(*enabled, handle);
            assert_eq!(*name, None, "a restarted interface is enabled without a name");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn restart_before_init_reply_restarts_handshake() {
    let mut h = Harness::with_defaults();
    h.start("ne2k", Endpoint(1));
    let first_init = h.last_init(Endpoint(1)).expect("init");

    h.discovery.restart("ne2k", Endpoint(2));
    h.reconcile();
    let second_init = h.last_init(Endpoint(2)).expect("init");
    assert_ne!(first_init, second_init);
    assert_eq!(h.ndev.stats().pending, 1);

    let id = h.id("ne2k").expect("known");
    h.reply(Endpoint(2), Reply::Init(init_reply(first_init, 2, 2)));
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Pending));
    h.reply(Endpoint(1), Reply::Init(init_reply(second_init, 2, 2)));
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Pending));

    h.answer_init(Endpoint(2), 2, 2);
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Active));
    assert_eq!(h.ndev.stats().pending, 0);
    assert!(matches!(h.iface.events()[0], IfEvent::Added { .. }));
    assert!(matches!(h.iface.events()[1], IfEvent::Enabled { name: Some(_), .. }));
}

#[test]
fn repeated_restarts_disable_and_count_once() {
    let mut h = Harness::with_defaults();
    let id = h.activate("e1000", Endpoint(1), 2, 2);
    let handle = h.last_handle().expect("interface");
    h.iface.take_events();

    h.discovery.restart("e1000", Endpoint(2));
    h.reconcile();
    h.discovery.restart("e1000", Endpoint(3));
    h.reconcile();
    assert_eq!(h.iface.events(), &[IfEvent::Disabled(handle)]);
    assert_eq!(h.ndev.stats().pending, 1);

    h.answer_init(Endpoint(3), 2, 2);
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Active));
    assert_eq!(h.ndev.stats().pending, 0);
    assert_eq!(h.last_handle(), None, "no new interface after restart");
}

#[test]
fn restarted_driver_that_disappears_is_removed() {
    let mut h = Harness::with_defaults();
    h.activate("e1000", Endpoint(1), 2, 2);
    let handle = h.last_handle().expect("interface");
    h.iface.take_events();

    h.discovery.restart("e1000", Endpoint(2));
    h.reconcile();
    h.stop("e1000");

    assert_eq!(h.iface.events(), &[IfEvent::Disabled(handle), IfEvent::Removed(handle)]);
    let stats = h.ndev.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.high_water, 0);
}

#[test]
fn zero_length_hardware_address_tears_driver_down() {
    let mut h = Harness::with_defaults();
    let ep = Endpoint(4);
    h.start("lance", ep);
    let id = h.id("lance").expect("known");

    let mut reply = init_reply(h.last_init(ep).expect("init"), 4, 2);
    reply.hwaddr_len = 0;
    h.reply(ep, Reply::Init(reply));

    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Free));
    assert_eq!(h.id("lance"), None);
    let stats = h.ndev.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.high_water, 0);
    assert!(h.iface.events().is_empty());
}

#[test]
fn malformed_init_replies_tear_driver_down() {
    let corruptions: [(&str, fn(&mut nexus_ndev::wire::InitReply)); 6] = [
        ("empty name", |r| r.name = [0; 16]),
        ("unterminated name", |r| r.name = [b'a'; 16]),
        ("oversized hwaddr", |r| r.hwaddr_len = 7),
        ("zero max_send", |r| r.max_send = 0),
        ("zero max_recv", |r| r.max_recv = 0),
        ("zero both", |r| {
            r.max_send = 0;
            r.max_recv = 0;
        }),
    ];

    for (what, corrupt) in corruptions {
        let mut h = Harness::with_defaults();
        let ep = Endpoint(7);
        h.start("pcnet", ep);
        let mut reply = init_reply(h.last_init(ep).expect("init"), 4, 2);
        corrupt(&mut reply);
        h.reply(ep, Reply::Init(reply));

        assert_eq!(h.id("pcnet"), None, "{what}");
        assert_eq!(h.ndev.stats().pending, 0, "{what}");
        assert!(h.iface.events().is_empty(), "{what}");
    }
}

#[test]
fn refused_interface_add_forgets_driver() {
    let mut h = Harness::with_defaults();
    h.iface.refuse_add(true);
    h.start("dp8390", Endpoint(5));
    h.answer_init(Endpoint(5), 2, 2);

    assert_eq!(h.id("dp8390"), None);
    assert_eq!(h.ndev.stats().pending, 0);
    assert!(h.iface.events().is_empty());

    // Further messages from the driver are discarded.
    h.answer_init(Endpoint(5), 2, 2);
    assert!(h.iface.events().is_empty());
}

#[test]
fn refused_enable_removes_new_interface() {
    let mut h = Harness::with_defaults();
    h.iface.refuse_enable(true);
    h.start("rtl8169", Endpoint(6));
    h.answer_init(Endpoint(6), 2, 2);

    assert_eq!(h.id("rtl8169"), None);
    assert_eq!(h.ndev.stats().pending, 0);
    assert!(matches!(h.iface.events()[0], IfEvent::Added { handle: 1, .. }));
    assert_eq!(h.iface.events()[1], IfEvent::Removed(1));
    assert_eq!(h.ndev.queue_info(DriverId::new(0), Direction::Send).map(|q| q.max), Some(0));
}

#[test]
fn refused_enable_after_restart_removes_interface() {
    let mut h = Harness::with_defaults();
    h.activate("rtl8169", Endpoint(6), 2, 2);
    let handle = h.last_handle().expect("interface");
    h.iface.take_events();

    h.discovery.restart("rtl8169", Endpoint(8));
    h.reconcile();
    h.iface.refuse_enable(true);
    h.answer_init(Endpoint(8), 2, 2);

    assert_eq!(h.iface.events(), &[IfEvent::Disabled(handle), IfEvent::Removed(handle)]);
    assert_eq!(h.id("rtl8169"), None);
    assert_eq!(h.ndev.stats().pending, 0);
}

#[test]
fn vanished_driver_is_removed_with_its_requests() {
    let mut h = Harness::with_defaults();
    let id = h.activate("vio", Endpoint(2), 4, 2);
    let handle = h.last_handle().expect("interface");
    h.ndev.send(id, &segments(2, 100)).expect("send");
    h.ndev.recv(id, &segments(1, 2048)).expect("recv");

    h.stop("vio");

    assert_eq!(h.iface.events().last(), Some(&IfEvent::Removed(handle)));
    assert_eq!(h.grants.live(), 0);
    let stats = h.ndev.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.free_request_slots, stats.total_request_slots);
    assert_eq!(h.ndev.driver_state(id), Some(DriverStateKind::Free));
}

#[test]
fn discovery_failure_still_checks_presence() {
    let mut h = Harness::with_defaults();
    h.activate("vio", Endpoint(2), 4, 2);
    h.discovery.stop("vio");
    h.discovery.fail_next_check(-5);
    h.reconcile();

    assert_eq!(h.id("vio"), None);
    assert_eq!(h.discovery.pending_events(), 1);
}

#[test]
fn malformed_announcements_are_skipped() {
    let mut h = Harness::with_defaults();
    let mut long = [b'x'; 24];
    long[20] = 0;
    h.discovery.announce(DriverEvent::new(&[b'x'; 32], Some(Endpoint(1)), DriverStatus::Up));
    h.discovery.announce(DriverEvent::new(&long, Some(Endpoint(2)), DriverStatus::Up));
    h.discovery.announce(DriverEvent::new(b"\0", Some(Endpoint(3)), DriverStatus::Up));
    h.discovery.announce(DriverEvent::new(b"eth\0", None, DriverStatus::Up));
    h.discovery.announce(DriverEvent::new(b"eth\0", Some(Endpoint(4)), DriverStatus::Down));
    h.reconcile();

    assert!(h.transport.frames().is_empty());
    assert_eq!(h.ndev.stats().high_water, 0);
    assert_eq!(h.discovery.pending_events(), 0);
}

#[test]
fn full_table_drops_driver_and_reports_once() {
    let config = NdevConfig { max_drivers: 1, ..NdevConfig::default() };
    let mut h = Harness::new(config);
    h.start("first", Endpoint(1));
    h.start("second", Endpoint(2));

    let stats = h.ndev.stats();
    assert_eq!(stats.dropped_drivers, 1);
    assert_eq!(stats.capacity_reports, 1);
    assert!(h.transport.sent_to(Endpoint(2)).is_empty());

    h.start("third", Endpoint(3));
    let stats = h.ndev.stats();
    assert_eq!(stats.dropped_drivers, 2);
    assert_eq!(stats.capacity_reports, 1);

    h.stop("first");
    h.start("fourth", Endpoint(4));
    assert_eq!(h.id("fourth"), Some(DriverId::new(0)));
}

#[test]
fn table_high_water_shrinks_from_the_top() {
    let mut h = Harness::with_defaults();
    h.start("a", Endpoint(1));
    h.start("b", Endpoint(2));
    h.start("c", Endpoint(3));
    assert_eq!(h.ndev.stats().high_water, 3);

    h.stop("b");
    assert_eq!(h.ndev.stats().high_water, 3);
    h.start("d", Endpoint(4));
    assert_eq!(h.id("d"), Some(DriverId::new(1)));

    h.stop("c");
    assert_eq!(h.ndev.stats().high_water, 2);
    h.stop("a");
    h.stop("d");
    assert_eq!(h.ndev.stats().high_water, 0);
    assert_eq!(h.ndev.stats().pending, 0);
}

#[test]
fn reused_slot_never_reuses_sequence_numbers() {
    let mut h = Harness::with_defaults();
    h.start("a", Endpoint(1));
    let first = h.last_init(Endpoint(1)).expect("init");
    h.stop("a");
    h.start("b", Endpoint(2));
    let second = h.last_init(Endpoint(2)).expect("init");
    assert_eq!(h.id("b"), Some(DriverId::new(0)));
    assert!(second > first);
}
