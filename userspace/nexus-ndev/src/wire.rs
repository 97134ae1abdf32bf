// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: ndev wire protocol (requests to drivers, replies from drivers)
//! OWNERS: @runtime
//! STATUS: Experimental
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (host)
//!
//! Frames are a fixed 64 bytes: a little-endian `u32` message type, 4 reserved bytes and a
//! 56-byte payload. All multi-byte fields are little-endian. Grants are `i32` with `-1`
//! meaning "no grant".
//!
//! INVARIANTS:
//!   - Never panics on malformed/truncated input
//!   - Unknown message types decode to `WireError::UnknownType`
//!   - No allocations

use core::fmt;

use bitflags::bitflags;

use crate::config::{HWADDR_MAX, IOV_MAX, NAME_MAX};
use crate::platform::{GrantId, StatusReport};

/// Size of every ndev frame.
pub const FRAME_LEN: usize = 64;
const HEADER_LEN: usize = 8;

/// A complete wire frame.
pub type Frame = [u8; FRAME_LEN];

/// Request: initialize (sent on discovery and restart).
pub const NDEV_INIT: u32 = 0x1D00;
/// Request: change configuration.
pub const NDEV_CONF: u32 = 0x1D01;
/// Request: send a packet.
pub const NDEV_SEND: u32 = 0x1D02;
/// Request: receive a packet.
pub const NDEV_RECV: u32 = 0x1D03;
/// Request: acknowledge a status report.
pub const NDEV_STATUS_REPLY: u32 = 0x1D04;

/// Reply: initialization result.
pub const NDEV_INIT_REPLY: u32 = 0x1D80;
/// Reply: configuration result.
pub const NDEV_CONF_REPLY: u32 = 0x1D81;
/// Reply: send result.
pub const NDEV_SEND_REPLY: u32 = 0x1D82;
/// Reply: receive result.
pub const NDEV_RECV_REPLY: u32 = 0x1D83;
/// Unsolicited driver status report.
pub const NDEV_STATUS: u32 = 0x1D84;

/// Wire value of "no grant".
pub const GRANT_NONE: i32 = -1;

/// Link state values carried in init replies and status reports.
pub const LINK_UNKNOWN: u32 = 0;
pub const LINK_UP: u32 = 1;
pub const LINK_DOWN: u32 = 2;

bitflags! {
    /// Device capabilities advertised by a driver.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Caps: u32 {
        const MCAST = 1 << 0;
        const BCAST = 1 << 1;
        const HWADDR = 1 << 2;
    }
}

bitflags! {
    /// Which fields of a configuration request are meaningful.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ConfSet: u32 {
        const MODE = 1 << 0;
        const CAPS = 1 << 1;
        const FLAGS = 1 << 2;
        const MEDIA = 1 << 3;
        const HWADDR = 1 << 4;
    }
}

bitflags! {
    /// I/O mode. The empty set means "down".
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Mode: u32 {
        const UP = 1 << 0;
        const PROMISC = 1 << 1;
        const MCAST_LIST = 1 << 2;
        const MCAST_ALL = 1 << 3;
        const BCAST = 1 << 4;
    }
}

// Empty flag sets: no capabilities, nothing to change, interface down.
impl Default for Caps {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for ConfSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::empty()
    }
}

/// Errors when decoding ndev frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireError {
    /// Buffer is shorter than [`FRAME_LEN`].
    Truncated,
    /// Message type is not part of this protocol (or not valid in this direction).
    UnknownType(u32),
    /// Segment count exceeds [`IOV_MAX`].
    BadCount(u8),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame truncated"),
            Self::UnknownType(ty) => write!(f, "unknown message type {ty:#x}"),
            Self::BadCount(n) => write!(f, "segment count {n} exceeds {IOV_MAX}"),
        }
    }
}

/// Configuration change request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfRequest {
    pub id: u32,
    pub set: ConfSet,
    pub mode: Mode,
    pub caps: Caps,
    pub flags: u32,
    pub media: u32,
    pub mcast_grant: Option<GrantId>,
    pub mcast_count: u32,
    pub hwaddr: [u8; HWADDR_MAX],
}

/// Packet send or receive request over up to [`IOV_MAX`] granted segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub id: u32,
    pub count: u8,
    pub grants: [Option<GrantId>; IOV_MAX],
    pub lens: [u16; IOV_MAX],
}

impl TransferRequest {
    pub fn new(id: u32) -> Self {
        Self { id, count: 0, grants: [None; IOV_MAX], lens: [0; IOV_MAX] }
    }
}

/// Messages sent to drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    Init { id: u32 },
    Conf(ConfRequest),
    Send(TransferRequest),
    Recv(TransferRequest),
    StatusReply { id: u32 },
}

/// Driver answer to an init request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitReply {
    pub id: u32,
    pub link: u32,
    pub media: u32,
    pub caps: Caps,
    pub name: [u8; NAME_MAX],
    pub hwaddr: [u8; HWADDR_MAX],
    pub hwaddr_len: u8,
    pub max_send: u8,
    pub max_recv: u8,
}

/// Completion of a queued request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResultReply {
    pub id: u32,
    pub result: i32,
}

/// Messages received from drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Init(InitReply),
    Conf(ResultReply),
    Send(ResultReply),
    Recv(ResultReply),
    /// Status push; `id` is chosen by the driver and echoed in the acknowledgement.
    Status { id: u32, report: StatusReport },
}

fn put_u32(frame: &mut Frame, off: usize, value: u32) {
    let at = HEADER_LEN + off;
    frame[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_i32(frame: &mut Frame, off: usize, value: i32) {
    put_u32(frame, off, value as u32);
}

fn put_u16(frame: &mut Frame, off: usize, value: u16) {
    let at = HEADER_LEN + off;
    frame[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_bytes(frame: &mut Frame, off: usize, bytes: &[u8]) {
    let at = HEADER_LEN + off;
    frame[at..at + bytes.len()].copy_from_slice(bytes);
}

fn get_u32(frame: &Frame, off: usize) -> u32 {
    let at = HEADER_LEN + off;
    u32::from_le_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]])
}

fn get_i32(frame: &Frame, off: usize) -> i32 {
    get_u32(frame, off) as i32
}

fn get_u16(frame: &Frame, off: usize) -> u16 {
    let at = HEADER_LEN + off;
    u16::from_le_bytes([frame[at], frame[at + 1]])
}

fn get_array<const N: usize>(frame: &Frame, off: usize) -> [u8; N] {
    let at = HEADER_LEN + off;
    let mut out = [0u8; N];
    out.copy_from_slice(&frame[at..at + N]);
    out
}

fn grant_to_wire(grant: Option<GrantId>) -> i32 {
    grant.map_or(GRANT_NONE, GrantId::raw)
}

fn start_frame(frame: &mut Frame, ty: u32) {
    *frame = [0u8; FRAME_LEN];
    frame[..4].copy_from_slice(&ty.to_le_bytes());
}

fn frame_of(bytes: &[u8]) -> Result<(&Frame, u32), WireError> {
    let frame: &Frame =
        bytes.get(..FRAME_LEN).and_then(|b| b.try_into().ok()).ok_or(WireError::Truncated)?;
    let ty = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    Ok((frame, ty))
}

// Payload layouts (offsets relative to the payload start).
mod layout {
    pub const ID: usize = 0;

    pub const CONF_SET: usize = 4;
    pub const CONF_MODE: usize = 8;
    pub const CONF_CAPS: usize = 12;
    pub const CONF_FLAGS: usize = 16;
    pub const CONF_MEDIA: usize = 20;
    pub const CONF_MCAST_GRANT: usize = 24;
    pub const CONF_MCAST_COUNT: usize = 28;
    pub const CONF_HWADDR: usize = 32;

    pub const XFER_GRANTS: usize = 4;
    pub const XFER_LENS: usize = 36;
    pub const XFER_COUNT: usize = 52;

    pub const INIT_LINK: usize = 4;
    pub const INIT_MEDIA: usize = 8;
    pub const INIT_CAPS: usize = 12;
    pub const INIT_NAME: usize = 16;
    pub const INIT_HWADDR: usize = 32;
    pub const INIT_HWADDR_LEN: usize = 38;
    pub const INIT_MAX_SEND: usize = 39;
    pub const INIT_MAX_RECV: usize = 40;

    pub const RESULT: usize = 4;

    pub const STATUS_LINK: usize = 4;
    pub const STATUS_MEDIA: usize = 8;
    pub const STATUS_OERROR: usize = 12;
    pub const STATUS_COLL: usize = 16;
    pub const STATUS_IERROR: usize = 20;
    pub const STATUS_IQDROP: usize = 24;
}

fn encode_transfer(frame: &mut Frame, ty: u32, xfer: &TransferRequest) {
    start_frame(frame, ty);
    put_u32(frame, layout::ID, xfer.id);
    for i in 0..IOV_MAX {
        put_i32(frame, layout::XFER_GRANTS + 4 * i, grant_to_wire(xfer.grants[i]));
        put_u16(frame, layout::XFER_LENS + 2 * i, xfer.lens[i]);
    }
    frame[HEADER_LEN + layout::XFER_COUNT] = xfer.count;
}

fn decode_transfer(frame: &Frame) -> Result<TransferRequest, WireError> {
    let count = frame[HEADER_LEN + layout::XFER_COUNT];
    if usize::from(count) > IOV_MAX {
        return Err(WireError::BadCount(count));
    }
    let mut xfer = TransferRequest::new(get_u32(frame, layout::ID));
    xfer.count = count;
    for i in 0..IOV_MAX {
        xfer.grants[i] = GrantId::new(get_i32(frame, layout::XFER_GRANTS + 4 * i));
        xfer.lens[i] = get_u16(frame, layout::XFER_LENS + 2 * i);
    }
    Ok(xfer)
}

fn encode_result(frame: &mut Frame, ty: u32, reply: &ResultReply) {
    start_frame(frame, ty);
    put_u32(frame, layout::ID, reply.id);
    put_i32(frame, layout::RESULT, reply.result);
}

fn decode_result(frame: &Frame) -> ResultReply {
    ResultReply { id: get_u32(frame, layout::ID), result: get_i32(frame, layout::RESULT) }
}

impl Request {
    /// Message type of this request.
    pub fn message_type(&self) -> u32 {
        match self {
            Self::Init { .. } => NDEV_INIT,
            Self::Conf(_) => NDEV_CONF,
            Self::Send(_) => NDEV_SEND,
            Self::Recv(_) => NDEV_RECV,
            Self::StatusReply { .. } => NDEV_STATUS_REPLY,
        }
    }

    /// Serializes the request into `frame`, overwriting all of it.
    pub fn encode(&self, frame: &mut Frame) {
        match self {
            Self::Init { id } | Self::StatusReply { id } => {
                start_frame(frame, self.message_type());
                put_u32(frame, layout::ID, *id);
            }
            Self::Conf(conf) => {
                start_frame(frame, NDEV_CONF);
                put_u32(frame, layout::ID, conf.id);
                put_u32(frame, layout::CONF_SET, conf.set.bits());
                put_u32(frame, layout::CONF_MODE, conf.mode.bits());
                put_u32(frame, layout::CONF_CAPS, conf.caps.bits());
                put_u32(frame, layout::CONF_FLAGS, conf.flags);
                put_u32(frame, layout::CONF_MEDIA, conf.media);
                put_i32(frame, layout::CONF_MCAST_GRANT, grant_to_wire(conf.mcast_grant));
                put_u32(frame, layout::CONF_MCAST_COUNT, conf.mcast_count);
                put_bytes(frame, layout::CONF_HWADDR, &conf.hwaddr);
            }
            Self::Send(xfer) => encode_transfer(frame, NDEV_SEND, xfer),
            Self::Recv(xfer) => encode_transfer(frame, NDEV_RECV, xfer),
        }
    }

    /// Parses a request frame (driver side).
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let (frame, ty) = frame_of(bytes)?;
        match ty {
            NDEV_INIT => Ok(Self::Init { id: get_u32(frame, layout::ID) }),
            NDEV_STATUS_REPLY => Ok(Self::StatusReply { id: get_u32(frame, layout::ID) }),
            NDEV_CONF => Ok(Self::Conf(ConfRequest {
                id: get_u32(frame, layout::ID),
                set: ConfSet::from_bits_retain(get_u32(frame, layout::CONF_SET)),
                mode: Mode::from_bits_retain(get_u32(frame, layout::CONF_MODE)),
                caps: Caps::from_bits_retain(get_u32(frame, layout::CONF_CAPS)),
                flags: get_u32(frame, layout::CONF_FLAGS),
                media: get_u32(frame, layout::CONF_MEDIA),
                mcast_grant: GrantId::new(get_i32(frame, layout::CONF_MCAST_GRANT)),
                mcast_count: get_u32(frame, layout::CONF_MCAST_COUNT),
                hwaddr: get_array(frame, layout::CONF_HWADDR),
            })),
            NDEV_SEND => Ok(Self::Send(decode_transfer(frame)?)),
            NDEV_RECV => Ok(Self::Recv(decode_transfer(frame)?)),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

impl Reply {
    /// Message type of this reply.
    pub fn message_type(&self) -> u32 {
        match self {
            Self::Init(_) => NDEV_INIT_REPLY,
            Self::Conf(_) => NDEV_CONF_REPLY,
            Self::Send(_) => NDEV_SEND_REPLY,
            Self::Recv(_) => NDEV_RECV_REPLY,
            Self::Status { .. } => NDEV_STATUS,
        }
    }

    /// Serializes the reply into `frame` (driver side).
    pub fn encode(&self, frame: &mut Frame) {
        match self {
            Self::Init(init) => {
                start_frame(frame, NDEV_INIT_REPLY);
                put_u32(frame, layout::ID, init.id);
                put_u32(frame, layout::INIT_LINK, init.link);
                put_u32(frame, layout::INIT_MEDIA, init.media);
                put_u32(frame, layout::INIT_CAPS, init.caps.bits());
                put_bytes(frame, layout::INIT_NAME, &init.name);
                put_bytes(frame, layout::INIT_HWADDR, &init.hwaddr);
                frame[HEADER_LEN + layout::INIT_HWADDR_LEN] = init.hwaddr_len;
                frame[HEADER_LEN + layout::INIT_MAX_SEND] = init.max_send;
                frame[HEADER_LEN + layout::INIT_MAX_RECV] = init.max_recv;
            }
            Self::Conf(reply) => encode_result(frame, NDEV_CONF_REPLY, reply),
            Self::Send(reply) => encode_result(frame, NDEV_SEND_REPLY, reply),
            Self::Recv(reply) => encode_result(frame, NDEV_RECV_REPLY, reply),
            Self::Status { id, report } => {
                start_frame(frame, NDEV_STATUS);
                put_u32(frame, layout::ID, *id);
                put_u32(frame, layout::STATUS_LINK, report.link);
                put_u32(frame, layout::STATUS_MEDIA, report.media);
                put_u32(frame, layout::STATUS_OERROR, report.out_errors);
                put_u32(frame, layout::STATUS_COLL, report.collisions);
                put_u32(frame, layout::STATUS_IERROR, report.in_errors);
                put_u32(frame, layout::STATUS_IQDROP, report.in_drops);
            }
        }
    }

    /// Parses a reply frame received from a driver.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let (frame, ty) = frame_of(bytes)?;
        match ty {
            NDEV_INIT_REPLY => Ok(Self::Init(InitReply {
                id: get_u32(frame, layout::ID),
                link: get_u32(frame, layout::INIT_LINK),
                media: get_u32(frame, layout::INIT_MEDIA),
                caps: Caps::from_bits_retain(get_u32(frame, layout::INIT_CAPS)),
                name: get_array(frame, layout::INIT_NAME),
                hwaddr: get_array(frame, layout::INIT_HWADDR),
                hwaddr_len: frame[HEADER_LEN + layout::INIT_HWADDR_LEN],
                max_send: frame[HEADER_LEN + layout::INIT_MAX_SEND],
                max_recv: frame[HEADER_LEN + layout::INIT_MAX_RECV],
            })),
            NDEV_CONF_REPLY => Ok(Self::Conf(decode_result(frame))),
            NDEV_SEND_REPLY => Ok(Self::Send(decode_result(frame))),
            NDEV_RECV_REPLY => Ok(Self::Recv(decode_result(frame))),
            NDEV_STATUS => Ok(Self::Status {
                id: get_u32(frame, layout::ID),
                report: StatusReport {
                    link: get_u32(frame, layout::STATUS_LINK),
                    media: get_u32(frame, layout::STATUS_MEDIA),
                    out_errors: get_u32(frame, layout::STATUS_OERROR),
                    collisions: get_u32(frame, layout::STATUS_COLL),
                    in_errors: get_u32(frame, layout::STATUS_IERROR),
                    in_drops: get_u32(frame, layout::STATUS_IQDROP),
                },
            }),
            other => Err(WireError::UnknownType(other)),
        }
    }
}
