//! Type definitions for the simulation.
//!
//! Contains the identifiers and value records exchanged between the
//! orchestration core and the MAC/PHY collaborator:
//! - Network, device and channel identifiers
//! - 802.15.4 logical channels and short PAN identifiers
//! - Start/data request records and their asynchronous confirm/indication records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one simulated PAN. Allocated monotonically by
/// [`NetworkIdAllocator`], never reused within a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u16);

impl NetworkId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// PAN identifier used in MLME-START and association.
    pub fn pan_id(self) -> u16 {
        self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out network ids in creation order, starting at 0.
#[derive(Debug, Default)]
pub struct NetworkIdAllocator {
    next: u16,
}

impl NetworkIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> NetworkId {
        let id = NetworkId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> usize {
        self.next as usize
    }
}

/// Handle of a device created by the MAC/PHY collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceHandle(pub u32);

impl DeviceHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Reference to a shared transmission medium. The collaborator owns the
/// medium; the core only stores and redirects references to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChannelId(pub u32);

impl ChannelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Position of a device inside a network. Index 0 is always the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceSlot {
    pub network: NetworkId,
    pub index: usize,
}

impl DeviceSlot {
    pub fn is_coordinator(&self) -> bool {
        self.index == 0
    }

    /// Extended MAC address derived from the slot: network id in the upper
    /// bits, device index in the lower 16 bits.
    pub fn address(&self) -> MacAddress {
        MacAddress(((self.network.0 as u64) << 16) | self.index as u64)
    }
}

/// 64-bit extended MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MacAddress(pub u64);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// 2.4 GHz O-QPSK logical channel (11..=26).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LogicalChannel(u8);

impl LogicalChannel {
    pub const FIRST: u8 = 11;
    pub const LAST: u8 = 26;
    pub const COUNT: u8 = Self::LAST - Self::FIRST + 1;

    pub fn new(channel: u8) -> Option<Self> {
        (Self::FIRST..=Self::LAST).contains(&channel).then_some(Self(channel))
    }

    /// Channel assigned to the n-th network when cycling through the band.
    pub fn cyclic(n: usize) -> Self {
        Self(Self::FIRST + (n % Self::COUNT as usize) as u8)
    }

    pub fn number(self) -> u8 {
        self.0
    }
}

/// 3D coordinates in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Coordinates {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Outcome reported by the MAC in confirm primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MacStatus {
    Success,
    /// Medium was busy when the transmission was attempted.
    ChannelAccessFailure,
    /// Frame left the device but no acknowledgment came back.
    NoAck,
    InvalidParameter,
}

impl MacStatus {
    pub fn is_success(self) -> bool {
        self == MacStatus::Success
    }
}

/// MLME-START.request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    pub pan_id: u16,
    pub pan_coordinator: bool,
    pub beacon_order: u8,
    pub superframe_order: u8,
    pub logical_channel: LogicalChannel,
}

/// MLME-START.confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartConfirm {
    pub device: DeviceHandle,
    pub status: MacStatus,
}

/// MCPS-DATA.request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRequest {
    pub destination: MacAddress,
    pub payload_size: usize,
    pub msdu_handle: u8,
}

/// MCPS-DATA.confirm, reported on the sending device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataConfirm {
    pub device: DeviceHandle,
    pub msdu_handle: u8,
    pub status: MacStatus,
}

/// MCPS-DATA.indication, reported on the receiving device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataIndication {
    pub device: DeviceHandle,
    pub source: MacAddress,
    pub payload_size: usize,
    /// Received signal strength in dBm.
    pub rssi: f32,
}
