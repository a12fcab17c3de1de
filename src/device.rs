//! Devices known to the client.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Liveness of a device as seen by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Answered a recent discovery cycle
    On,
    /// Missed more discovery cycles than the offline tolerance allows
    Off,
}

/// A single LIFX device found on the network.
///
/// Devices are created by discovery and updated in place on every later
/// sighting. They are never removed; a device that stops answering is only
/// marked [`DeviceStatus::Off`].
///
/// # Example
///
/// ```
/// use std::net::Ipv4Addr;
/// use lifx_lan_client::{Device, DeviceStatus};
///
/// let device = Device::new("d073d5006d72", Ipv4Addr::new(192, 168, 2, 108), 56700, 1);
/// assert_eq!(device.status(), DeviceStatus::On);
/// assert_eq!(device.label(), "");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    id: String,
    address: Ipv4Addr,
    port: u16,
    status: DeviceStatus,
    label: String,
    seen_on_discovery: u64,
}

impl Device {
    pub fn new(id: &str, address: Ipv4Addr, port: u16, seen_on_discovery: u64) -> Self {
        Device {
            id: id.to_string(),
            address,
            port,
            status: DeviceStatus::On,
            label: String::new(),
            seen_on_discovery,
        }
    }

    /// Stable device id (the hex form of its MAC address).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn is_on(&self) -> bool {
        self.status == DeviceStatus::On
    }

    /// Display name, empty until the device reports it.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Discovery cycle in which the device last answered.
    pub fn seen_on_discovery(&self) -> u64 {
        self.seen_on_discovery
    }

    /// Record a fresh sighting. Returns `true` if the device was off.
    pub(crate) fn refresh(&mut self, address: Ipv4Addr, port: u16, cycle: u64) -> bool {
        self.address = address;
        self.port = port;
        self.seen_on_discovery = cycle;
        let recovered = self.status == DeviceStatus::Off;
        self.status = DeviceStatus::On;
        recovered
    }

    pub(crate) fn set_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }

    /// Returns `true` if the label changed.
    pub(crate) fn set_label(&mut self, label: &str) -> bool {
        if self.label == label {
            return false;
        }
        self.label = label.to_string();
        true
    }
}
