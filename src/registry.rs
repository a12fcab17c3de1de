//! Registry of discovered devices.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::device::{Device, DeviceStatus};
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// What [`DeviceRegistry::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// First sighting of this id
    Created,
    /// Known device that had been marked off
    Recovered,
    /// Known device that was already on
    Refreshed,
}

impl Upsert {
    pub fn is_new(self) -> bool {
        self == Upsert::Created
    }
}

/// All devices the client has ever seen, keyed by device id.
///
/// # Example
///
/// ```
/// use std::net::Ipv4Addr;
/// use lifx_lan_client::DeviceRegistry;
///
/// let mut registry = DeviceRegistry::new();
/// assert!(registry.upsert("d073d5006d72", Ipv4Addr::new(192, 168, 2, 108), 56700, 1).is_new());
/// assert!(registry.find("192.168.2.108").is_some());
/// assert!(registry.find("d073d5006d73").is_none());
/// ```
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Create the device or refresh an existing one.
    pub fn upsert(&mut self, id: &str, address: Ipv4Addr, port: u16, cycle: u64) -> Upsert {
        if let Some(existing) = self.devices.get_mut(id) {
            return if existing.refresh(address, port, cycle) {
                Upsert::Recovered
            } else {
                Upsert::Refreshed
            };
        }

        self.devices
            .insert(id.to_string(), Device::new(id, address, port, cycle));
        Upsert::Created
    }

    /// Mark every device not seen within `tolerance` cycles of `current` as off.
    ///
    /// Returns the ids that changed from on to off.
    pub fn mark_sweep(&mut self, current: u64, tolerance: u64) -> Vec<String> {
        let threshold = current.saturating_sub(tolerance);
        self.devices
            .values_mut()
            .filter(|device| device.is_on() && device.seen_on_discovery() < threshold)
            .map(|device| {
                device.set_status(DeviceStatus::Off);
                device.id().to_string()
            })
            .collect()
    }

    /// Resolve a device by id, then address, then label.
    ///
    /// Matching is exact: case-sensitive and without any normalization.
    pub fn find(&self, selector: &str) -> Option<&Device> {
        self.devices.get(selector).or_else(|| {
            self.devices
                .values()
                .find(|device| device.address().to_string() == selector)
                .or_else(|| self.devices.values().find(|device| device.label() == selector))
        })
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn find_by_address(&self, address: Ipv4Addr) -> Option<&Device> {
        self.devices.values().find(|device| device.address() == address)
    }

    /// List devices, optionally filtered by status.
    ///
    /// `""` lists everything, `"on"` and `"off"` filter; anything else is an
    /// [`Error::InvalidArgument`].
    pub fn list(&self, filter: &str) -> Result<Vec<&Device>> {
        let status = match filter {
            "" => None,
            other => Some(other.parse::<DeviceStatus>().map_err(|_| {
                Error::invalid(format!(
                    "light status filter must be \"on\", \"off\" or empty, got {other:?}"
                ))
            })?),
        };

        Ok(self
            .devices
            .values()
            .filter(|device| status.is_none_or(|s| device.status() == s))
            .collect())
    }

    /// Returns `true` if a device with this id exists.
    pub fn set_label(&mut self, id: &str, label: &str) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.set_label(label);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Device> {
        self.devices.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn sample() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();

        registry.upsert("0dd124d25597", ip("192.168.0.8"), 56700, 1);
        registry
            .get_mut("0dd124d25597")
            .unwrap()
            .set_status(DeviceStatus::Off);

        registry.upsert("ad227d95517z", ip("192.168.254.254"), 56700, 1);
        registry.set_label("ad227d95517z", "Living room");

        registry.upsert("783rbc67cg14", ip("192.168.1.5"), 56700, 2);
        registry.set_label("783rbc67cg14", "Ceiling. Upstairs.");

        registry.upsert("883rbd67cg15", ip("192.168.1.6"), 56700, 2);
        registry.set_label("883rbd67cg15", "Front: 🚪Door");
        registry
    }

    #[test]
    fn test_find_by_id_address_and_label() {
        let registry = sample();

        assert_eq!(
            registry.find("0dd124d25597").unwrap().address(),
            ip("192.168.0.8")
        );
        assert_eq!(registry.find("192.168.254.254").unwrap().id(), "ad227d95517z");
        assert_eq!(registry.find("Living room").unwrap().id(), "ad227d95517z");
        assert_eq!(registry.find("Front: 🚪Door").unwrap().id(), "883rbd67cg15");
    }

    #[test]
    fn test_find_is_exact() {
        let registry = sample();

        assert!(registry.find("141svsdvsdv1").is_none());
        assert!(registry.find("Front: Door").is_none());
        assert!(registry.find("living room").is_none());
        assert!(registry.find("192.168.0.1").is_none());
        assert!(
            registry
                .find("7812e9zonvwouv8754179410ufsknsuvsif724581419713947")
                .is_none()
        );
    }

    #[test]
    fn test_id_takes_priority_over_label() {
        let mut registry = sample();
        registry.set_label("783rbc67cg14", "0dd124d25597");
        assert_eq!(registry.find("0dd124d25597").unwrap().id(), "0dd124d25597");
    }

    #[test]
    fn test_list_filters() {
        let registry = sample();

        assert_eq!(registry.list("").unwrap().len(), 4);
        let on = registry.list("on").unwrap();
        assert_eq!(on.len(), 3);
        assert!(on.iter().all(|d| d.is_on()));
        let off = registry.list("off").unwrap();
        assert_eq!(off.len(), 1);
        assert_eq!(off[0].id(), "0dd124d25597");

        assert!(matches!(registry.list("true"), Err(Error::InvalidArgument(_))));
        assert!(matches!(registry.list("On"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_upsert_outcomes() {
        let mut registry = DeviceRegistry::new();
        let addr = ip("192.168.2.108");

        assert_eq!(registry.upsert("d073d5006d72", addr, 56700, 1), Upsert::Created);
        assert_eq!(registry.upsert("d073d5006d72", addr, 56700, 2), Upsert::Refreshed);

        registry
            .get_mut("d073d5006d72")
            .unwrap()
            .set_status(DeviceStatus::Off);
        assert_eq!(
            registry.upsert("d073d5006d72", ip("192.168.2.109"), 56700, 3),
            Upsert::Recovered
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("192.168.2.109").unwrap().id(), "d073d5006d72");
        assert!(registry.find("192.168.2.108").is_none());
    }

    #[test]
    fn test_mark_sweep_keeps_records() {
        let mut registry = DeviceRegistry::new();
        registry.upsert("aaaaaaaaaaaa", ip("10.0.0.1"), 56700, 1);
        registry.upsert("bbbbbbbbbbbb", ip("10.0.0.2"), 56700, 3);

        assert!(registry.mark_sweep(4, 3).is_empty());
        assert_eq!(registry.mark_sweep(5, 3), vec!["aaaaaaaaaaaa".to_string()]);
        // already off, not reported twice
        assert!(registry.mark_sweep(5, 3).is_empty());

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("aaaaaaaaaaaa").unwrap().status(), DeviceStatus::Off);
        assert!(registry.get("bbbbbbbbbbbb").unwrap().is_on());
    }
}
