//! Periodic device discovery.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::device::DeviceStatus;
use crate::handlers::RemoteInfo;
use crate::packet::{Message, Payload};
use crate::queue::Destination;
use crate::registry::DeviceRegistry;

/// Lifecycle of the discovery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Not probing
    Idle,
    /// Probing on every interval
    Discovering,
    /// Every configured light was found and discovery stopped itself
    Stopped,
}

/// Drives discovery cycles: one probe round per interval.
#[derive(Debug)]
pub(crate) struct Discovery {
    state: DiscoveryState,
    interval: Duration,
    next_tick: Option<Instant>,
    cycle: u64,
    targets: Vec<Ipv4Addr>,
    stop_after_discovery: bool,
    completed: bool,
}

impl Discovery {
    pub fn new(interval: Duration, targets: Vec<Ipv4Addr>, stop_after_discovery: bool) -> Self {
        Discovery {
            state: DiscoveryState::Idle,
            interval,
            next_tick: None,
            cycle: 0,
            targets,
            stop_after_discovery,
            completed: false,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// The current discovery cycle; replies are stamped with it.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Start probing. The first cycle is due immediately.
    pub fn start(&mut self, now: Instant) {
        self.state = DiscoveryState::Discovering;
        self.next_tick = Some(now);
    }

    pub fn stop(&mut self) {
        self.state = DiscoveryState::Idle;
        self.next_tick = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_tick.is_some_and(|tick| tick <= now)
    }

    /// Open a new cycle and schedule the next one.
    ///
    /// Returns where to send probes: the broadcast address, or each
    /// configured light.
    pub fn begin_cycle(&mut self, now: Instant) -> Vec<Destination> {
        self.cycle += 1;
        self.next_tick = Some(now + self.interval);

        if self.targets.is_empty() {
            vec![Destination::Broadcast]
        } else {
            self.targets
                .iter()
                .map(|address| Destination::Unicast(*address))
                .collect()
        }
    }

    /// Whether every configured light is known and on, with early
    /// termination requested.
    pub fn targets_found(&self, registry: &DeviceRegistry) -> bool {
        self.stop_after_discovery
            && !self.targets.is_empty()
            && self.targets.iter().all(|address| {
                registry
                    .find_by_address(*address)
                    .is_some_and(|device| device.status() == DeviceStatus::On)
            })
    }

    /// Stop for good after finding every target. Returns `true` only the
    /// first time.
    pub fn complete(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.state = DiscoveryState::Stopped;
        self.next_tick = None;
        true
    }
}

/// Build a discovery probe.
pub(crate) fn probe() -> Message {
    Message::new(Payload::GetService)
}

/// Extract the device id from a discovery reply.
///
/// Anything that is not a UDP service advertisement on `port` from a
/// targeted device is rejected.
pub(crate) fn accept_reply<'a>(
    message: &'a Message,
    remote: Option<&RemoteInfo>,
    port: u16,
) -> Option<(&'a str, u16)> {
    if remote.is_none() {
        return None;
    }
    match message.payload {
        Payload::StateService {
            service: Payload::SERVICE_UDP,
            port: advertised,
        } if advertised == u32::from(port) => message.target().map(|id| (id, port)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(5);

    fn reply(service: u8, port: u32, target: Option<&str>) -> Message {
        let mut msg = Message::new(Payload::StateService { service, port });
        msg.header.target = target.map(String::from);
        msg
    }

    fn remote() -> RemoteInfo {
        RemoteInfo {
            address: Ipv4Addr::new(192, 168, 2, 108),
            port: 56700,
            size: 41,
        }
    }

    #[test]
    fn test_start_and_stop() {
        let now = Instant::now();
        let mut discovery = Discovery::new(INTERVAL, Vec::new(), false);
        assert_eq!(discovery.state(), DiscoveryState::Idle);
        assert_eq!(discovery.next_deadline(), None);

        discovery.start(now);
        assert_eq!(discovery.state(), DiscoveryState::Discovering);
        assert!(discovery.is_due(now));

        discovery.stop();
        assert_eq!(discovery.state(), DiscoveryState::Idle);
        assert!(!discovery.is_due(now + INTERVAL));
    }

    #[test]
    fn test_cycles_broadcast_by_default() {
        let now = Instant::now();
        let mut discovery = Discovery::new(INTERVAL, Vec::new(), false);
        discovery.start(now);

        assert_eq!(discovery.begin_cycle(now), vec![Destination::Broadcast]);
        assert_eq!(discovery.cycle(), 1);
        assert!(!discovery.is_due(now + INTERVAL - Duration::from_millis(1)));
        assert!(discovery.is_due(now + INTERVAL));
    }

    #[test]
    fn test_cycles_probe_each_target() {
        let targets = vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)];
        let mut discovery = Discovery::new(INTERVAL, targets.clone(), false);
        let destinations = discovery.begin_cycle(Instant::now());
        assert_eq!(
            destinations,
            targets.into_iter().map(Destination::Unicast).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_accept_reply_filters_malformed() {
        let good = reply(Payload::SERVICE_UDP, 56700, Some("d073d5006d72"));
        assert_eq!(
            accept_reply(&good, Some(&remote()), 56700),
            Some(("d073d5006d72", 56700))
        );

        assert!(accept_reply(&good, None, 56700).is_none());

        let rejected = [
            reply(Payload::SERVICE_UDP, 8080, Some("d073d5006d72")),
            reply(5, 56700, Some("d073d5006d72")),
            reply(Payload::SERVICE_UDP, 56700, None),
            Message::new(Payload::GetService),
        ];
        for msg in &rejected {
            assert!(accept_reply(msg, Some(&remote()), 56700).is_none(), "{msg:?}");
        }
    }

    #[test]
    fn test_complete_only_once() {
        let target = Ipv4Addr::new(192, 168, 2, 108);
        let mut discovery = Discovery::new(INTERVAL, vec![target], true);
        let mut registry = DeviceRegistry::new();
        discovery.start(Instant::now());

        assert!(!discovery.targets_found(&registry));
        registry.upsert("d073d5006d72", target, 56700, 1);
        assert!(discovery.targets_found(&registry));

        assert!(discovery.complete());
        assert_eq!(discovery.state(), DiscoveryState::Stopped);
        assert_eq!(discovery.next_deadline(), None);
        assert!(!discovery.complete());
    }

    #[test]
    fn test_targets_found_requires_every_target() {
        let first = Ipv4Addr::new(192, 168, 2, 108);
        let second = Ipv4Addr::new(192, 168, 2, 109);
        let discovery = Discovery::new(INTERVAL, vec![first, second], true);
        let mut registry = DeviceRegistry::new();

        registry.upsert("d073d5006d72", first, 56700, 1);
        assert!(!discovery.targets_found(&registry));

        registry.upsert("d073d5001234", second, 56700, 1);
        assert!(discovery.targets_found(&registry));
    }

    #[test]
    fn test_targets_found_requires_lights_on() {
        let target = Ipv4Addr::new(192, 168, 2, 108);
        let discovery = Discovery::new(INTERVAL, vec![target], true);
        let mut registry = DeviceRegistry::new();
        registry.upsert("d073d5006d72", target, 56700, 1);

        assert_eq!(registry.mark_sweep(5, 3), vec!["d073d5006d72".to_string()]);
        assert!(!discovery.targets_found(&registry));
    }

    #[test]
    fn test_targets_found_requires_stop_after_discovery() {
        let target = Ipv4Addr::new(192, 168, 2, 108);
        let discovery = Discovery::new(INTERVAL, vec![target], false);
        let mut registry = DeviceRegistry::new();
        registry.upsert("d073d5006d72", target, 56700, 1);
        assert!(!discovery.targets_found(&registry));
    }
}
