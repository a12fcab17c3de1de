//! The client's state machine.
//!
//! [`ClientState`] composes the device registry, message handlers, send
//! queues, discovery engine and sequence counter. It is synchronous and never
//! touches a socket or a clock: callers pass the current [`Instant`] into every
//! operation and collect outbound datagrams and events afterwards.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::Instant;

use log::{debug, warn};

use crate::config::ClientConfig;
use crate::device::Device;
use crate::discovery::{self, Discovery, DiscoveryState};
use crate::errors::Error;
use crate::handlers::{
    HandlerAction, HandlerCallback, Matched, MessageHandlers, RemoteInfo, Response,
};
use crate::packet::{Message, MessageType, Payload, decode, encode};
use crate::queue::{Completion, Datagram, Destination, QueuedPacket, SendQueues};
use crate::registry::{DeviceRegistry, Upsert};
use crate::types::{SequenceCounter, Source};

type Result<T> = std::result::Result<T, Error>;

/// Lifecycle notifications published by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A device answered discovery for the first time
    LightNew(Device),
    /// A device marked off answered discovery again
    LightOnline(Device),
    /// A device missed too many discovery cycles
    LightOffline(Device),
    /// Every configured light was found; published once
    DiscoveryCompleted,
}

pub(crate) struct ClientState {
    config: ClientConfig,
    source: Source,
    sequence: SequenceCounter,
    devices: DeviceRegistry,
    handlers: MessageHandlers,
    queues: SendQueues,
    discovery: Discovery,
    debug: bool,
    outbox: Vec<Datagram>,
    events: Vec<ClientEvent>,
}

impl ClientState {
    pub fn new(config: ClientConfig, now: Instant) -> Self {
        let mut handlers = MessageHandlers::new();
        handlers.register(MessageType::StateService, None, HandlerAction::Discovery, now);
        handlers.register(MessageType::StateLabel, None, HandlerAction::Label, now);
        handlers.register(MessageType::StateLight, None, HandlerAction::Label, now);

        ClientState {
            source: config.source,
            sequence: SequenceCounter::new(),
            devices: DeviceRegistry::new(),
            handlers,
            queues: SendQueues::new(config.resend_packet_delay, config.resend_max_times),
            discovery: Discovery::new(
                config.discovery_interval,
                config.lights.clone(),
                config.stop_after_discovery,
            ),
            debug: config.debug,
            outbox: Vec::new(),
            events: Vec::new(),
            config,
        }
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    pub fn start_discovery(&mut self, now: Instant) {
        self.discovery.start(now);
    }

    pub fn stop_discovery(&mut self) {
        self.discovery.stop();
    }

    pub fn light(&self, selector: &str) -> Option<Device> {
        self.devices.find(selector).cloned()
    }

    pub fn lights(&self, filter: &str) -> Result<Vec<Device>> {
        Ok(self.devices.list(filter)?.into_iter().cloned().collect())
    }

    /// Queue a message for delivery and return the sequence it was sent with.
    ///
    /// A message targeting a known device goes to that device's queue and
    /// takes the next sequence number. Anything else goes to the broadcast
    /// queue and reuses the current one.
    ///
    /// With a `completion` the message asks for a reply (a state message for
    /// queries, an acknowledgement otherwise) and is resent until the reply
    /// arrives or the retry budget runs out.
    pub fn send(
        &mut self,
        mut message: Message,
        completion: Option<Completion>,
        now: Instant,
    ) -> Result<u8> {
        let device = message
            .target()
            .and_then(|target| self.devices.get(target))
            .map(|device| (device.address(), device.port()));

        let (destination, addr, sequence) = match device {
            Some((address, port)) => (
                Destination::Unicast(address),
                SocketAddrV4::new(address, port),
                self.sequence.peek_next(),
            ),
            None => (
                Destination::Broadcast,
                SocketAddrV4::new(self.config.broadcast, self.config.send_port),
                self.sequence.current(),
            ),
        };

        let kind = message.message_type();
        message.header.source = self.source;
        message.header.sequence = sequence;
        if completion.is_some() {
            if kind.reply_type() == MessageType::Acknowledgement {
                message.header.ack_required = true;
            } else {
                message.header.res_required = true;
            }
        }

        let data = encode(&message)?;
        if device.is_some() {
            self.sequence.advance();
        }
        if completion.is_some() {
            self.handlers.register(
                kind.reply_type(),
                Some(sequence),
                HandlerAction::Request(destination),
                now,
            );
        }
        if self.debug {
            debug!("queue {kind} seq {sequence} for {destination} ({addr})");
        }

        self.queues.enqueue(
            destination,
            QueuedPacket::new(kind, sequence, data, addr, completion),
            now,
        );
        Ok(sequence)
    }

    /// Register a user handler. A handler with a sequence fires once, or
    /// times out after the configured handler timeout.
    pub fn add_handler(
        &mut self,
        kind: MessageType,
        sequence: Option<u8>,
        callback: HandlerCallback,
        now: Instant,
    ) {
        self.handlers
            .register(kind, sequence, HandlerAction::Callback(callback), now);
    }

    /// Process one received datagram.
    pub fn handle_datagram(&mut self, bytes: &[u8], peer: SocketAddr, now: Instant) {
        let SocketAddr::V4(peer) = peer else {
            debug!("ignoring datagram from non-IPv4 peer {peer}");
            return;
        };

        let message = match decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!("dropping datagram from {peer}: {e}");
                return;
            }
        };
        if self.debug {
            debug!(
                "recv {} seq {} from {peer}",
                message.message_type(),
                message.sequence()
            );
        }

        let remote = RemoteInfo {
            address: *peer.ip(),
            port: peer.port(),
            size: bytes.len(),
        };

        self.expire_handlers(now);
        for matched in self.handlers.dispatch(&message, &remote, self.source) {
            match matched {
                Matched::Discovery => self.on_discovery_reply(&message, &remote, now),
                Matched::Label => self.on_label_reply(&message),
                Matched::Request {
                    destination,
                    sequence,
                } => {
                    let completion = self
                        .queues
                        .take(destination, sequence)
                        .and_then(|packet| packet.completion);
                    if let Some(completion) = completion {
                        completion(Ok(Response {
                            message: message.clone(),
                            remote,
                        }));
                    }
                }
            }
        }
    }

    /// Fire every timer due at `now`.
    pub fn handle_timers(&mut self, now: Instant) {
        if self.discovery.is_due(now) {
            self.discovery_tick(now);
        }

        for destination in self.queues.due(now) {
            for sequence in self.queues.drain(destination, now, &mut self.outbox) {
                self.handlers.remove_request(destination, sequence);
            }
        }

        self.expire_handlers(now);
    }

    /// The earliest instant at which [`ClientState::handle_timers`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.discovery.next_deadline(),
            self.queues.next_deadline(),
            self.handlers.next_expiry(self.config.message_handler_timeout),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn take_outbox(&mut self) -> Vec<Datagram> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Stop discovery and cancel every send queue.
    pub fn destroy(&mut self) {
        self.discovery.stop();
        self.queues.clear();
    }

    fn discovery_tick(&mut self, now: Instant) {
        let destinations = self.discovery.begin_cycle(now);

        let offline = self
            .devices
            .mark_sweep(self.discovery.cycle(), self.config.light_offline_tolerance);
        for id in offline {
            if let Some(device) = self.devices.get(&id) {
                debug!("light {id} went offline");
                self.events.push(ClientEvent::LightOffline(device.clone()));
            }
        }

        for destination in destinations {
            self.probe(destination, now);
        }
    }

    fn probe(&mut self, destination: Destination, now: Instant) {
        let mut message = discovery::probe();
        message.header.source = self.source;
        message.header.sequence = self.sequence.current();

        let address = match destination {
            Destination::Broadcast => self.config.broadcast,
            Destination::Unicast(address) => address,
        };
        let addr = SocketAddrV4::new(address, self.config.send_port);

        match encode(&message) {
            Ok(data) => {
                let packet = QueuedPacket::new(
                    message.message_type(),
                    message.sequence(),
                    data,
                    addr,
                    None,
                );
                self.queues.enqueue(destination, packet, now);
            }
            Err(e) => warn!("failed to encode discovery probe for {addr}: {e}"),
        }
    }

    fn on_discovery_reply(&mut self, message: &Message, remote: &RemoteInfo, now: Instant) {
        let Some((id, port)) = discovery::accept_reply(message, Some(remote), self.config.send_port)
        else {
            return;
        };
        let id = id.to_string();

        match self
            .devices
            .upsert(&id, remote.address, port, self.discovery.cycle())
        {
            Upsert::Created => {
                debug!("new light {id} at {}", remote.address);
                if let Some(device) = self.devices.get(&id) {
                    self.events.push(ClientEvent::LightNew(device.clone()));
                }
                let label_request = Message::new(Payload::GetLabel).with_target(&id);
                if let Err(e) = self.send(label_request, None, now) {
                    warn!("failed to request label of {id}: {e}");
                }
            }
            Upsert::Recovered => {
                debug!("light {id} is back online at {}", remote.address);
                if let Some(device) = self.devices.get(&id) {
                    self.events.push(ClientEvent::LightOnline(device.clone()));
                }
            }
            Upsert::Refreshed => {}
        }

        if self.discovery.targets_found(&self.devices) && self.discovery.complete() {
            debug!("all configured lights found, discovery stopped");
            self.events.push(ClientEvent::DiscoveryCompleted);
        }
    }

    fn on_label_reply(&mut self, message: &Message) {
        if let (Some(id), Some(label)) = (message.target(), message.payload.label()) {
            self.devices.set_label(id, label);
        }
    }

    fn expire_handlers(&mut self, now: Instant) {
        for expired in self
            .handlers
            .sweep_expired(now, self.config.message_handler_timeout)
        {
            let completion = self
                .queues
                .take(expired.destination, expired.sequence)
                .and_then(|packet| packet.completion);
            if let Some(completion) = completion {
                completion(Err(Error::Timeout {
                    kind: expired.kind,
                    sequence: expired.sequence,
                }));
            }
        }
    }
}
