//! Matching of received messages against pending and permanent handlers.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::errors::Error;
use crate::packet::{Message, MessageType};
use crate::queue::Destination;
use crate::types::Source;

type Result<T> = std::result::Result<T, Error>;

/// Where a datagram came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteInfo {
    pub address: Ipv4Addr,
    pub port: u16,
    /// Datagram length in bytes
    pub size: usize,
}

/// A message delivered to a handler together with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub message: Message,
    pub remote: RemoteInfo,
}

/// Callback for [`Client::add_message_handler`](crate::Client::add_message_handler).
///
/// Receives `Ok` for every match and, for one-shot handlers, a single
/// [`Error::Timeout`] if nothing matched in time.
pub type HandlerCallback = Box<dyn FnMut(Result<Response>) + Send + 'static>;

/// Whether a handler for `kind`, optionally bound to `sequence`, accepts `message`.
///
/// Handlers bound to a sequence only accept replies addressed to this
/// client's `source`.
///
/// # Examples
///
/// ```
/// use lifx_lan_client::{handler_matches, Message, MessageType, Payload, Source};
///
/// let source = Source::new(0x12345678);
/// let mut msg = Message::new(Payload::StatePower { level: 0 });
/// msg.header.sequence = 1;
/// msg.header.source = source;
///
/// assert!(handler_matches(MessageType::StatePower, None, &msg, Source::new(7)));
/// assert!(handler_matches(MessageType::StatePower, Some(1), &msg, source));
/// assert!(!handler_matches(MessageType::StatePower, Some(1), &msg, Source::new(7)));
/// assert!(!handler_matches(MessageType::StateLight, None, &msg, source));
/// ```
pub fn handler_matches(
    kind: MessageType,
    sequence: Option<u8>,
    message: &Message,
    source: Source,
) -> bool {
    if message.message_type() != kind {
        return false;
    }
    match sequence {
        None => true,
        Some(sequence) => message.sequence() == sequence && message.source() == source,
    }
}

pub(crate) enum HandlerAction {
    /// Feed discovery replies into the device registry
    Discovery,
    /// Update device labels
    Label,
    /// Complete the queued packet with this sequence on `Destination`
    Request(Destination),
    Callback(HandlerCallback),
}

/// A handler that fired for a built-in concern; the caller acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Matched {
    Discovery,
    Label,
    Request {
        destination: Destination,
        sequence: u8,
    },
}

/// A request handler whose wait ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExpiredRequest {
    pub destination: Destination,
    pub kind: MessageType,
    pub sequence: u8,
}

struct Handler {
    kind: MessageType,
    sequence: Option<u8>,
    registered_at: Instant,
    action: HandlerAction,
}

impl Handler {
    fn is_one_shot(&self) -> bool {
        self.sequence.is_some()
    }
}

/// Ordered collection of handlers.
///
/// Handlers without a sequence are permanent and fire on every match.
/// Handlers with a sequence fire once, either matched or timed out, and are
/// then removed.
#[derive(Default)]
pub(crate) struct MessageHandlers {
    entries: Vec<Handler>,
}

impl MessageHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `(type, sequence)` of every handler, in registration order.
    #[cfg(test)]
    pub fn registered(&self) -> Vec<(MessageType, Option<u8>)> {
        self.entries.iter().map(|h| (h.kind, h.sequence)).collect()
    }

    pub fn register(
        &mut self,
        kind: MessageType,
        sequence: Option<u8>,
        action: HandlerAction,
        now: Instant,
    ) {
        self.entries.push(Handler {
            kind,
            sequence,
            registered_at: now,
            action,
        });
    }

    /// Run every handler that accepts `message`.
    ///
    /// User callbacks are invoked here; built-in concerns are returned so the
    /// caller can apply them to state this registry does not own.
    pub fn dispatch(
        &mut self,
        message: &Message,
        remote: &RemoteInfo,
        source: Source,
    ) -> Vec<Matched> {
        let mut matched = Vec::new();
        let mut index = 0;

        while index < self.entries.len() {
            let handler = &mut self.entries[index];
            if !handler_matches(handler.kind, handler.sequence, message, source) {
                index += 1;
                continue;
            }

            let one_shot = handler.is_one_shot();
            match &mut handler.action {
                HandlerAction::Discovery => matched.push(Matched::Discovery),
                HandlerAction::Label => matched.push(Matched::Label),
                HandlerAction::Request(destination) => matched.push(Matched::Request {
                    destination: *destination,
                    sequence: message.sequence(),
                }),
                HandlerAction::Callback(callback) => callback(Ok(Response {
                    message: message.clone(),
                    remote: *remote,
                })),
            }

            if one_shot {
                self.entries.remove(index);
            } else {
                index += 1;
            }
        }
        matched
    }

    /// Time out one-shot handlers registered `timeout` or longer before `now`.
    pub fn sweep_expired(&mut self, now: Instant, timeout: Duration) -> Vec<ExpiredRequest> {
        let mut expired = Vec::new();
        let mut index = 0;

        while index < self.entries.len() {
            let handler = &self.entries[index];
            let Some(sequence) = handler.sequence else {
                index += 1;
                continue;
            };
            if now.saturating_duration_since(handler.registered_at) < timeout {
                index += 1;
                continue;
            }

            let handler = self.entries.remove(index);
            match handler.action {
                HandlerAction::Request(destination) => expired.push(ExpiredRequest {
                    destination,
                    kind: handler.kind,
                    sequence,
                }),
                HandlerAction::Callback(mut callback) => callback(Err(Error::Timeout {
                    kind: handler.kind,
                    sequence,
                })),
                HandlerAction::Discovery | HandlerAction::Label => {}
            }
        }
        expired
    }

    /// Drop the request handler for a packet that completed elsewhere.
    pub fn remove_request(&mut self, destination: Destination, sequence: u8) {
        if let Some(index) = self.entries.iter().position(|h| {
            h.sequence == Some(sequence)
                && matches!(h.action, HandlerAction::Request(d) if d == destination)
        }) {
            self.entries.remove(index);
        }
    }

    /// When the oldest one-shot handler times out.
    pub fn next_expiry(&self, timeout: Duration) -> Option<Instant> {
        self.entries
            .iter()
            .filter(|h| h.is_one_shot())
            .map(|h| h.registered_at + timeout)
            .min()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::packet::Payload;

    const TIMEOUT: Duration = Duration::from_secs(30);

    fn source() -> Source {
        "12345678".parse().unwrap()
    }

    fn remote() -> RemoteInfo {
        RemoteInfo {
            address: Ipv4Addr::new(192, 168, 0, 1),
            port: 56700,
            size: 38,
        }
    }

    fn state_power(sequence: u8, source: Source) -> Message {
        let mut msg = Message::new(Payload::StatePower { level: 65535 });
        msg.header.sequence = sequence;
        msg.header.source = source;
        msg
    }

    type Calls = Arc<Mutex<Vec<std::result::Result<u8, String>>>>;

    fn recording(calls: &Calls) -> HandlerAction {
        let calls = Arc::clone(calls);
        HandlerAction::Callback(Box::new(move |result| {
            calls.lock().unwrap().push(
                result
                    .map(|r| r.message.sequence())
                    .map_err(|e| e.to_string()),
            );
        }))
    }

    #[test]
    fn test_one_shot_handler_fires_once_and_is_removed() {
        let now = Instant::now();
        let mut handlers = MessageHandlers::new();
        let wrong: Calls = Default::default();
        let right: Calls = Default::default();

        handlers.register(MessageType::StatePower, Some(2), recording(&wrong), now);
        handlers.register(MessageType::StateLight, Some(1), recording(&wrong), now);
        handlers.register(MessageType::StatePower, Some(1), recording(&right), now);
        assert_eq!(handlers.len(), 3);

        handlers.dispatch(&state_power(1, source()), &remote(), source());
        assert_eq!(handlers.len(), 2);
        assert_eq!(*right.lock().unwrap(), vec![Ok(1)]);
        assert!(wrong.lock().unwrap().is_empty());

        handlers.dispatch(&state_power(1, source()), &remote(), source());
        assert_eq!(right.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_one_shot_handler_ignores_foreign_source() {
        let now = Instant::now();
        let mut handlers = MessageHandlers::new();
        let calls: Calls = Default::default();
        handlers.register(MessageType::StatePower, Some(1), recording(&calls), now);

        handlers.dispatch(&state_power(1, Source::new(99)), &remote(), source());
        assert_eq!(handlers.len(), 1);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_permanent_handler_is_kept() {
        let now = Instant::now();
        let mut handlers = MessageHandlers::new();
        let calls: Calls = Default::default();
        handlers.register(MessageType::StatePower, None, recording(&calls), now);

        handlers.dispatch(&state_power(4, Source::new(99)), &remote(), source());
        handlers.dispatch(&state_power(5, source()), &remote(), source());
        assert_eq!(handlers.len(), 1);
        assert_eq!(*calls.lock().unwrap(), vec![Ok(4), Ok(5)]);
    }

    #[test]
    fn test_builtins_are_reported_to_the_caller() {
        let now = Instant::now();
        let mut handlers = MessageHandlers::new();
        handlers.register(MessageType::StateLabel, None, HandlerAction::Label, now);
        let dest = Destination::Unicast(Ipv4Addr::new(10, 0, 0, 1));
        handlers.register(
            MessageType::StateLabel,
            Some(3),
            HandlerAction::Request(dest),
            now,
        );

        let mut msg = Message::new(Payload::StateLabel {
            label: "Desk".into(),
        });
        msg.header.sequence = 3;
        msg.header.source = source();

        let matched = handlers.dispatch(&msg, &remote(), source());
        assert_eq!(
            matched,
            vec![
                Matched::Label,
                Matched::Request {
                    destination: dest,
                    sequence: 3
                }
            ]
        );
        assert_eq!(handlers.registered(), vec![(MessageType::StateLabel, None)]);
    }

    #[test]
    fn test_timeout_fires_once() {
        let now = Instant::now();
        let mut handlers = MessageHandlers::new();
        let calls: Calls = Default::default();
        handlers.register(MessageType::StatePower, Some(2), recording(&calls), now);
        handlers.register(MessageType::StatePower, None, recording(&calls), now);

        handlers.sweep_expired(now + TIMEOUT - Duration::from_millis(1), TIMEOUT);
        assert_eq!(handlers.len(), 2);
        assert!(calls.lock().unwrap().is_empty());

        handlers.sweep_expired(now + TIMEOUT + Duration::from_millis(1), TIMEOUT);
        assert_eq!(handlers.len(), 1);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is_err());

        // a late reply finds nothing to match
        drop(calls);
        handlers.dispatch(&state_power(2, source()), &remote(), source());
    }

    #[test]
    fn test_expired_requests_are_returned() {
        let now = Instant::now();
        let mut handlers = MessageHandlers::new();
        handlers.register(
            MessageType::Acknowledgement,
            Some(9),
            HandlerAction::Request(Destination::Broadcast),
            now,
        );
        assert_eq!(handlers.next_expiry(TIMEOUT), Some(now + TIMEOUT));

        let expired = handlers.sweep_expired(now + TIMEOUT, TIMEOUT);
        assert_eq!(
            expired,
            vec![ExpiredRequest {
                destination: Destination::Broadcast,
                kind: MessageType::Acknowledgement,
                sequence: 9,
            }]
        );
        assert_eq!(handlers.next_expiry(TIMEOUT), None);
    }

    #[test]
    fn test_remove_request() {
        let now = Instant::now();
        let mut handlers = MessageHandlers::new();
        let dest = Destination::Unicast(Ipv4Addr::new(10, 0, 0, 1));
        handlers.register(
            MessageType::Acknowledgement,
            Some(1),
            HandlerAction::Request(Destination::Broadcast),
            now,
        );
        handlers.register(
            MessageType::Acknowledgement,
            Some(1),
            HandlerAction::Request(dest),
            now,
        );

        handlers.remove_request(dest, 1);
        assert_eq!(handlers.len(), 1);
        handlers.remove_request(dest, 1);
        assert_eq!(handlers.len(), 1);
    }
}
