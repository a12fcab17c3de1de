//! Per-destination send queues with fixed-interval resends.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::errors::Error;
use crate::handlers::Response;
use crate::packet::MessageType;

type Result<T> = std::result::Result<T, Error>;

/// Called exactly once with the reply to a packet, or with
/// [`Error::Timeout`] once its retries run out.
pub type Completion = Box<dyn FnOnce(Result<Response>) + Send + 'static>;

/// The key a send queue is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// No explicit target; sent to the broadcast address
    Broadcast,
    Unicast(Ipv4Addr),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Broadcast => write!(f, "broadcast"),
            Destination::Unicast(address) => write!(f, "{address}"),
        }
    }
}

/// A datagram ready for the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub data: Bytes,
    pub addr: SocketAddrV4,
}

/// An encoded packet waiting to be sent or answered.
pub(crate) struct QueuedPacket {
    pub kind: MessageType,
    pub sequence: u8,
    pub data: Bytes,
    pub addr: SocketAddrV4,
    pub sent_count: u32,
    /// `None` for one-way packets
    pub completion: Option<Completion>,
}

impl QueuedPacket {
    pub fn new(
        kind: MessageType,
        sequence: u8,
        data: Bytes,
        addr: SocketAddrV4,
        completion: Option<Completion>,
    ) -> Self {
        QueuedPacket {
            kind,
            sequence,
            data,
            addr,
            sent_count: 0,
            completion,
        }
    }

    fn awaits_response(&self) -> bool {
        self.completion.is_some()
    }
}

struct SendQueue {
    packets: VecDeque<QueuedPacket>,
    /// Next timer expiry. The queue only exists while it holds packets, so
    /// removing it cancels the timer.
    next_tick: Instant,
}

/// FIFO queues keyed by [`Destination`], each driven by its own timer.
pub(crate) struct SendQueues {
    queues: HashMap<Destination, SendQueue>,
    resend_delay: Duration,
    resend_max_times: u32,
}

impl SendQueues {
    pub fn new(resend_delay: Duration, resend_max_times: u32) -> Self {
        SendQueues {
            queues: HashMap::new(),
            resend_delay,
            resend_max_times,
        }
    }

    /// Append a packet. A new queue's timer is due immediately.
    pub fn enqueue(&mut self, destination: Destination, packet: QueuedPacket, now: Instant) {
        self.queues
            .entry(destination)
            .or_insert_with(|| SendQueue {
                packets: VecDeque::new(),
                next_tick: now,
            })
            .packets
            .push_back(packet);
    }

    /// One timer tick for `destination`.
    ///
    /// Every packet is visited in FIFO order: one-way packets are sent once
    /// and dropped, packets awaiting a reply are sent again until they have
    /// been sent `resend_max_times` times, after which they are dropped and
    /// completed with a timeout. Returns the sequences of timed-out packets.
    pub fn drain(
        &mut self,
        destination: Destination,
        now: Instant,
        outbox: &mut Vec<Datagram>,
    ) -> Vec<u8> {
        let mut exhausted = Vec::new();
        let Some(queue) = self.queues.get_mut(&destination) else {
            return exhausted;
        };

        let mut kept = VecDeque::with_capacity(queue.packets.len());
        while let Some(mut packet) = queue.packets.pop_front() {
            if packet.awaits_response() && packet.sent_count >= self.resend_max_times {
                if let Some(completion) = packet.completion.take() {
                    completion(Err(Error::Timeout {
                        kind: packet.kind.reply_type(),
                        sequence: packet.sequence,
                    }));
                }
                exhausted.push(packet.sequence);
                continue;
            }

            outbox.push(Datagram {
                data: packet.data.clone(),
                addr: packet.addr,
            });
            packet.sent_count += 1;

            if packet.awaits_response() {
                kept.push_back(packet);
            }
        }

        if kept.is_empty() {
            self.queues.remove(&destination);
        } else {
            queue.packets = kept;
            queue.next_tick = now + self.resend_delay;
        }
        exhausted
    }

    /// Remove the packet awaiting a reply with `sequence`, if still queued.
    pub fn take(&mut self, destination: Destination, sequence: u8) -> Option<QueuedPacket> {
        let queue = self.queues.get_mut(&destination)?;
        let index = queue
            .packets
            .iter()
            .position(|p| p.sequence == sequence && p.awaits_response())?;
        let packet = queue.packets.remove(index);
        if queue.packets.is_empty() {
            self.queues.remove(&destination);
        }
        packet
    }

    /// Destinations whose timer has expired.
    pub fn due(&self, now: Instant) -> Vec<Destination> {
        self.queues
            .iter()
            .filter(|(_, queue)| queue.next_tick <= now)
            .map(|(destination, _)| *destination)
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queues.values().map(|queue| queue.next_tick).min()
    }

    #[cfg(test)]
    pub fn len(&self, destination: Destination) -> usize {
        self.queues
            .get(&destination)
            .map_or(0, |queue| queue.packets.len())
    }

    #[cfg(test)]
    pub fn has_timer(&self, destination: Destination) -> bool {
        self.queues.contains_key(&destination)
    }

    /// Cancel every timer and drop every queued packet.
    pub fn clear(&mut self) {
        self.queues.clear();
    }

    #[cfg(test)]
    pub(crate) fn front_mut(&mut self, destination: Destination) -> Option<&mut QueuedPacket> {
        self.queues
            .get_mut(&destination)
            .and_then(|queue| queue.packets.front_mut())
    }
}
