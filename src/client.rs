//! The async client handle and its event loop.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt};
use log::{debug, warn};

use crate::config::ClientOptions;
use crate::device::Device;
use crate::discovery::DiscoveryState;
use crate::errors::Error;
use crate::handlers::{HandlerCallback, Response};
use crate::packet::{Message, MessageType};
use crate::queue::Completion;
use crate::runtime::{self, AsyncUdpSocket, JoinHandle, UdpSocket};
use crate::state::{ClientEvent, ClientState};
use crate::types::Source;

type Result<T> = std::result::Result<T, Error>;

const RECV_BUFFER_SIZE: usize = 2048;
/// How long the loop sleeps when no timer is pending.
const IDLE_WAIT: Duration = Duration::from_secs(60);

enum Command {
    Send {
        message: Message,
        completion: Option<Completion>,
        reply: oneshot::Sender<Result<u8>>,
    },
    AddHandler {
        kind: MessageType,
        sequence: Option<u8>,
        callback: HandlerCallback,
    },
    Light {
        selector: String,
        reply: oneshot::Sender<Option<Device>>,
    },
    Lights {
        filter: String,
        reply: oneshot::Sender<Result<Vec<Device>>>,
    },
    DiscoveryState(oneshot::Sender<DiscoveryState>),
    StartDiscovery,
    StopDiscovery,
    SetDebug(bool),
    Subscribe(mpsc::UnboundedSender<ClientEvent>),
    Destroy(oneshot::Sender<()>),
}

/// A LIFX LAN client.
///
/// The client owns one UDP socket and a background task that runs discovery,
/// resends queued packets and matches replies. Every method talks to that
/// task; once [`Client::destroy`] has run they fail with
/// [`Error::ClientClosed`].
///
/// # Example
///
/// ```ignore
/// use lifx_lan_client::{Client, ClientOptions, Message, Payload};
///
/// async fn power_on() -> Result<(), lifx_lan_client::Error> {
///     let mut client = Client::init(ClientOptions::new()).await?;
///
///     if let Some(light) = client.light("Kitchen").await? {
///         let msg = Message::new(Payload::SetPower { level: 65535 }).with_target(light.id());
///         client.request(msg).await?;
///     }
///
///     client.destroy().await;
///     Ok(())
/// }
/// ```
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    local_addr: SocketAddr,
    source: Source,
    task: Option<JoinHandle<()>>,
}

impl Client {
    /// Validate `options`, bind the socket and start the client.
    ///
    /// Configuration errors are returned before anything is bound. Unless
    /// `startDiscovery` is `false`, the first discovery cycle runs right away.
    pub async fn init(options: ClientOptions) -> Result<Self> {
        let config = options.validate()?;

        let socket = UdpSocket::bind(&format!("{}:{}", config.address, config.port))
            .await
            .map_err(|e| Error::socket("bind", e))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::socket("set_broadcast", e))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| Error::socket("local_addr", e))?;

        let source = config.source;
        let start_discovery = config.start_discovery;
        let now = Instant::now();
        let mut state = ClientState::new(config, now);
        if start_discovery {
            state.start_discovery(now);
        }

        debug!("client {source} listening on {local_addr}");

        let (commands, receiver) = mpsc::unbounded();
        let task = runtime::spawn(event_loop(socket, state, receiver));

        Ok(Client {
            commands,
            local_addr,
            source,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The source id stamped on every outgoing packet.
    pub fn source(&self) -> Source {
        self.source
    }

    /// Send a message without waiting for a reply. Returns its sequence.
    pub async fn send(&self, message: Message) -> Result<u8> {
        self.submit(message, None).await
    }

    /// Send a message and call `completion` exactly once with the reply, or
    /// with [`Error::Timeout`] when retries run out.
    pub async fn send_with<F>(&self, message: Message, completion: F) -> Result<u8>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        self.submit(message, Some(Box::new(completion))).await
    }

    /// Send a message and wait for its reply.
    pub async fn request(&self, message: Message) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.send_with(message, move |result| {
            let _ = tx.send(result);
        })
        .await?;
        rx.await.map_err(|_| Error::ClientClosed)?
    }

    /// Register a handler for every received message of type `kind`.
    ///
    /// With a `sequence` the handler only accepts a reply to this client with
    /// that sequence, fires once and then is removed. If nothing matches
    /// within the handler timeout it is called once with [`Error::Timeout`].
    pub fn add_message_handler<F>(
        &self,
        kind: MessageType,
        sequence: Option<u8>,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(Result<Response>) + Send + 'static,
    {
        self.command(Command::AddHandler {
            kind,
            sequence,
            callback: Box::new(callback),
        })
    }

    /// Find a light by id, address or label.
    pub async fn light(&self, selector: &str) -> Result<Option<Device>> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Light {
            selector: selector.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| Error::ClientClosed)
    }

    /// List known lights. `filter` is `""`, `"on"` or `"off"`.
    pub async fn lights(&self, filter: &str) -> Result<Vec<Device>> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Lights {
            filter: filter.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| Error::ClientClosed)?
    }

    pub async fn discovery_state(&self) -> Result<DiscoveryState> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::DiscoveryState(reply))?;
        rx.await.map_err(|_| Error::ClientClosed)
    }

    pub fn start_discovery(&self) -> Result<()> {
        self.command(Command::StartDiscovery)
    }

    pub fn stop_discovery(&self) -> Result<()> {
        self.command(Command::StopDiscovery)
    }

    /// Toggle logging of every sent and received packet.
    pub fn set_debug(&self, debug: bool) -> Result<()> {
        self.command(Command::SetDebug(debug))
    }

    /// Receive every [`ClientEvent`] published from now on.
    pub fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<ClientEvent>> {
        let (tx, rx) = mpsc::unbounded();
        self.command(Command::Subscribe(tx))?;
        Ok(rx)
    }

    /// Stop discovery, cancel every queued packet and close the socket.
    ///
    /// Completions passed to [`Client::send_with`] that are still pending, and
    /// sequence-bound handlers that have not fired, are dropped without being
    /// called. [`Client::request`] reports this as [`Error::ClientClosed`].
    ///
    /// Calling it again does nothing.
    pub async fn destroy(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        let (ack, done) = oneshot::channel();
        if self.commands.unbounded_send(Command::Destroy(ack)).is_ok() {
            let _ = done.await;
        }
        task.await;
        debug!("client {} destroyed", self.source);
    }

    async fn submit(&self, message: Message, completion: Option<Completion>) -> Result<u8> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            message,
            completion,
            reply,
        })?;
        rx.await.map_err(|_| Error::ClientClosed)?
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .unbounded_send(command)
            .map_err(|_| Error::ClientClosed)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.task.is_some() {
            let (ack, _) = oneshot::channel();
            let _ = self.commands.unbounded_send(Command::Destroy(ack));
        }
    }
}

enum Step {
    Received(std::io::Result<(usize, SocketAddr)>),
    Command(Option<Command>),
    Timer,
}

async fn event_loop(
    socket: UdpSocket,
    mut state: ClientState,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
    let mut subscribers: Vec<mpsc::UnboundedSender<ClientEvent>> = Vec::new();

    // run the first discovery tick before waiting on anything
    state.handle_timers(Instant::now());

    loop {
        flush(&socket, &mut state, &mut subscribers).await;

        let wait = state
            .next_deadline()
            .map_or(IDLE_WAIT, |deadline| {
                deadline.saturating_duration_since(Instant::now())
            });

        let step = {
            let recv = socket.recv_from(&mut buffer).fuse();
            let timer = runtime::sleep(wait).fuse();
            futures::pin_mut!(recv, timer);

            futures::select! {
                received = recv => Step::Received(received),
                command = commands.next() => Step::Command(command),
                _ = timer => Step::Timer,
            }
        };

        let now = Instant::now();
        match step {
            Step::Received(Ok((size, peer))) => state.handle_datagram(&buffer[..size], peer, now),
            Step::Received(Err(e)) => warn!("failed to receive datagram: {e}"),
            Step::Command(Some(command)) => {
                if !apply(&mut state, command, &mut subscribers, now) {
                    break;
                }
            }
            Step::Command(None) => {
                state.destroy();
                break;
            }
            Step::Timer => {}
        }

        state.handle_timers(Instant::now());
    }
}

/// Run one command against the state. Returns `false` once the client is
/// destroyed.
fn apply(
    state: &mut ClientState,
    command: Command,
    subscribers: &mut Vec<mpsc::UnboundedSender<ClientEvent>>,
    now: Instant,
) -> bool {
    match command {
        Command::Send {
            message,
            completion,
            reply,
        } => {
            let _ = reply.send(state.send(message, completion, now));
        }
        Command::AddHandler {
            kind,
            sequence,
            callback,
        } => state.add_handler(kind, sequence, callback, now),
        Command::Light { selector, reply } => {
            let _ = reply.send(state.light(&selector));
        }
        Command::Lights { filter, reply } => {
            let _ = reply.send(state.lights(&filter));
        }
        Command::DiscoveryState(reply) => {
            let _ = reply.send(state.discovery_state());
        }
        Command::StartDiscovery => state.start_discovery(now),
        Command::StopDiscovery => state.stop_discovery(),
        Command::SetDebug(debug) => state.set_debug(debug),
        Command::Subscribe(subscriber) => subscribers.push(subscriber),
        Command::Destroy(ack) => {
            state.destroy();
            let _ = ack.send(());
            return false;
        }
    }
    true
}

/// Write queued datagrams to the socket and publish pending events.
async fn flush(
    socket: &UdpSocket,
    state: &mut ClientState,
    subscribers: &mut Vec<mpsc::UnboundedSender<ClientEvent>>,
) {
    let debug = state.debug();
    for datagram in state.take_outbox() {
        if debug {
            debug!("send {} bytes to {}", datagram.data.len(), datagram.addr);
        }
        if let Err(e) = socket
            .send_to(&datagram.data, SocketAddr::V4(datagram.addr))
            .await
        {
            warn!("failed to send datagram to {}: {e}", datagram.addr);
        }
    }

    let events = state.take_events();
    if events.is_empty() {
        return;
    }
    subscribers.retain(|subscriber| !subscriber.is_closed());
    for event in events {
        for subscriber in subscribers.iter() {
            let _ = subscriber.unbounded_send(event.clone());
        }
    }
}
