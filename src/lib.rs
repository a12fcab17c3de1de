//! # lifx_lan_client
//!
//! An async Rust client for LIFX lights on the local network.
//!
//! The client discovers devices by broadcasting (or probing a fixed list of
//! addresses), tracks whether they are still answering, and delivers packets
//! over UDP with per-device resend queues and sequence-matched replies.
//!
//! ## Quick Start
//!
//! ```ignore
//! use futures::StreamExt;
//! use lifx_lan_client::{Client, ClientEvent, ClientOptions, Message, Payload};
//!
//! async fn run() -> Result<(), lifx_lan_client::Error> {
//!     let mut client = Client::init(ClientOptions::new()).await?;
//!     let mut events = client.subscribe()?;
//!
//!     while let Some(event) = events.next().await {
//!         if let ClientEvent::LightNew(light) = event {
//!             let msg = Message::new(Payload::GetPower).with_target(light.id());
//!             let reply = client.request(msg).await?;
//!             println!("{} at {}: {:?}", light.id(), light.address(), reply.message.payload);
//!         }
//!     }
//!
//!     client.destroy().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Discovery**: Periodic broadcast or targeted probing, with early stop
//!   once every configured light answered ([`ClientOptions::stop_after_discovery`])
//! - **Liveness**: Devices missing several discovery cycles are marked off and
//!   come back on their next answer ([`ClientEvent`])
//! - **Reliable delivery**: Requests are resent at a fixed interval until a
//!   reply or acknowledgement arrives ([`Client::request`])
//! - **Handlers**: Permanent or sequence-bound handlers for any
//!   [`MessageType`] ([`Client::add_message_handler`])
//!
//! ## Communication
//!
//! Devices listen on UDP port 56700. Packets use the LIFX LAN header format;
//! see [`encode`] and [`decode`].
//!
//! ## Runtime Selection
//!
//! Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! lifx-lan-client = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! lifx-lan-client = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! lifx-lan-client = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod client;
mod config;
mod device;
mod discovery;
mod errors;
mod handlers;
mod packet;
mod queue;
mod registry;
pub mod runtime;
mod state;
mod types;

// Re-export public API
pub use client::Client;
pub use config::{
    ClientConfig, ClientOptions, DEFAULT_BROADCAST, DEFAULT_DISCOVERY_INTERVAL,
    DEFAULT_LIGHT_OFFLINE_TOLERANCE, DEFAULT_MESSAGE_HANDLER_TIMEOUT, DEFAULT_PORT,
    DEFAULT_RESEND_MAX_TIMES, DEFAULT_RESEND_PACKET_DELAY,
};
pub use device::{Device, DeviceStatus};
pub use discovery::DiscoveryState;
pub use errors::Error;
pub use handlers::{HandlerCallback, RemoteInfo, Response, handler_matches};
pub use packet::{
    HEADER_SIZE, Header, LABEL_SIZE, Message, MessageType, PROTOCOL_NUMBER, Payload, decode,
    encode,
};
pub use queue::{Completion, Datagram, Destination};
pub use registry::{DeviceRegistry, Upsert};
pub use state::ClientEvent;
pub use types::{Hsbk, SequenceCounter, Source};
