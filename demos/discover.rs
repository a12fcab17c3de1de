//! Discover LIFX lights and print them as they appear.
//!
//! This example demonstrates:
//! - Broadcast or targeted discovery
//! - Subscribing to client events
//! - Requesting the power level of each new light
//!
//! Run with: cargo run --example discover -- --help

use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use lifx_lan_client::runtime;
use lifx_lan_client::{Client, ClientEvent, ClientOptions, Message, Payload};

#[derive(Parser)]
#[command(name = "lifx-discover")]
#[command(about = "List LIFX lights on the local network", long_about = None)]
struct Cli {
    /// Probe these addresses instead of broadcasting
    #[arg(short, long)]
    light: Vec<String>,

    /// Broadcast address used for discovery
    #[arg(short, long)]
    broadcast: Option<String>,

    /// Seconds to keep listening
    #[arg(short, long, default_value_t = 10)]
    duration: u64,

    /// Log every packet
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut options = ClientOptions::new()
        .debug(cli.debug)
        .start_discovery(false);
    if let Some(broadcast) = &cli.broadcast {
        options = options.broadcast(broadcast);
    }
    if !cli.light.is_empty() {
        options = options.lights(cli.light.clone()).stop_after_discovery(true);
    }

    let mut client = Client::init(options).await?;
    let mut events = client.subscribe()?;
    client.start_discovery()?;
    println!("Listening on {} for {}s...", client.local_addr(), cli.duration);

    let listen = async {
        while let Some(event) = events.next().await {
            match event {
                ClientEvent::LightNew(light) => {
                    let msg = Message::new(Payload::GetPower).with_target(light.id());
                    match client.request(msg).await {
                        Ok(reply) => println!(
                            "  + {} at {}:{} ({:?})",
                            light.id(),
                            light.address(),
                            light.port(),
                            reply.message.payload
                        ),
                        Err(e) => eprintln!(
                            "  + {} at {} (no power reply: {e})",
                            light.id(),
                            light.address()
                        ),
                    }
                }
                ClientEvent::LightOnline(light) => println!("  ^ {} is back", light.id()),
                ClientEvent::LightOffline(light) => println!("  - {} went away", light.id()),
                ClientEvent::DiscoveryCompleted => {
                    println!("All requested lights found.");
                    break;
                }
            }
        }
    };
    let _ = runtime::timeout(Duration::from_secs(cli.duration), listen).await;

    println!();
    for light in client.lights("").await? {
        let label = if light.label().is_empty() { "-" } else { light.label() };
        println!(
            "{:<14} {:<16} {:<4} {}",
            light.id(),
            light.address().to_string(),
            light.status().to_string(),
            label
        );
    }

    client.destroy().await;
    Ok(())
}
