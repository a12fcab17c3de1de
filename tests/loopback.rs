//! Drives a client against a fake device on the loopback interface.

use std::time::Duration;

use futures::StreamExt;
use lifx_lan_client::{
    Client, ClientEvent, ClientOptions, DeviceStatus, DiscoveryState, Error, Message,
    MessageType, Payload, decode, encode,
};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const DEVICE_ID: &str = "d073d5006d72";
const WAIT: Duration = Duration::from_secs(5);

/// Answers discovery, label and power queries. Everything else goes unanswered.
async fn fake_device(socket: UdpSocket) {
    let port = socket.local_addr().unwrap().port();
    let mut buf = [0u8; 1024];

    loop {
        let Ok((size, peer)) = socket.recv_from(&mut buf).await else {
            return;
        };
        let Ok(request) = decode(&buf[..size]) else {
            continue;
        };

        let payload = match request.payload {
            Payload::GetService => Payload::StateService {
                service: Payload::SERVICE_UDP,
                port: u32::from(port),
            },
            Payload::GetLabel => Payload::StateLabel {
                label: "Lamp".into(),
            },
            Payload::GetPower => Payload::StatePower { level: 65535 },
            _ => continue,
        };

        let mut reply = Message::new(payload).with_target(DEVICE_ID);
        reply.header.source = request.source();
        reply.header.sequence = request.sequence();
        socket
            .send_to(&encode(&reply).unwrap(), peer)
            .await
            .unwrap();
    }
}

async fn start_device() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(fake_device(socket));
    port
}

fn options(device_port: u16) -> ClientOptions {
    ClientOptions::new()
        .address("127.0.0.1")
        .broadcast("127.0.0.1")
        .send_port(i64::from(device_port))
        .lights(["127.0.0.1"])
        .stop_after_discovery(true)
        .start_discovery(false)
        .resend_packet_delay(20)
}

#[tokio::test]
async fn test_discovery_and_requests() {
    let device_port = start_device().await;
    let mut client = Client::init(options(device_port)).await.unwrap();
    assert!(client.local_addr().ip().is_loopback());

    let mut events = client.subscribe().unwrap();
    client.start_discovery().unwrap();

    let first = timeout(WAIT, events.next()).await.unwrap().unwrap();
    let ClientEvent::LightNew(light) = first else {
        panic!("expected a new light, got {first:?}");
    };
    assert_eq!(light.id(), DEVICE_ID);
    assert_eq!(light.port(), device_port);
    assert_eq!(light.status(), DeviceStatus::On);

    let second = timeout(WAIT, events.next()).await.unwrap().unwrap();
    assert_eq!(second, ClientEvent::DiscoveryCompleted);
    assert_eq!(
        client.discovery_state().await.unwrap(),
        DiscoveryState::Stopped
    );

    // the label request follows discovery
    let labelled = timeout(WAIT, async {
        loop {
            if let Some(light) = client.light("Lamp").await.unwrap() {
                return light;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(labelled.id(), DEVICE_ID);

    let reply = timeout(
        WAIT,
        client.request(Message::new(Payload::GetPower).with_target(DEVICE_ID)),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(reply.message.payload, Payload::StatePower { level: 65535 });
    assert_eq!(reply.message.source(), client.source());
    assert!(reply.remote.address.is_loopback());

    assert_eq!(client.lights("on").await.unwrap().len(), 1);
    assert!(client.lights("off").await.unwrap().is_empty());

    client.destroy().await;
    assert!(matches!(client.lights("").await, Err(Error::ClientClosed)));
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let device_port = start_device().await;
    let mut client = Client::init(options(device_port)).await.unwrap();
    let mut events = client.subscribe().unwrap();
    client.start_discovery().unwrap();

    // wait for the device to be known so the request goes to its queue
    loop {
        let event = timeout(WAIT, events.next()).await.unwrap().unwrap();
        if event == ClientEvent::DiscoveryCompleted {
            break;
        }
    }

    let err = timeout(
        WAIT,
        client.request(
            Message::new(Payload::SetLabel {
                label: "Unheard".into(),
            })
            .with_target(DEVICE_ID),
        ),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert!(matches!(
        err,
        Error::Timeout {
            kind: MessageType::Acknowledgement,
            ..
        }
    ));
    client.destroy().await;
}

#[tokio::test]
async fn test_message_handlers_see_replies() {
    let device_port = start_device().await;
    let mut client = Client::init(options(device_port)).await.unwrap();

    let (tx, mut rx) = futures::channel::mpsc::unbounded();
    client
        .add_message_handler(MessageType::StateService, None, move |result| {
            let _ = tx.unbounded_send(result.map(|r| r.remote.port));
        })
        .unwrap();
    client.start_discovery().unwrap();

    let port = timeout(WAIT, rx.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(port, device_port);
    client.destroy().await;
}
