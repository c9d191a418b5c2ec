//! Loopback example - drives a handler against an in-process fake broker.
//!
//! Run with: RUST_LOG=debug cargo run -p mqlink-client --example loopback
//!
//! This example demonstrates:
//! - Wiring a ChannelSender to a writer task
//! - Feeding inbound packets back through dispatch()
//! - Blocking on wait_disconnect() until the session ends

use std::sync::Arc;

use mqlink_client::{
    ChannelSender, ClientHandler, HandlerConfig, HandlerEvent, Packet, QoS, Suback, Unsuback,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (sender, mut outbound) = ChannelSender::new(16);
    let (handler, mut events) =
        ClientHandler::with_events(sender, HandlerConfig::new("loopback").keep_alive(5), 64);
    let handler = Arc::new(handler);

    // Fake broker: answers every request and closes the connection on DISCONNECT.
    let broker = Arc::clone(&handler);
    tokio::spawn(async move {
        while let Some(packet) = outbound.recv().await {
            match packet {
                Packet::Subscribe(subscribe) => {
                    let codes = subscribe
                        .topics
                        .iter()
                        .map(|(_, qos)| (*qos as u8).min(QoS::AtLeastOnce as u8))
                        .collect();
                    broker.dispatch(Packet::Suback(Suback::new(subscribe.packet_id, codes)));
                }
                Packet::Unsubscribe(unsubscribe) => {
                    broker.dispatch(Packet::Unsuback(Unsuback {
                        packet_id: unsubscribe.packet_id,
                    }));
                }
                Packet::Pingreq => broker.dispatch(Packet::Pingresp),
                Packet::Disconnect => {
                    broker.handle_connection_closed();
                    break;
                }
                other => log::debug!("Broker ignoring {}", other.packet_type()),
            }
        }
    });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("[EVENT] {:?}", event);
            if event == HandlerEvent::ConnectionClosed {
                break;
            }
        }
    });

    handler.start();

    let codes = handler
        .subscribe(
            &[("sensors/#", QoS::ExactlyOnce), ("commands/+", QoS::AtMostOnce)],
            1,
        )
        .await?;
    println!("Subscribed, return codes: {:?}", codes);

    let pong = handler.ping().await?;
    println!("Ping round trip: {:?}", pong.round_trip);

    handler.unsubscribe(&["commands/+"], 2).await?;
    println!("Unsubscribed from commands/+");

    handler.disconnect().await?;
    handler.wait_disconnect().await?;
    println!("Session ended");

    handler.stop();
    Ok(())
}
