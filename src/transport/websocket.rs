//! WebSocket transport
//!
//! Serves the broker to queue clients:
//! - accepts TCP/WebSocket connections, one task per connection
//! - registers a `Client` for each connection with the `Broker`
//! - decodes JSON `ClientFrame`s, applies them to the broker and answers
//!   with `ServerFrame`s
//! - removes the client (and requeues its unacked deliveries) on disconnect
//!
//! The broker lock is never held across an `.await`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::broker::{Broker, ClientId, QueueOptions};
use crate::client::Client;
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::Result;

/// Binds `addr` and serves the broker until the listener fails.
///
/// A bind failure is returned to the caller; it is fatal to the broker
/// process only.
pub async fn start_broker_server(addr: &str, broker: Arc<Mutex<Broker>>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Queue broker listening on ws://{}", listener.local_addr()?);
    serve(listener, broker).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, broker: Arc<Mutex<Broker>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "Accepted connection");
                tokio::spawn(handle_connection(stream, broker.clone()));
            }
            Err(e) => {
                // Per-connection accept errors (e.g. fd exhaustion) must not stop the broker.
                warn!(error = %e, "Failed to accept connection");
            }
        }
    }
}

fn lock(broker: &Mutex<Broker>) -> MutexGuard<'_, Broker> {
    // A panic while holding the lock leaves the maps consistent enough to keep serving.
    broker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn handle_connection(stream: TcpStream, broker: Arc<Mutex<Broker>>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake error: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let client = Client::new(tx);
    let client_id = client.id.clone();
    lock(&broker).register_client(client);
    info!(%client_id, "Client connected");

    let writer = {
        let client_id = client_id.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(WsMessage::text(text)).await {
                    warn!("Failed to send frame to {client_id}: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
            debug!("Send loop closed for {client_id}");
        })
    };

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%client_id, error = %e, "Connection error");
                break;
            }
        };
        match msg {
            WsMessage::Text(text) => handle_frame(&broker, &client_id, text.as_str()),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // Dropping the client drops the last frame sender, which ends the writer.
    lock(&broker).cleanup_client(&client_id);
    let _ = writer.await;
    info!(%client_id, "Client disconnected");
}

/// Applies one client frame to the broker and queues the reply, if any.
pub fn handle_frame(broker: &Mutex<Broker>, client_id: &ClientId, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(
                "Invalid client frame from {client_id}: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
            reply(
                broker,
                client_id,
                ServerFrame::Error {
                    message: format!("invalid frame: {err}"),
                },
            );
            return;
        }
    };

    let mut broker_lock = lock(broker);
    let response = match frame {
        ClientFrame::Declare {
            queue,
            durable,
            exclusive,
            auto_delete,
        } => {
            let options = QueueOptions {
                durable,
                exclusive,
                auto_delete,
            };
            broker_lock
                .declare(client_id, &queue, options)
                .map(|stats| {
                    Some(ServerFrame::DeclareOk {
                        queue: stats.queue,
                        message_count: stats.message_count,
                        consumer_count: stats.consumer_count,
                    })
                })
        }
        ClientFrame::Publish { queue, body } => {
            debug!("{client_id} published to {queue}");
            broker_lock.publish(&queue, body);
            Ok(None)
        }
        ClientFrame::Consume {
            queue,
            consumer_tag,
            auto_ack,
        } => match broker_lock.consume(client_id, &queue, &consumer_tag, auto_ack) {
            Ok(consumer_tag) => {
                send_to(&broker_lock, client_id, ServerFrame::ConsumeOk { consumer_tag });
                broker_lock.dispatch(&queue);
                Ok(None)
            }
            Err(e) => Err(e),
        },
        ClientFrame::Cancel { consumer_tag } => broker_lock
            .cancel(client_id, &consumer_tag)
            .map(|()| Some(ServerFrame::CancelOk { consumer_tag })),
        ClientFrame::Ack { delivery_tag } => broker_lock.ack(client_id, delivery_tag).map(|()| None),
    };

    match response {
        Ok(Some(frame)) => send_to(&broker_lock, client_id, frame),
        Ok(None) => {}
        Err(e) => {
            warn!(%client_id, error = %e, "Rejected client frame");
            send_to(
                &broker_lock,
                client_id,
                ServerFrame::Error {
                    message: e.to_string(),
                },
            );
        }
    }
}

fn reply(broker: &Mutex<Broker>, client_id: &ClientId, frame: ServerFrame) {
    send_to(&lock(broker), client_id, frame);
}

fn send_to(broker: &Broker, client_id: &ClientId, frame: ServerFrame) {
    if let Some(client) = broker.clients.get(client_id) {
        if client.send(frame).is_err() {
            debug!("Dropped reply to closing client {client_id}");
        }
    }
}
