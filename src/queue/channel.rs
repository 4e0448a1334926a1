//! Client side of the broker protocol.
//!
//! A `QueueChannel` owns one WebSocket connection. A reader task splits the
//! incoming frames in two: deliveries go to the consumer they are addressed
//! to, everything else goes to the reply channel read by the request
//! methods. Requests are issued one at a time (`&mut self`), so the next
//! reply always belongs to the last request.
//!
//! The reader never waits on a consumer. Each consumer has a forwarding
//! task that moves deliveries from an unbounded inbox into the bounded
//! channel the application reads, so a slow consumer stalls only itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::{QueueOptions, QueueStats};
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ConsumerMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>>;

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub queue: String,
    pub body: String,
    pub redelivered: bool,
    pub timestamp: i64,
}

/// Receiving end of a consumer. Yields deliveries in the order the broker
/// sent them and ends when the consumer is cancelled or the connection closes.
#[derive(Debug)]
pub struct Consumer {
    tag: String,
    deliveries: mpsc::Receiver<Delivery>,
}

impl Consumer {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub async fn next(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }
}

pub struct QueueChannel {
    sink: SplitSink<WsStream, WsMessage>,
    replies: mpsc::UnboundedReceiver<ServerFrame>,
    consumers: ConsumerMap,
    reader: JoinHandle<()>,
    prefetch: usize,
}

fn lock(
    consumers: &ConsumerMap,
) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<Delivery>>> {
    consumers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts the task feeding one consumer. It ends once the inbox is closed
/// and drained, or when the consumer is dropped.
fn spawn_forwarder(capacity: usize) -> (mpsc::UnboundedSender<Delivery>, mpsc::Receiver<Delivery>) {
    let (inbox, mut pending) = mpsc::unbounded_channel::<Delivery>();
    let (tx, deliveries) = mpsc::channel(capacity);
    tokio::spawn(async move {
        while let Some(delivery) = pending.recv().await {
            if tx.send(delivery).await.is_err() {
                break;
            }
        }
    });
    (inbox, deliveries)
}

impl QueueChannel {
    /// Connects to the broker at `url` (`ws://host:port`).
    ///
    /// `prefetch` bounds how many deliveries each consumer buffers before
    /// the reader task waits for the application.
    pub async fn connect(url: &str, prefetch: usize) -> Result<Self> {
        let (ws_stream, _response) = connect_async(url).await?;
        let (sink, stream) = ws_stream.split();
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let consumers: ConsumerMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(stream, reply_tx, consumers.clone()));

        info!(url, "Connected to queue broker");
        Ok(Self {
            sink,
            replies,
            consumers,
            reader,
            prefetch: prefetch.max(1),
        })
    }

    async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.sink.send(WsMessage::text(text)).await?;
        Ok(())
    }

    async fn reply(&mut self) -> Result<ServerFrame> {
        match self.replies.recv().await {
            Some(ServerFrame::Error { message }) => Err(Error::Protocol(message)),
            Some(frame) => Ok(frame),
            None => Err(Error::Transport("connection closed by broker".to_string())),
        }
    }

    pub async fn declare(&mut self, queue: &str, options: QueueOptions) -> Result<QueueStats> {
        self.send(&ClientFrame::Declare {
            queue: queue.to_string(),
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
        })
        .await?;

        match self.reply().await? {
            ServerFrame::DeclareOk {
                queue,
                message_count,
                consumer_count,
            } => Ok(QueueStats {
                queue,
                message_count,
                consumer_count,
            }),
            other => Err(unexpected("declare_ok", &other)),
        }
    }

    /// Publishes `body` to `queue`. The broker sends no confirmation; the
    /// call returns once the frame is written.
    pub async fn publish(&mut self, queue: &str, body: &str) -> Result<()> {
        self.send(&ClientFrame::Publish {
            queue: queue.to_string(),
            body: body.to_string(),
        })
        .await
    }

    pub async fn consume(&mut self, queue: &str, auto_ack: bool) -> Result<Consumer> {
        let tag = format!("ctag-{}", Uuid::new_v4());
        let (inbox, deliveries) = spawn_forwarder(self.prefetch);
        // Registered before asking so the first delivery has somewhere to go.
        lock(&self.consumers).insert(tag.clone(), inbox);

        let result = self.request_consume(queue, &tag, auto_ack).await;

        match result {
            Ok(()) => {
                info!(queue, consumer_tag = %tag, "Consuming");
                Ok(Consumer { tag, deliveries })
            }
            Err(e) => {
                lock(&self.consumers).remove(&tag);
                Err(e)
            }
        }
    }

    async fn request_consume(&mut self, queue: &str, tag: &str, auto_ack: bool) -> Result<()> {
        self.send(&ClientFrame::Consume {
            queue: queue.to_string(),
            consumer_tag: tag.to_string(),
            auto_ack,
        })
        .await?;
        match self.reply().await? {
            ServerFrame::ConsumeOk { consumer_tag } if consumer_tag == tag => Ok(()),
            other => Err(unexpected("consume_ok", &other)),
        }
    }

    /// Stops a consumer; its stream ends after the deliveries already buffered.
    pub async fn cancel(&mut self, consumer: &Consumer) -> Result<()> {
        self.send(&ClientFrame::Cancel {
            consumer_tag: consumer.tag.clone(),
        })
        .await?;
        match self.reply().await? {
            ServerFrame::CancelOk { .. } => Ok(()),
            other => Err(unexpected("cancel_ok", &other)),
        }
    }

    /// Acknowledges a delivery taken with `auto_ack = false`.
    pub async fn ack(&mut self, delivery_tag: u64) -> Result<()> {
        self.send(&ClientFrame::Ack { delivery_tag }).await
    }

    /// Closes the connection and waits for the reader task to finish.
    ///
    /// Consumers still yield what was already delivered, then end.
    pub async fn close(mut self) -> Result<()> {
        lock(&self.consumers).clear();
        self.sink.close().await?;
        let _ = (&mut self.reader).await;
        Ok(())
    }
}

impl Drop for QueueChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn unexpected(expected: &str, got: &ServerFrame) -> Error {
    Error::Protocol(format!("expected {expected}, got {got:?}"))
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    replies: mpsc::UnboundedSender<ServerFrame>,
    consumers: ConsumerMap,
) {
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Broker connection error");
                break;
            }
        };

        let frame = match serde_json::from_str::<ServerFrame>(text.as_str()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring undecodable broker frame");
                continue;
            }
        };

        match frame {
            ServerFrame::Deliver {
                consumer_tag,
                delivery_tag,
                queue,
                body,
                redelivered,
                timestamp,
            } => {
                let delivery = Delivery {
                    consumer_tag: consumer_tag.clone(),
                    delivery_tag,
                    queue,
                    body,
                    redelivered,
                    timestamp,
                };
                let mut routes = lock(&consumers);
                let sent = routes.get(&consumer_tag).map(|inbox| inbox.send(delivery));
                match sent {
                    None => warn!(%consumer_tag, delivery_tag, "Delivery for unknown consumer"),
                    Some(Ok(())) => {}
                    Some(Err(_)) => {
                        debug!(%consumer_tag, "Consumer dropped, discarding delivery");
                        routes.remove(&consumer_tag);
                    }
                }
            }
            ServerFrame::CancelOk { consumer_tag } => {
                lock(&consumers).remove(&consumer_tag);
                let _ = replies.send(ServerFrame::CancelOk { consumer_tag });
            }
            other => {
                let _ = replies.send(other);
            }
        }
    }

    // Ends every consumer stream.
    lock(&consumers).clear();
    debug!("Broker read loop finished");
}
