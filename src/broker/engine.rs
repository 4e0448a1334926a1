//! Broker engine
//!
//! In-memory queue broker responsible for:
//! - declaring named queues and enforcing their exclusive/auto-delete flags
//! - buffering published messages until a consumer is available
//! - delivering round-robin to consumers, tracking manual acknowledgements
//! - requeueing unacknowledged deliveries when a consumer goes away
//!
//! The API is synchronous and meant to sit behind `Arc<Mutex<Broker>>` in
//! the transport layer. Frames are pushed onto unbounded per-client
//! channels, so no call here blocks on network I/O.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::message::Message;
use crate::broker::queue::{ClientId, Consumer, Queue, QueueOptions};
use crate::client::{Client, Unacked};
use crate::transport::message::ServerFrame;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("no queue '{0}'")]
    NotFound(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("queue '{0}' is exclusive to another connection")]
    ResourceLocked(String),
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),
    #[error("unknown consumer '{0}'")]
    UnknownConsumer(String),
    #[error("consumer tag '{0}' already in use")]
    ConsumerTagInUse(String),
    #[error("unknown client '{0}'")]
    UnknownClient(String),
}

/// Queue name and counters reported back on declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue: String,
    pub message_count: usize,
    pub consumer_count: usize,
}

#[derive(Debug, Default)]
pub struct Broker {
    pub queues: HashMap<String, Queue>,
    pub clients: HashMap<ClientId, Client>,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            queues: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    pub fn register_client(&mut self, client: Client) {
        debug!(client_id = %client.id, "Registered client");
        self.clients.insert(client.id.clone(), client);
    }

    /// Declares a queue, creating it on first use.
    ///
    /// Re-declaring is idempotent when the options match. An empty name asks
    /// the broker to generate one.
    pub fn declare(
        &mut self,
        client_id: &ClientId,
        name: &str,
        options: QueueOptions,
    ) -> Result<QueueStats, BrokerError> {
        if !self.clients.contains_key(client_id) {
            return Err(BrokerError::UnknownClient(client_id.clone()));
        }
        if options.durable {
            return Err(BrokerError::PreconditionFailed(
                "durable queues are not supported".to_string(),
            ));
        }

        let name = if name.is_empty() {
            format!("amq.gen-{}", Uuid::new_v4())
        } else {
            name.to_string()
        };

        if let Some(existing) = self.queues.get(&name) {
            if !existing.accessible_by(client_id) {
                return Err(BrokerError::ResourceLocked(name));
            }
            if existing.options != options {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue '{name}' already declared with different options"
                )));
            }
        } else {
            info!(queue = %name, ?options, "Declared queue");
            self.queues
                .insert(name.clone(), Queue::new(&name, options, client_id));
        }

        let queue = &self.queues[&name];
        Ok(QueueStats {
            queue: name,
            message_count: queue.backlog.len(),
            consumer_count: queue.consumers.len(),
        })
    }

    /// Appends `body` to the named queue and hands out what can be delivered.
    ///
    /// Returns `false` when the queue does not exist; the message is dropped.
    pub fn publish(&mut self, queue: &str, body: String) -> bool {
        let Some(q) = self.queues.get_mut(queue) else {
            warn!(queue, "Queue not found, message dropped");
            return false;
        };
        q.backlog.push_back(Message::new(queue, body));
        self.dispatch(queue);
        true
    }

    /// Attaches a consumer. Call [`Broker::dispatch`] once the client has
    /// been told the consumer exists.
    pub fn consume(
        &mut self,
        client_id: &ClientId,
        queue: &str,
        consumer_tag: &str,
        auto_ack: bool,
    ) -> Result<String, BrokerError> {
        if !self.clients.contains_key(client_id) {
            return Err(BrokerError::UnknownClient(client_id.clone()));
        }

        let tag = if consumer_tag.is_empty() {
            format!("ctag-{}", Uuid::new_v4())
        } else {
            consumer_tag.to_string()
        };
        if self.queues.values().any(|q| q.has_consumer(&tag)) {
            return Err(BrokerError::ConsumerTagInUse(tag));
        }

        let q = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::NotFound(queue.to_string()))?;
        if !q.accessible_by(client_id) {
            return Err(BrokerError::ResourceLocked(queue.to_string()));
        }

        q.add_consumer(Consumer {
            tag: tag.clone(),
            client_id: client_id.clone(),
            auto_ack,
        });
        info!(queue, consumer_tag = %tag, auto_ack, "Consumer attached");
        Ok(tag)
    }

    /// Detaches a consumer and requeues whatever it left unacknowledged.
    pub fn cancel(&mut self, client_id: &ClientId, consumer_tag: &str) -> Result<(), BrokerError> {
        let queue_name = self
            .queues
            .values_mut()
            .find(|q| {
                q.consumers
                    .iter()
                    .any(|c| c.tag == consumer_tag && &c.client_id == client_id)
            })
            .and_then(|q| q.remove_consumer(consumer_tag).map(|_| q.name.clone()))
            .ok_or_else(|| BrokerError::UnknownConsumer(consumer_tag.to_string()))?;

        let unacked = self
            .clients
            .get_mut(client_id)
            .map(|c| c.drain_unacked(Some(consumer_tag)))
            .unwrap_or_default();
        self.requeue(unacked);
        self.remove_if_unused(&queue_name);
        self.dispatch(&queue_name);

        info!(queue = %queue_name, consumer_tag, "Consumer cancelled");
        Ok(())
    }

    pub fn ack(&mut self, client_id: &ClientId, delivery_tag: u64) -> Result<(), BrokerError> {
        let client = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| BrokerError::UnknownClient(client_id.clone()))?;
        client
            .take_unacked(delivery_tag)
            .map(|_| ())
            .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))
    }

    /// Delivers queued messages while the queue has both messages and consumers.
    pub fn dispatch(&mut self, queue_name: &str) {
        let Some(queue) = self.queues.get_mut(queue_name) else {
            return;
        };

        while let Some(message) = queue.backlog.pop_front() {
            let Some(consumer) = queue.next_consumer() else {
                queue.backlog.push_front(message);
                break;
            };
            let Some(client) = self.clients.get_mut(&consumer.client_id) else {
                warn!(consumer_tag = %consumer.tag, "Dropping consumer of vanished client");
                queue.remove_consumer(&consumer.tag);
                queue.backlog.push_front(message);
                continue;
            };

            let delivery_tag = client.next_delivery_tag();
            let frame = ServerFrame::Deliver {
                consumer_tag: consumer.tag.clone(),
                delivery_tag,
                queue: queue.name.clone(),
                body: message.body.clone(),
                redelivered: message.redelivered,
                timestamp: message.timestamp,
            };

            if let Err(e) = client.send(frame) {
                warn!(client_id = %client.id, error = %e, "Failed to deliver, requeueing");
                queue.backlog.push_front(message);
                break;
            }

            debug!(
                queue = %queue.name,
                message_id = %message.message_id,
                consumer_tag = %consumer.tag,
                delivery_tag,
                "Delivered message"
            );

            if !consumer.auto_ack {
                client.track_unacked(
                    delivery_tag,
                    Unacked {
                        consumer_tag: consumer.tag,
                        message,
                    },
                );
            }
        }
    }

    /// Removes a disconnected client: detaches its consumers, requeues its
    /// unacknowledged deliveries and deletes the queues it owned exclusively.
    pub fn cleanup_client(&mut self, client_id: &ClientId) {
        let Some(mut client) = self.clients.remove(client_id) else {
            return;
        };

        let mut detached = Vec::new();
        for (name, queue) in self.queues.iter_mut() {
            if queue.remove_consumers_of(client_id) > 0 {
                detached.push(name.clone());
            }
        }

        let requeued = self.requeue(client.drain_unacked(None));

        self.queues.retain(|name, queue| {
            let owned = queue.owner.as_ref() == Some(client_id);
            if owned {
                info!(queue = %name, "Deleted exclusive queue of closed connection");
            }
            !owned
        });

        for name in &detached {
            self.remove_if_unused(name);
        }
        for name in detached.iter().chain(requeued.iter()) {
            self.dispatch(name);
        }

        info!(client_id = %client_id, "Cleaned up client");
    }

    /// Puts deliveries back at the head of their queues, keeping their
    /// original order. Returns the names of the queues touched.
    fn requeue(&mut self, unacked: Vec<Unacked>) -> Vec<String> {
        let mut touched = Vec::new();
        for Unacked { mut message, .. } in unacked.into_iter().rev() {
            let Some(queue) = self.queues.get_mut(&message.queue) else {
                continue;
            };
            message.redelivered = true;
            if !touched.contains(&message.queue) {
                touched.push(message.queue.clone());
            }
            queue.backlog.push_front(message);
        }
        touched
    }

    fn remove_if_unused(&mut self, queue_name: &str) {
        if self.queues.get(queue_name).is_some_and(Queue::is_unused) {
            self.queues.remove(queue_name);
            info!(queue = queue_name, "Auto-deleted queue");
        }
    }
}
