use std::collections::BTreeMap;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::error::SendError;
use uuid::Uuid;

use crate::broker::message::Message;
use crate::broker::queue::ClientId;
use crate::transport::message::ServerFrame;

/// A delivery handed to a manual-ack consumer and not yet acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Unacked {
    pub consumer_tag: String,
    pub message: Message,
}

/// The broker's view of one connected queue client.
///
/// `sender` feeds the connection's write loop; delivery tags are numbered
/// per connection starting at 1.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    pub sender: UnboundedSender<ServerFrame>,
    next_delivery_tag: u64,
    unacked: BTreeMap<u64, Unacked>,
}

impl Client {
    pub fn new(sender: UnboundedSender<ServerFrame>) -> Self {
        Self {
            id: format!("client-{}", Uuid::new_v4()),
            sender,
            next_delivery_tag: 1,
            unacked: BTreeMap::new(),
        }
    }

    pub fn send(&self, frame: ServerFrame) -> Result<(), SendError<ServerFrame>> {
        self.sender.send(frame)
    }

    pub fn next_delivery_tag(&mut self) -> u64 {
        let tag = self.next_delivery_tag;
        self.next_delivery_tag += 1;
        tag
    }

    pub fn track_unacked(&mut self, delivery_tag: u64, unacked: Unacked) {
        self.unacked.insert(delivery_tag, unacked);
    }

    pub fn take_unacked(&mut self, delivery_tag: u64) -> Option<Unacked> {
        self.unacked.remove(&delivery_tag)
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    /// Removes outstanding deliveries, oldest first. `None` drains every
    /// consumer on this connection.
    pub fn drain_unacked(&mut self, consumer_tag: Option<&str>) -> Vec<Unacked> {
        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, u)| consumer_tag.is_none_or(|tag| u.consumer_tag == tag))
            .map(|(tag, _)| *tag)
            .collect();

        tags.into_iter()
            .filter_map(|tag| self.unacked.remove(&tag))
            .collect()
    }
}
