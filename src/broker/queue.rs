use std::collections::VecDeque;

use crate::broker::message::Message;

pub type ClientId = String;

/// Flags fixed when a queue is first declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

/// A consumer attached to a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub tag: String,
    pub client_id: ClientId,
    pub auto_ack: bool,
}

/// A named FIFO of messages and the consumers taking from it.
///
/// Messages wait in `backlog` until a consumer is available; consumers are
/// served round-robin.
#[derive(Debug)]
pub struct Queue {
    pub name: String,
    pub options: QueueOptions,
    /// The declaring connection, for exclusive queues.
    pub owner: Option<ClientId>,
    pub consumers: VecDeque<Consumer>,
    pub backlog: VecDeque<Message>,
    had_consumer: bool,
}

impl Queue {
    pub fn new(name: &str, options: QueueOptions, declared_by: &ClientId) -> Self {
        Self {
            name: name.to_string(),
            options,
            owner: options.exclusive.then(|| declared_by.clone()),
            consumers: VecDeque::new(),
            backlog: VecDeque::new(),
            had_consumer: false,
        }
    }

    /// Whether `client_id` may use this queue.
    pub fn accessible_by(&self, client_id: &ClientId) -> bool {
        self.owner.as_ref().is_none_or(|owner| owner == client_id)
    }

    pub fn add_consumer(&mut self, consumer: Consumer) {
        self.had_consumer = true;
        self.consumers.push_back(consumer);
    }

    pub fn has_consumer(&self, tag: &str) -> bool {
        self.consumers.iter().any(|c| c.tag == tag)
    }

    pub fn remove_consumer(&mut self, tag: &str) -> Option<Consumer> {
        let idx = self.consumers.iter().position(|c| c.tag == tag)?;
        self.consumers.remove(idx)
    }

    /// Removes every consumer belonging to `client_id`, returning how many.
    pub fn remove_consumers_of(&mut self, client_id: &ClientId) -> usize {
        let before = self.consumers.len();
        self.consumers.retain(|c| &c.client_id != client_id);
        before - self.consumers.len()
    }

    /// Next consumer in round-robin order.
    pub fn next_consumer(&mut self) -> Option<Consumer> {
        let consumer = self.consumers.pop_front()?;
        self.consumers.push_back(consumer.clone());
        Some(consumer)
    }

    /// An auto-delete queue goes away once it has had a consumer and has none left.
    pub fn is_unused(&self) -> bool {
        self.options.auto_delete && self.had_consumer && self.consumers.is_empty()
    }
}
