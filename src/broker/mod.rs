//! The `broker` module is the in-memory queue broker behind the queue path.
//!
//! It owns named queues, buffers published messages and hands them to
//! consumers. Network handling lives in `transport`.

pub mod engine;
pub mod message;
pub mod queue;

pub use engine::{Broker, BrokerError, QueueStats};
pub use queue::{ClientId, QueueOptions};
