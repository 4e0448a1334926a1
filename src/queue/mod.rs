//! The `queue` module is the queue path: a client channel to the broker,
//! the one-shot order sender and the long-lived order receiver.
//!
//! No MAC is applied on this path.

pub mod channel;
pub mod receiver;
pub mod sender;

pub use channel::{Consumer, Delivery, QueueChannel};
pub use receiver::QueueReceiver;
pub use sender::{pizza_queue_options, send_order};
