//! # PizzaLink
//!
//! `pizzalink` moves pizza orders between a sender and a receiver over two
//! independent paths:
//!
//! - the queue path, through a small in-memory queue broker spoken to over
//!   WebSockets, with no integrity protection;
//! - the HTTP path, where every order is signed with HMAC-SHA256 over a
//!   pre-shared secret and the receiver verifies it before acting.
//!
//! ## Core Modules
//!
//! - `order`: the pizza order record, its JSON form and the receiver-side transform.
//! - `integrity`: HMAC generation, verification and the `HMAC` header codec.
//! - `broker`: queues, consumers and message routing.
//! - `client`: a client connected to the broker and its unacknowledged deliveries.
//! - `transport`: the broker's WebSocket server and its wire frames.
//! - `queue`: the client channel plus the queue sender and receiver.
//! - `http`: the HTTP sender and receiver.
//! - `config`: settings shared by every program.
//! - `utils`: error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod http;
pub mod integrity;
pub mod order;
pub mod queue;
pub mod transport;
pub mod utils;
