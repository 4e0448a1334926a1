//! The `transport` module serves the broker over WebSockets.
//!
//! It defines the JSON frames exchanged with queue clients and the server
//! loop that turns those frames into broker operations.

pub mod message;
pub mod websocket;

pub use message::{ClientFrame, ServerFrame};
pub use websocket::{serve, start_broker_server};
