//! The `client` module defines the broker's representation of a connected
//! queue client: its identifier, the channel used to push frames to it, and
//! the deliveries it still owes an acknowledgement for.

pub mod connection;
pub use connection::{Client, Unacked};
