//! The `order` module defines the record both delivery paths carry.
//!
//! `PizzaOrder` is the wire shape; `OrderTransform` and `process` are the
//! receiver-side step that turns a verified order into the one acted upon.

pub mod pizza;
pub mod transform;

pub use pizza::{OrderError, PizzaOrder, validate_price};
pub use transform::{OrderTransform, ProcessedOrder, process};
