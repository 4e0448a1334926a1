//! The `http` module is the HTTP path: a sender that POSTs signed orders and
//! a receiver that verifies the `HMAC` header before acting on them.

pub mod receiver;
pub mod sender;

pub use receiver::{Outcome, ReceiverState, handle_request, router, serve, start_http_receiver};
pub use sender::{HttpSender, SendOutcome};

#[cfg(test)]
mod tests;
