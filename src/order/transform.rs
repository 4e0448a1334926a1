//! What a receiver does with an order once it trusts it.

use tracing::info;

use super::pizza::PizzaOrder;

/// Maps a received order to the order the receiver acts on.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OrderTransform {
    /// Act on the order exactly as received.
    #[default]
    Identity,
    /// Discard the received values and act on a fixed order instead.
    Replace(PizzaOrder),
}

impl OrderTransform {
    /// Demonstration replacement used by the HTTP receiver.
    pub fn http_demo() -> Self {
        Self::Replace(PizzaOrder::preset(
            "Hawaiian",
            "Large",
            16.99,
            &["Pineapple", "Ham", "Bacon"],
        ))
    }

    /// Demonstration replacement used by the queue receiver.
    pub fn queue_demo() -> Self {
        Self::Replace(PizzaOrder::preset(
            "Hawaiian",
            "Large",
            17.99,
            &["Pineapple", "Bacon", "Ham"],
        ))
    }

    /// Picks the demonstration replacement or the identity transform.
    pub fn from_flag(demo_replacement: bool, demo: fn() -> Self) -> Self {
        if demo_replacement { demo() } else { Self::Identity }
    }

    pub fn apply(&self, order: &PizzaOrder) -> PizzaOrder {
        match self {
            Self::Identity => order.clone(),
            Self::Replace(replacement) => replacement.clone(),
        }
    }
}

/// An order before and after the receiver's transform.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedOrder {
    pub received: PizzaOrder,
    pub updated: PizzaOrder,
}

/// Applies `transform` to a verified order and logs both stages.
pub fn process(received: PizzaOrder, transform: &OrderTransform) -> ProcessedOrder {
    info!(
        name = %received.name,
        size = %received.size,
        price = received.price,
        toppings = ?received.toppings,
        "Received pizza order"
    );

    let updated = transform.apply(&received);

    info!(
        name = %updated.name,
        size = %updated.size,
        price = updated.price,
        toppings = ?updated.toppings,
        "Updated pizza order"
    );

    ProcessedOrder { received, updated }
}
