use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::utils::Result;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    #[error("price must be a finite, non-negative amount, got {0}")]
    InvalidPrice(f64),
}

/// Accepts finite prices of zero or more.
pub fn validate_price(price: f64) -> std::result::Result<f64, OrderError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(OrderError::InvalidPrice(price))
    }
}

fn deserialize_price<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let price = f64::deserialize(deserializer)?;
    validate_price(price).map_err(serde::de::Error::custom)
}

/// A pizza order as exchanged between senders and receivers.
///
/// Field names and their order define the canonical JSON payload:
///
/// ```text
/// {"name":"Pepperoni","size":"Medium","price":14.99,"toppings":["Pepperoni","Mushroom","Sausage"]}
/// ```
///
/// Orders are values. A stage that changes an order builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PizzaOrder {
    pub name: String,
    pub size: String,
    #[serde(deserialize_with = "deserialize_price")]
    pub price: f64,
    pub toppings: Vec<String>,
}

impl PizzaOrder {
    pub fn new<I, T>(
        name: impl Into<String>,
        size: impl Into<String>,
        price: f64,
        toppings: I,
    ) -> std::result::Result<Self, OrderError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Ok(Self {
            name: name.into(),
            size: size.into(),
            price: validate_price(price)?,
            toppings: toppings.into_iter().map(Into::into).collect(),
        })
    }

    /// Builds one of the fixed orders whose price is known to be valid.
    pub(crate) fn preset(name: &str, size: &str, price: f64, toppings: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            size: size.to_string(),
            price,
            toppings: toppings.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// The order both senders transmit when nothing else is requested.
    pub fn pepperoni() -> Self {
        Self::preset(
            "Pepperoni",
            "Medium",
            14.99,
            &["Pepperoni", "Mushroom", "Sausage"],
        )
    }

    /// Fields are public, so an order built by hand is checked again here.
    pub fn validate(&self) -> std::result::Result<(), OrderError> {
        validate_price(self.price).map(|_| ())
    }

    /// Serializes to the canonical payload. An order that could not be
    /// parsed back is refused.
    pub fn to_json(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a payload. Anything that is not a complete order is an error;
    /// there is no partially filled record.
    pub fn from_json(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl std::fmt::Display for PizzaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) ${:.2} [{}]",
            self.name,
            self.size,
            self.price,
            self.toppings.join(", ")
        )
    }
}
