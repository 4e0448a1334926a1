use tracing::{info, warn};

use crate::config::QueueSettings;
use crate::order::{OrderTransform, PizzaOrder, ProcessedOrder, process};
use crate::queue::channel::{Consumer, Delivery, QueueChannel};
use crate::queue::sender::pizza_queue_options;
use crate::utils::Result;

/// Consumes pizza orders from a queue and applies the configured transform.
///
/// Deliveries are handled one at a time in the order the broker sent them.
/// A delivery that is not an order is logged and skipped; it never stops
/// the loop.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    transform: OrderTransform,
}

impl QueueReceiver {
    pub fn new(transform: OrderTransform) -> Self {
        Self { transform }
    }

    pub fn from_settings(settings: &QueueSettings) -> Self {
        Self::new(OrderTransform::from_flag(
            settings.demo_replacement,
            OrderTransform::queue_demo,
        ))
    }

    /// Declares `queue` and attaches an auto-ack consumer to it.
    pub async fn subscribe(channel: &mut QueueChannel, queue: &str) -> Result<Consumer> {
        channel.declare(queue, pizza_queue_options()).await?;
        let consumer = channel.consume(queue, true).await?;
        info!(queue, "Waiting for messages. To exit press CTRL+C");
        Ok(consumer)
    }

    /// Decodes and processes one delivery.
    pub fn process(&self, delivery: &Delivery) -> Result<ProcessedOrder> {
        info!(
            queue = %delivery.queue,
            delivery_tag = delivery.delivery_tag,
            body = %delivery.body,
            "Received from queue"
        );
        let order = PizzaOrder::from_json(delivery.body.as_bytes())?;
        Ok(process(order, &self.transform))
    }

    /// Processes deliveries until the consumer ends, handing every outcome
    /// to `on_outcome`.
    pub async fn run<F>(&self, consumer: &mut Consumer, mut on_outcome: F)
    where
        F: FnMut(Result<ProcessedOrder>),
    {
        while let Some(delivery) = consumer.next().await {
            let outcome = self.process(&delivery);
            if let Err(e) = &outcome {
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Failed to deserialize pizza order, skipping"
                );
            }
            on_outcome(outcome);
        }
        info!(consumer_tag = consumer.tag(), "Consumer closed");
    }
}
