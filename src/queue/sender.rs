use tracing::info;

use crate::broker::QueueOptions;
use crate::order::PizzaOrder;
use crate::queue::channel::QueueChannel;
use crate::utils::Result;

/// Options both queue programs declare `pizzaQueue` with: non-durable,
/// non-exclusive, non-auto-delete.
pub fn pizza_queue_options() -> QueueOptions {
    QueueOptions::default()
}

/// Declares `queue` and publishes `order` to it once.
///
/// Returns the payload that was sent. There is no publish confirmation; a
/// successful return only means the frame was written.
pub async fn send_order(channel: &mut QueueChannel, queue: &str, order: &PizzaOrder) -> Result<String> {
    let payload = order.to_json()?;
    channel.declare(queue, pizza_queue_options()).await?;
    channel.publish(queue, &payload).await?;
    info!(queue, %payload, "Sent pizza order");
    Ok(payload)
}
