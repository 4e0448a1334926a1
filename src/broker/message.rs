use uuid::Uuid;

/// A message held by a queue until a consumer takes it.
///
/// # Fields
///
/// - `message_id` - Broker-assigned identifier, used only in logs.
/// - `queue` - The queue the message was published to.
/// - `body` - The published payload, passed through untouched.
/// - `timestamp` - Publish time in Unix milliseconds.
/// - `redelivered` - Set once the message has been handed out and requeued.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub queue: String,
    pub body: String,
    pub timestamp: i64,
    pub redelivered: bool,
}

impl Message {
    pub fn new(queue: &str, body: String) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            body,
            timestamp: chrono::Utc::now().timestamp_millis(),
            redelivered: false,
        }
    }
}
