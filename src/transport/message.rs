use serde::{Deserialize, Serialize};

/// Frames a queue client sends to the broker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "declare")]
    Declare {
        queue: String,
        #[serde(default)]
        durable: bool,
        #[serde(default)]
        exclusive: bool,
        #[serde(default)]
        auto_delete: bool,
    },
    #[serde(rename = "publish")]
    Publish { queue: String, body: String },
    #[serde(rename = "consume")]
    Consume {
        queue: String,
        consumer_tag: String,
        #[serde(default = "default_auto_ack")]
        auto_ack: bool,
    },
    #[serde(rename = "cancel")]
    Cancel { consumer_tag: String },
    #[serde(rename = "ack")]
    Ack { delivery_tag: u64 },
}

fn default_auto_ack() -> bool {
    true
}

/// Frames the broker sends to a queue client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "declare_ok")]
    DeclareOk {
        queue: String,
        message_count: usize,
        consumer_count: usize,
    },
    #[serde(rename = "consume_ok")]
    ConsumeOk { consumer_tag: String },
    #[serde(rename = "cancel_ok")]
    CancelOk { consumer_tag: String },
    #[serde(rename = "deliver")]
    Deliver {
        consumer_tag: String,
        delivery_tag: u64,
        queue: String,
        body: String,
        redelivered: bool,
        timestamp: i64,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
