use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::info;

use crate::config::HttpSettings;
use crate::integrity::{HMAC_HEADER, IntegrityCodec};
use crate::order::PizzaOrder;
use crate::utils::Result;

/// Status and body the receiver answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub status: u16,
    pub body: String,
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Posts signed pizza orders to the HTTP receiver.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    url: String,
    codec: IntegrityCodec,
}

impl HttpSender {
    pub fn new(settings: &HttpSettings, codec: IntegrityCodec) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: settings.url(),
            codec,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serializes, signs and posts `order` in a single request.
    pub async fn send(&self, order: &PizzaOrder) -> Result<SendOutcome> {
        let payload = order.to_json()?;
        self.send_payload(payload.into_bytes()).await
    }

    /// Signs and posts an already serialized payload as-is.
    pub async fn send_payload(&self, payload: Vec<u8>) -> Result<SendOutcome> {
        let mac = self.codec.sign(&payload)?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(HMAC_HEADER, mac)
            .body(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        info!(status, %body, "Pizza order response");

        Ok(SendOutcome { status, body })
    }
}
