//! Messaging gateway client.
//!
//! Delivers text messages through an Evolution-style WhatsApp API:
//! `POST {base}/message/sendText/{instance}` with an `apikey` header and a
//! `{"number", "text"}` JSON body. Any 2xx response counts as delivered.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use thiserror::Error;

/// Header carrying the gateway API key.
pub const API_KEY_HEADER: &str = "apikey";

/// Where and how to reach the gateway for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub base_url: String,
    pub instance: String,
    pub api_key: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway url '{0}'")]
    InvalidUrl(String),

    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send `text` to `phone` (digits only). `Ok` means the gateway accepted it.
    async fn send_text(
        &self,
        credentials: &GatewayCredentials,
        phone: &str,
        text: &str,
    ) -> Result<(), GatewayError>;
}

pub type DynMessagingGateway = Arc<dyn MessagingGateway>;

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

/// HTTP implementation backed by `reqwest`.
#[derive(Clone)]
pub struct EvolutionGateway {
    client: Client,
}

impl EvolutionGateway {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MessagingGateway for EvolutionGateway {
    async fn send_text(
        &self,
        credentials: &GatewayCredentials,
        phone: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        let url = send_text_url(&credentials.base_url, &credentials.instance)?;

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &credentials.api_key)
            .json(&SendTextRequest {
                number: phone,
                text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected { status, body });
        }

        Ok(())
    }
}

fn send_text_url(base_url: &str, instance: &str) -> Result<Url, GatewayError> {
    let mut url =
        Url::parse(base_url.trim()).map_err(|_| GatewayError::InvalidUrl(base_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| GatewayError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(["message", "sendText", instance]);
    Ok(url)
}

/// Reduce a stored phone number to the digits the gateway expects.
///
/// Returns `None` when nothing dialable is left.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_text_url() {
        let url = send_text_url("https://evo.example.com", "igreja").unwrap();
        assert_eq!(url.as_str(), "https://evo.example.com/message/sendText/igreja");

        let url = send_text_url("https://evo.example.com/api/", "igreja").unwrap();
        assert_eq!(
            url.as_str(),
            "https://evo.example.com/api/message/sendText/igreja"
        );
    }

    #[test]
    fn test_send_text_url_rejects_garbage() {
        assert!(matches!(
            send_text_url("not a url", "igreja"),
            Err(GatewayError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(
            normalize_phone("+55 (11) 99999-0000").as_deref(),
            Some("5511999990000")
        );
        assert_eq!(normalize_phone("+551199990000").as_deref(), Some("551199990000"));
        assert_eq!(normalize_phone("  "), None);
        assert_eq!(normalize_phone("n/a"), None);
    }
}
