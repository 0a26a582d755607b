//! WhatsApp Business Cloud API adapter (`POST /{phone_number_id}/messages`).

use async_trait::async_trait;
use herald_common::types::ChannelKind;
use herald_formatter::RenderedMessage;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ChannelAdapter, SendOutcome, part_label};
use crate::classify::{self, WHATSAPP};

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

pub struct WhatsAppAdapter {
    client: Client,
    base_url: String,
    access_token: String,
    phone_number_id: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
}

impl WhatsAppAdapter {
    pub fn new(client: Client, access_token: String, phone_number_id: String) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token,
            phone_number_id,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<String, SendOutcome> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "preview_url": true, "body": text },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                SendOutcome::failure(
                    classify::classify_transport(&e),
                    format!("whatsapp request failed: {}", e),
                )
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        interpret(status, &text)
    }
}

/// Reduce a phone number to the digits-only international form the Cloud API
/// expects. `None` when nothing plausible is left.
pub(crate) fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.strip_prefix("00").map(str::to_string).unwrap_or(digits);
    (8..=15).contains(&digits.len()).then_some(digits)
}

fn interpret(status: u16, body: &str) -> Result<String, SendOutcome> {
    if (200..300).contains(&status) {
        let id = serde_json::from_str::<SendResponse>(body)
            .ok()
            .and_then(|r| r.messages.into_iter().next())
            .map(|m| m.id)
            .unwrap_or_default();
        return Ok(id);
    }

    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => {
            let outcome = WHATSAPP.classify(status, error.code, None);
            let code = error
                .code
                .map(|c| match error.error_subcode {
                    Some(sub) => format!("{}/{}", c, sub),
                    None => c.to_string(),
                })
                .unwrap_or_else(|| status.to_string());
            Err(SendOutcome::failure(
                outcome,
                format!("whatsapp error {}: {}", code, error.message),
            ))
        }
        Err(_) => Err(SendOutcome::failure(
            classify::classify_status(status),
            format!("whatsapp returned HTTP {}", status),
        )),
    }
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Whatsapp
    }

    async fn send(&self, message: &RenderedMessage, address: &str) -> SendOutcome {
        let Some(to) = normalize_phone(address) else {
            return SendOutcome::permanent(format!("invalid whatsapp number '{}'", address));
        };

        let total = message.segments.len();
        let mut last_id = None;
        for (index, segment) in message.segments.iter().enumerate() {
            match self.send_text(&to, &segment.text).await {
                Ok(id) => last_id = Some(id).filter(|id| !id.is_empty()),
                Err(failure) => {
                    let Some(part) = part_label(index, total) else {
                        return failure;
                    };
                    let detail = format!(
                        "segment {}: {}",
                        part,
                        failure.detail().unwrap_or_default()
                    );
                    return SendOutcome::failure(failure.outcome(), detail);
                }
            }
        }

        SendOutcome::Delivered {
            provider_message_id: last_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use herald_common::types::AttemptOutcome;

    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+420 601 123 456").as_deref(), Some("420601123456"));
        assert_eq!(normalize_phone("00420601123456").as_deref(), Some("420601123456"));
        assert_eq!(normalize_phone("(555) 01"), None);
        assert_eq!(normalize_phone("not a number"), None);
    }

    #[test]
    fn test_interpret_success_takes_first_message_id() {
        let body = r#"{"messaging_product":"whatsapp","contacts":[{"input":"420601123456","wa_id":"420601123456"}],"messages":[{"id":"wamid.HBgM"}]}"#;
        assert_eq!(interpret(200, body), Ok("wamid.HBgM".to_string()));
    }

    #[test]
    fn test_interpret_undeliverable_is_permanent() {
        let body = r#"{"error":{"message":"Message undeliverable","type":"OAuthException","code":131026,"fbtrace_id":"x"}}"#;
        let failure = interpret(400, body).unwrap_err();
        assert_eq!(failure.outcome(), AttemptOutcome::PermanentFailure);
        assert_eq!(
            failure.detail(),
            Some("whatsapp error 131026: Message undeliverable")
        );
    }

    #[test]
    fn test_interpret_throughput_limit_is_transient() {
        let body = r#"{"error":{"message":"Rate limit hit","code":130429,"error_subcode":2494055}}"#;
        let failure = interpret(400, body).unwrap_err();
        assert_eq!(failure.outcome(), AttemptOutcome::TransientFailure);
        assert!(failure.detail().unwrap().contains("130429/2494055"));
    }
}
