//! Telegram Bot API adapter (`POST /bot<token>/sendMessage`).

use std::time::Duration;

use async_trait::async_trait;
use herald_common::types::ChannelKind;
use herald_formatter::{ActionLink, RenderedMessage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ChannelAdapter, SendOutcome, part_label};
use crate::classify::{self, TELEGRAM};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Pause between consecutive segments to stay under per-chat rate limits.
const SEGMENT_PACING: Duration = Duration::from_millis(500);

pub struct TelegramAdapter {
    client: Client,
    base_url: String,
    token: String,
    pacing: Duration,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramAdapter {
    pub fn new(client: Client, token: String) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            token,
            pacing: SEGMENT_PACING,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    async fn send_segment(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&[Vec<ActionLink>]>,
    ) -> Result<String, SendOutcome> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let body = request_body(chat_id, text, keyboard);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                SendOutcome::failure(
                    classify::classify_transport(&e),
                    format!("telegram request failed: {}", e.without_url()),
                )
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        interpret(status, &text)
    }
}

fn request_body(
    chat_id: &str,
    text: &str,
    keyboard: Option<&[Vec<ActionLink>]>,
) -> serde_json::Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "Markdown",
        "disable_web_page_preview": true,
    });
    if let Some(rows) = keyboard {
        let rows: Vec<Vec<serde_json::Value>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|a| json!({ "text": a.label, "url": a.url }))
                    .collect()
            })
            .collect();
        body["reply_markup"] = json!({ "inline_keyboard": rows });
    }
    body
}

/// Turn a `sendMessage` response into a message id or a classified failure.
fn interpret(status: u16, body: &str) -> Result<String, SendOutcome> {
    let parsed: Option<ApiResponse> = serde_json::from_str(body).ok();

    match parsed {
        Some(ApiResponse {
            ok: true, result, ..
        }) => Ok(result
            .map(|m| m.message_id.to_string())
            .unwrap_or_default()),
        Some(resp) => {
            let description = resp.description.unwrap_or_default();
            let outcome = TELEGRAM.classify(status, resp.error_code, Some(&description));
            Err(SendOutcome::failure(
                outcome,
                format!(
                    "telegram error {}: {}",
                    resp.error_code.unwrap_or(status as i64),
                    description
                ),
            ))
        }
        None if (200..300).contains(&status) => Ok(String::new()),
        None => Err(SendOutcome::failure(
            classify::classify_status(status),
            format!("telegram returned HTTP {}", status),
        )),
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, message: &RenderedMessage, address: &str) -> SendOutcome {
        let chat_id = address.trim();
        if chat_id.is_empty() {
            return SendOutcome::permanent("empty telegram chat id");
        }

        let total = message.segments.len();
        let mut last_id = None;
        for (index, (segment, actions)) in message.deliverables().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            match self.send_segment(chat_id, &segment.text, actions).await {
                Ok(id) => last_id = Some(id).filter(|id| !id.is_empty()),
                Err(failure) => {
                    return match (failure, part_label(index, total)) {
                        (SendOutcome::Transient { detail }, Some(part)) => {
                            SendOutcome::transient(format!("segment {}: {}", part, detail))
                        }
                        (SendOutcome::Permanent { detail }, Some(part)) => {
                            SendOutcome::permanent(format!("segment {}: {}", part, detail))
                        }
                        (failure, _) => failure,
                    };
                }
            }
            tracing::debug!(chat_id, segment = index + 1, total, "Telegram segment sent");
        }

        SendOutcome::Delivered {
            provider_message_id: last_id,
        }
    }
}
