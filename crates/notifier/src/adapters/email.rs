//! Email adapter on the Resend HTTP API (`POST /emails`).
//!
//! The formatter renders email as plain text; this adapter sends it as the text
//! part and derives an HTML part with the action rows as buttons. A split
//! message goes out as numbered emails.

use async_trait::async_trait;
use herald_common::types::ChannelKind;
use herald_formatter::{ActionLink, RenderedMessage};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{ChannelAdapter, SendOutcome, part_label};
use crate::classify::{self, RESEND};

const DEFAULT_BASE_URL: &str = "https://api.resend.com";

pub struct EmailAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    from: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl EmailAdapter {
    pub fn new(client: Client, api_key: String, from: String) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            from,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send_part(&self, body: serde_json::Value) -> Result<String, SendOutcome> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                SendOutcome::failure(
                    classify::classify_transport(&e),
                    format!("resend request failed: {}", e),
                )
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        interpret(status, &text)
    }
}

fn interpret(status: u16, body: &str) -> Result<String, SendOutcome> {
    if (200..300).contains(&status) {
        let id = serde_json::from_str::<SendResponse>(body)
            .map(|r| r.id)
            .unwrap_or_default();
        return Ok(id);
    }

    let error: Option<ErrorResponse> = serde_json::from_str(body).ok();
    let name = error.as_ref().and_then(|e| e.name.clone());
    let message = error.and_then(|e| e.message).unwrap_or_default();
    let outcome = RESEND.classify(status, None, name.as_deref());
    Err(SendOutcome::failure(
        outcome,
        format!(
            "resend error {} {}: {}",
            status,
            name.as_deref().unwrap_or("unknown"),
            message
        ),
    ))
}

/// Email address sanity check. The provider does the real validation.
fn looks_like_email(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !address.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML body: the text with line breaks preserved, then one row of buttons per
/// action row.
pub(crate) fn html_body(text: &str, actions: Option<&[Vec<ActionLink>]>) -> String {
    let mut html = String::from(
        "<div style=\"font-family:Arial,sans-serif;line-height:1.5;color:#222\">",
    );
    html.push_str(&escape_html(text).replace('\n', "<br>\n"));
    if let Some(rows) = actions {
        html.push_str("<div style=\"margin-top:24px\">");
        for row in rows {
            html.push_str("<p>");
            for action in row {
                html.push_str(&format!(
                    "<a href=\"{}\" style=\"display:inline-block;margin:4px;padding:10px 16px;\
                     background:#2563eb;color:#fff;border-radius:6px;text-decoration:none\">{}</a>",
                    escape_html(&action.url),
                    escape_html(&action.label)
                ));
            }
            html.push_str("</p>");
        }
        html.push_str("</div>");
    }
    html.push_str("</div>");
    html
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, message: &RenderedMessage, address: &str) -> SendOutcome {
        let to = address.trim();
        if !looks_like_email(to) {
            return SendOutcome::permanent(format!("invalid email address '{}'", to));
        }

        let total = message.segments.len();
        let mut last_id = None;
        for (index, (segment, actions)) in message.deliverables().enumerate() {
            let subject = match part_label(index, total) {
                Some(part) => format!("{} {}", message.subject, part),
                None => message.subject.clone(),
            };
            let body = json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "text": segment.text,
                "html": html_body(&segment.text, actions),
            });
            match self.send_part(body).await {
                Ok(id) => last_id = Some(id).filter(|id| !id.is_empty()),
                Err(failure) if total > 1 => {
                    let detail = format!(
                        "part {}/{}: {}",
                        index + 1,
                        total,
                        failure.detail().unwrap_or_default()
                    );
                    return SendOutcome::failure(failure.outcome(), detail);
                }
                Err(failure) => return failure,
            }
        }

        SendOutcome::Delivered {
            provider_message_id: last_id,
        }
    }
}
