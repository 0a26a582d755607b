//! Channel adapters.
//!
//! One adapter per transport, each behind [`ChannelAdapter`]. Adapters never
//! return errors: every provider response, transport failure included, is
//! classified into a [`SendOutcome`] before it leaves the adapter.

mod email;
mod telegram;
mod whatsapp;

pub use email::EmailAdapter;
pub use telegram::TelegramAdapter;
pub use whatsapp::WhatsAppAdapter;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_common::config::ProviderCredentials;
use herald_common::types::{AttemptOutcome, ChannelKind};
use herald_formatter::RenderedMessage;

/// Classified result of one `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered { provider_message_id: Option<String> },
    Transient { detail: String },
    Permanent { detail: String },
}

impl SendOutcome {
    pub fn transient(detail: impl Into<String>) -> Self {
        SendOutcome::Transient {
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        SendOutcome::Permanent {
            detail: detail.into(),
        }
    }

    /// Build a failure from a taxonomy verdict.
    pub fn failure(outcome: AttemptOutcome, detail: impl Into<String>) -> Self {
        match outcome {
            AttemptOutcome::PermanentFailure => Self::permanent(detail),
            // A success verdict on an error body is treated as retryable.
            AttemptOutcome::TransientFailure | AttemptOutcome::Success => Self::transient(detail),
        }
    }

    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            SendOutcome::Delivered { .. } => AttemptOutcome::Success,
            SendOutcome::Transient { .. } => AttemptOutcome::TransientFailure,
            SendOutcome::Permanent { .. } => AttemptOutcome::PermanentFailure,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            SendOutcome::Delivered { .. } => None,
            SendOutcome::Transient { detail } | SendOutcome::Permanent { detail } => Some(detail),
        }
    }

    pub fn provider_message_id(&self) -> Option<&str> {
        match self {
            SendOutcome::Delivered {
                provider_message_id,
            } => provider_message_id.as_deref(),
            _ => None,
        }
    }
}

/// A delivery transport.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver every segment of `message` to `address`, in order.
    async fn send(&self, message: &RenderedMessage, address: &str) -> SendOutcome;
}

/// Adapters available to the engine, resolved once at startup.
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: BTreeMap<ChannelKind, Arc<dyn ChannelAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under its own kind, replacing any previous one.
    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Build an adapter for every channel whose credentials are present.
    pub fn from_credentials(
        credentials: &ProviderCredentials,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut set = Self::new();
        if let Some(token) = &credentials.telegram_bot_token {
            set = set.with(Arc::new(TelegramAdapter::new(client.clone(), token.clone())));
        }
        if let Some(key) = &credentials.resend_api_key {
            set = set.with(Arc::new(EmailAdapter::new(
                client.clone(),
                key.clone(),
                credentials.email_from.clone(),
            )));
        }
        if let (Some(token), Some(phone_id)) = (
            &credentials.whatsapp_access_token,
            &credentials.whatsapp_phone_number_id,
        ) {
            set = set.with(Arc::new(WhatsAppAdapter::new(
                client,
                token.clone(),
                phone_id.clone(),
            )));
        }

        for kind in ChannelKind::ALL {
            if !set.adapters.contains_key(&kind) {
                tracing::warn!(channel = %kind, "Channel has no credentials; attempts on it will fail permanently");
            }
        }
        Ok(set)
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.adapters.keys().copied().collect()
    }
}

/// Numbered label for a multi-part message, e.g. `(2/3)`.
pub(crate) fn part_label(index: usize, total: usize) -> Option<String> {
    (total > 1).then(|| format!("({}/{})", index + 1, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let delivered = SendOutcome::Delivered {
            provider_message_id: Some("m-1".to_string()),
        };
        assert_eq!(delivered.outcome(), AttemptOutcome::Success);
        assert_eq!(delivered.provider_message_id(), Some("m-1"));
        assert_eq!(delivered.detail(), None);

        let failed = SendOutcome::failure(AttemptOutcome::PermanentFailure, "bad address");
        assert_eq!(failed.outcome(), AttemptOutcome::PermanentFailure);
        assert_eq!(failed.detail(), Some("bad address"));
    }

    #[test]
    fn test_from_credentials_skips_missing_channels() {
        let credentials = ProviderCredentials {
            telegram_bot_token: Some("123:abc".to_string()),
            email_from: "noreply@herald.local".to_string(),
            whatsapp_access_token: Some("token".to_string()),
            ..Default::default()
        };
        let set = AdapterSet::from_credentials(&credentials, Duration::from_secs(5)).unwrap();
        // WhatsApp also needs a phone number id.
        assert_eq!(set.kinds(), vec![ChannelKind::Telegram]);
        assert!(set.get(ChannelKind::Email).is_none());
    }

    #[test]
    fn test_part_label() {
        assert_eq!(part_label(0, 1), None);
        assert_eq!(part_label(1, 3).as_deref(), Some("(2/3)"));
    }
}
