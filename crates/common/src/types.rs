use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported delivery transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Telegram Bot API.
    Telegram,
    /// Email through the Resend HTTP API.
    Email,
    /// WhatsApp Business Cloud API.
    Whatsapp,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 3] = [
        ChannelKind::Telegram,
        ChannelKind::Email,
        ChannelKind::Whatsapp,
    ];

    /// Whether the transport can carry interactive buttons.
    pub fn supports_actions(&self) -> bool {
        matches!(self, ChannelKind::Telegram | ChannelKind::Email)
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Telegram => write!(f, "telegram"),
            ChannelKind::Email => write!(f, "email"),
            ChannelKind::Whatsapp => write!(f, "whatsapp"),
        }
    }
}

/// Recipient contact descriptor: display name plus one address per channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientContact {
    pub name: String,
    /// Channel → address (chat id, email address, phone number).
    #[serde(default)]
    pub addresses: BTreeMap<ChannelKind, String>,
}

impl RecipientContact {
    pub fn address_for(&self, channel: ChannelKind) -> Option<&str> {
        self.addresses
            .get(&channel)
            .map(String::as_str)
            .filter(|a| !a.trim().is_empty())
    }
}

/// Caller-supplied submission. The engine assigns the id (if absent) and the
/// creation timestamp, producing an immutable `NotificationRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitNotification {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub recipient: RecipientContact,
    /// Primary channel first, then fallbacks in order.
    pub channels: Vec<ChannelKind>,
    pub payload: crate::payload::EventPayload,
}

/// An accepted notification. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: Uuid,
    pub recipient: RecipientContact,
    pub channels: Vec<ChannelKind>,
    pub payload: crate::payload::EventPayload,
    pub created_at: DateTime<Utc>,
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::TransientFailure => write!(f, "transient_failure"),
            AttemptOutcome::PermanentFailure => write!(f, "permanent_failure"),
        }
    }
}

/// One try on one channel. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub notification_id: Uuid,
    pub channel: ChannelKind,
    /// 1-based, monotonic per channel.
    pub attempt_number: u32,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub provider_message_id: Option<String>,
    pub error_detail: Option<String>,
}

/// Notification-level delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    InProgress,
    Delivered,
    FailedRetrying,
    Exhausted,
}

impl DeliveryState {
    pub const ALL: [DeliveryState; 5] = [
        DeliveryState::Pending,
        DeliveryState::InProgress,
        DeliveryState::Delivered,
        DeliveryState::FailedRetrying,
        DeliveryState::Exhausted,
    ];

    /// `Delivered` and `Exhausted` never change once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Delivered | DeliveryState::Exhausted)
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryState::Pending => write!(f, "pending"),
            DeliveryState::InProgress => write!(f, "in_progress"),
            DeliveryState::Delivered => write!(f, "delivered"),
            DeliveryState::FailedRetrying => write!(f, "failed_retrying"),
            DeliveryState::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Per-(notification, channel) scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    NotStarted,
    Attempting,
    RetryWait,
    Succeeded,
    Exhausted,
}

/// Progress of one candidate channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProgress {
    pub channel: ChannelKind,
    pub state: ChannelState,
    pub attempts: u32,
    pub last_outcome: Option<AttemptOutcome>,
}

/// Why a notification ended up `exhausted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalReason {
    /// Every candidate channel failed.
    ChannelListExhausted,
    /// The shared attempt budget ran out before a channel succeeded.
    BudgetExhausted,
    /// Manually aborted by a caller.
    Aborted { reason: String },
}

/// Mutable delivery record, owned by the notification registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub notification_id: Uuid,
    pub state: DeliveryState,
    pub current_channel_index: usize,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub channels: Vec<ChannelProgress>,
    pub attempts: Vec<DeliveryAttempt>,
    pub delivered_via: Option<ChannelKind>,
    pub terminal_reason: Option<TerminalReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryStatus {
    /// Fresh `pending` record, due immediately on the primary channel.
    pub fn pending(request: &NotificationRequest) -> Self {
        Self {
            notification_id: request.id,
            state: DeliveryState::Pending,
            current_channel_index: 0,
            next_attempt_at: Some(request.created_at),
            channels: request
                .channels
                .iter()
                .map(|&channel| ChannelProgress {
                    channel,
                    state: ChannelState::NotStarted,
                    attempts: 0,
                    last_outcome: None,
                })
                .collect(),
            attempts: Vec::new(),
            delivered_via: None,
            terminal_reason: None,
            created_at: request.created_at,
            updated_at: request.created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn current_channel(&self) -> Option<ChannelKind> {
        self.channels
            .get(self.current_channel_index)
            .map(|p| p.channel)
    }

    pub fn current_progress(&self) -> Option<&ChannelProgress> {
        self.channels.get(self.current_channel_index)
    }

    /// Total attempts recorded on `channel`.
    pub fn attempts_on(&self, channel: ChannelKind) -> u32 {
        self.attempts.iter().filter(|a| a.channel == channel).count() as u32
    }

    /// Whether the scheduler considers this record ready for dispatch at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.state,
            DeliveryState::Pending | DeliveryState::FailedRetrying
        ) && self.next_attempt_at.is_some_and(|at| at <= now)
    }
}

/// How attempts are budgeted across a notification's channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    /// Each channel gets a fresh `max_attempts` budget on fallback.
    #[default]
    PerChannel,
    /// `max_attempts` caps the total across all channels.
    Shared,
}

impl std::str::FromStr for BudgetScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_channel" | "per-channel" => Ok(BudgetScope::PerChannel),
            "shared" => Ok(BudgetScope::Shared),
            other => Err(format!("unknown budget scope '{}'", other)),
        }
    }
}

/// Default backoff sequence in seconds (30s, 2m, 5m, 15m).
pub const DEFAULT_BACKOFF_SECS: [u64; 4] = [30, 120, 300, 900];

/// Longest accepted delay between two attempts (30 days).
pub const MAX_BACKOFF_SECS: u64 = 30 * 24 * 60 * 60;

/// Default maximum attempts per channel.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Retry configuration, shared read-only by every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after the 1st, 2nd, ... failure. The last value repeats.
    pub backoff_secs: Vec<u64>,
    pub budget: BudgetScope,
}

impl RetryPolicy {
    /// Delay to wait after `failures` consecutive failures on one channel,
    /// never longer than [`MAX_BACKOFF_SECS`].
    pub fn delay_after(&self, failures: u32) -> Duration {
        let Some(last) = self.backoff_secs.last() else {
            return Duration::zero();
        };
        let index = failures.saturating_sub(1) as usize;
        let secs = (*self.backoff_secs.get(index).unwrap_or(last)).min(MAX_BACKOFF_SECS);
        Duration::try_seconds(secs as i64).unwrap_or_else(Duration::zero)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
            budget: BudgetScope::PerChannel,
        }
    }
}
