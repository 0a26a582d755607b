use herald_common::payload::EventKind;
use herald_common::types::ChannelKind;
use thiserror::Error;

/// Rendering failures. All of them are permanent: the same payload will never
/// render, so the notification must be rejected instead of queued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("{kind} template requires field '{field}'")]
    MissingField {
        kind: EventKind,
        field: &'static str,
    },

    #[error("{kind} template field '{field}' is invalid: {reason}")]
    InvalidField {
        kind: EventKind,
        field: &'static str,
        reason: String,
    },

    #[error("{channel} cannot carry a message limited to {limit} characters")]
    LimitTooSmall { channel: ChannelKind, limit: usize },
}
