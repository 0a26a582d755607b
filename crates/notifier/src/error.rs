use herald_common::error::AppError;
use herald_common::types::{ChannelKind, DeliveryState};
use herald_formatter::FormatError;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned synchronously by delivery operations.
///
/// Failed provider calls are not errors: they are classified outcomes recorded
/// on the notification.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Notification {0} not found")]
    NotFound(Uuid),

    #[error("Notification {id} has no attempts left on {channel}")]
    BudgetExhausted { id: Uuid, channel: ChannelKind },

    #[error("Notification {id} is already {state}")]
    AlreadyTerminal { id: Uuid, state: DeliveryState },

    #[error("Notification {0} has an attempt in flight")]
    AttemptInFlight(Uuid),
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match &err {
            DeliveryError::Format(_) => AppError::Format(err.to_string()),
            DeliveryError::InvalidRequest(_) => AppError::Validation(err.to_string()),
            DeliveryError::NotFound(_) => AppError::NotFound(err.to_string()),
            DeliveryError::BudgetExhausted { .. }
            | DeliveryError::AlreadyTerminal { .. }
            | DeliveryError::AttemptInFlight(_) => AppError::Conflict(err.to_string()),
        }
    }
}
