//! Delivery engine.
//!
//! Submission, the background worker and manual retries all drive a
//! notification through the same three steps:
//!
//! 1. under the notification's lock, pick the channel and mark it attempting
//! 2. with the lock released, render and hand the message to the adapter
//! 3. under the lock again, record the attempt and apply the scheduler
//!
//! A cancel can land between 1 and 3; the outcome is then recorded and
//! nothing further is scheduled. A panic between 1 and 3 puts the
//! notification back in `failed_retrying`, due at once.
//!
//! Provider calls from all three paths share one `max_in_flight` gate.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use herald_common::clock::{Clock, SystemClock};
use herald_common::types::{
    ChannelKind, ChannelState, DeliveryAttempt, DeliveryState, DeliveryStatus, NotificationRequest, RetryPolicy,
    SubmitNotification, TerminalReason,
};
use herald_formatter::{FormatError, Formatter, RenderedMessage};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::adapters::{AdapterSet, ChannelAdapter, SendOutcome};
use crate::error::DeliveryError;
use crate::registry::NotificationRegistry;
use crate::scheduler::{Decision, RetryScheduler};
use crate::stats::{self, DeliveryStats};
use crate::worker::DEFAULT_MAX_IN_FLIGHT;

pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(15);

/// Who asked for the attempt. Decides how a notification that is not ready
/// is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Submission,
    Scheduled,
    Manual,
}

/// Everything step 2 needs, captured under the lock.
struct Prepared {
    channel: ChannelKind,
    attempt_number: u32,
    started_at: DateTime<Utc>,
    address: Option<String>,
    message: Result<RenderedMessage, FormatError>,
}

pub struct DeliveryEngine {
    registry: Arc<NotificationRegistry>,
    formatter: Formatter,
    adapters: AdapterSet,
    scheduler: RetryScheduler,
    clock: Arc<dyn Clock>,
    adapter_timeout: Duration,
    dispatch_gate: Semaphore,
    wake: Notify,
}

impl DeliveryEngine {
    pub fn new(
        registry: Arc<NotificationRegistry>,
        formatter: Formatter,
        adapters: AdapterSet,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            formatter,
            adapters,
            scheduler: RetryScheduler::new(policy),
            clock: Arc::new(SystemClock),
            adapter_timeout: DEFAULT_ADAPTER_TIMEOUT,
            dispatch_gate: Semaphore::new(DEFAULT_MAX_IN_FLIGHT),
            wake: Notify::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    /// Cap on provider calls running at once, across submissions, scheduled
    /// dispatches and manual retries.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.dispatch_gate = Semaphore::new(max.max(1));
        self
    }

    pub fn registry(&self) -> &Arc<NotificationRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.scheduler.policy()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolves when something became due ahead of the worker's next scan.
    pub async fn notified(&self) {
        self.wake.notified().await
    }

    /// Accept a notification and make the first attempt before returning.
    ///
    /// Validation and rendering errors are returned without registering
    /// anything. Otherwise the returned status reflects the first attempt.
    pub async fn submit(&self, submission: SubmitNotification) -> Result<DeliveryStatus, DeliveryError> {
        validate(&submission)?;

        let SubmitNotification {
            id,
            recipient,
            channels,
            mut payload,
        } = submission;

        if payload
            .customer_name
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
            && !recipient.name.trim().is_empty()
        {
            payload.customer_name = Some(recipient.name.clone());
        }

        // Every candidate must render now; a fallback channel is not allowed
        // to discover a template problem hours later.
        for &channel in &channels {
            self.formatter.render(&payload, channel)?;
        }

        let id = id.unwrap_or_else(Uuid::new_v4);
        let request = NotificationRequest {
            id,
            recipient,
            channels,
            payload,
            created_at: self.clock.now(),
        };
        self.guarded(id, self.first_attempt(request)).await
    }

    /// Scheduled attempt. Does nothing unless the notification is due.
    pub async fn dispatch(&self, id: Uuid) -> Result<DeliveryStatus, DeliveryError> {
        self.run(id, Trigger::Scheduled).await
    }

    /// Immediate extra attempt on the current channel, ignoring the backoff
    /// timer but not the attempt budget.
    pub async fn manual_retry(&self, id: Uuid) -> Result<DeliveryStatus, DeliveryError> {
        self.run(id, Trigger::Manual).await
    }

    /// Abort a notification. An attempt already in flight still gets
    /// recorded but schedules nothing.
    pub async fn cancel(&self, id: Uuid, reason: Option<String>) -> Result<DeliveryStatus, DeliveryError> {
        let now = self.clock.now();
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "cancelled".to_string());

        let status = self
            .registry
            .update(id, |status, _| {
                if status.is_terminal() {
                    return Err(DeliveryError::AlreadyTerminal {
                        id,
                        state: status.state,
                    });
                }
                status.state = DeliveryState::Exhausted;
                status.next_attempt_at = None;
                status.terminal_reason = Some(TerminalReason::Aborted {
                    reason: reason.clone(),
                });
                status.updated_at = now;
                Ok(status.clone())
            })
            .await?;

        tracing::info!(notification_id = %id, reason = %reason, "Notification aborted");
        Ok(status)
    }

    pub async fn status(&self, id: Uuid) -> Result<DeliveryStatus, DeliveryError> {
        self.registry.get_status(id).await
    }

    pub async fn list(&self, state: Option<DeliveryState>) -> Vec<DeliveryStatus> {
        self.registry.list_by_status(state).await
    }

    pub async fn stats(&self) -> DeliveryStats {
        let statuses = self.registry.list_by_status(None).await;
        stats::compute(&statuses)
    }

    async fn first_attempt(&self, request: NotificationRequest) -> Result<DeliveryStatus, DeliveryError> {
        let id = request.id;
        let now = request.created_at;
        let primary = request.channels.first().copied();

        let prepared = self
            .registry
            .create_with(request, |status, request| {
                self.prepare(status, request, now, Trigger::Submission)
            })
            .await??;

        if let Some(primary) = primary {
            tracing::info!(
                notification_id = %id,
                channel = %primary,
                "Notification submitted"
            );
        }

        match prepared {
            Some(prepared) => self.deliver(id, prepared).await,
            None => self.registry.get_status(id).await,
        }
    }

    async fn run(&self, id: Uuid, trigger: Trigger) -> Result<DeliveryStatus, DeliveryError> {
        self.guarded(id, self.attempt(id, trigger)).await
    }

    async fn attempt(&self, id: Uuid, trigger: Trigger) -> Result<DeliveryStatus, DeliveryError> {
        let now = self.clock.now();
        let prepared = self
            .registry
            .update(id, |status, request| self.prepare(status, request, now, trigger))
            .await?;

        match prepared {
            Some(prepared) => self.deliver(id, prepared).await,
            None => self.registry.get_status(id).await,
        }
    }

    /// Run one attempt cycle, releasing the notification if it panics.
    async fn guarded<F>(&self, id: Uuid, cycle: F) -> Result<DeliveryStatus, DeliveryError>
    where
        F: Future<Output = Result<DeliveryStatus, DeliveryError>>,
    {
        match AssertUnwindSafe(cycle).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(notification_id = %id, "Delivery attempt panicked, releasing notification");
                self.release(id).await
            }
        }
    }

    /// Undo a `begin` whose attempt never got recorded.
    async fn release(&self, id: Uuid) -> Result<DeliveryStatus, DeliveryError> {
        let now = self.clock.now();
        self.registry
            .update(id, |status, _| {
                if status.state == DeliveryState::InProgress {
                    if let Some(progress) = status.channels.get_mut(status.current_channel_index)
                        && progress.state == ChannelState::Attempting
                    {
                        progress.state = ChannelState::RetryWait;
                    }
                    status.state = DeliveryState::FailedRetrying;
                    status.next_attempt_at = Some(now);
                    status.updated_at = now;
                }
                Ok(status.clone())
            })
            .await
    }

    /// Step 1. `Ok(None)` means there is nothing to do for this trigger.
    fn prepare(
        &self,
        status: &mut DeliveryStatus,
        request: &NotificationRequest,
        now: DateTime<Utc>,
        trigger: Trigger,
    ) -> Result<Option<Prepared>, DeliveryError> {
        let id = status.notification_id;

        if status.is_terminal() {
            return match trigger {
                Trigger::Manual => Err(terminal_rejection(status)),
                Trigger::Submission | Trigger::Scheduled => Ok(None),
            };
        }
        if status.state == DeliveryState::InProgress {
            return match trigger {
                Trigger::Manual => Err(DeliveryError::AttemptInFlight(id)),
                Trigger::Submission | Trigger::Scheduled => Ok(None),
            };
        }
        if trigger == Trigger::Scheduled && !status.is_due(now) {
            return Ok(None);
        }
        if trigger == Trigger::Manual
            && let Some(channel) = status.current_channel()
            && self.scheduler.remaining_budget(status) == 0
        {
            return Err(DeliveryError::BudgetExhausted { id, channel });
        }
        if trigger != Trigger::Manual
            && let Some(decision) = self.scheduler.skip_spent(status, now)
        {
            self.report(id, &decision);
            if status.is_terminal() {
                return Ok(None);
            }
        }

        let Some((channel, attempt_number)) = self.scheduler.begin(status, now) else {
            return Ok(None);
        };
        Ok(Some(Prepared {
            channel,
            attempt_number,
            started_at: now,
            address: request.recipient.address_for(channel).map(str::to_string),
            message: self.formatter.render(&request.payload, channel),
        }))
    }

    /// Steps 2 and 3.
    async fn deliver(&self, id: Uuid, prepared: Prepared) -> Result<DeliveryStatus, DeliveryError> {
        let channel = prepared.channel;
        let outcome = match (&prepared.message, &prepared.address, self.adapters.get(channel)) {
            (Err(e), _, _) => SendOutcome::permanent(format!("render failed: {}", e)),
            (_, None, _) => SendOutcome::permanent(format!("no {} address", channel)),
            (_, _, None) => SendOutcome::permanent(format!("{} channel not configured", channel)),
            (Ok(message), Some(address), Some(adapter)) => {
                self.send(adapter.as_ref(), message, address).await
            }
        };

        let attempt = DeliveryAttempt {
            notification_id: id,
            channel,
            attempt_number: prepared.attempt_number,
            attempted_at: prepared.started_at,
            outcome: outcome.outcome(),
            provider_message_id: outcome.provider_message_id().map(str::to_string),
            error_detail: outcome.detail().map(str::to_string),
        };

        if let Some(detail) = outcome.detail() {
            tracing::warn!(
                notification_id = %id,
                channel = %channel,
                attempt = prepared.attempt_number,
                outcome = %attempt.outcome,
                error = %detail,
                "Delivery attempt failed"
            );
        }

        let now = self.clock.now();
        let (decision, status) = self
            .registry
            .record_attempt(attempt, |status, attempt| {
                let decision = self.scheduler.apply(status, attempt, now);
                (decision, status.clone())
            })
            .await?;

        self.report(id, &decision);
        Ok(status)
    }

    /// One adapter call under the timeout, once a dispatch permit is free.
    /// Panics and timeouts are transient.
    async fn send(&self, adapter: &dyn ChannelAdapter, message: &RenderedMessage, address: &str) -> SendOutcome {
        let _permit = match self.dispatch_gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => return SendOutcome::transient("dispatch gate closed"),
        };
        let call = AssertUnwindSafe(adapter.send(message, address)).catch_unwind();
        match tokio::time::timeout(self.adapter_timeout, call).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => SendOutcome::transient(format!("{} adapter panicked", adapter.kind())),
            Err(_) => SendOutcome::transient(format!(
                "{} adapter timed out after {:?}",
                adapter.kind(),
                self.adapter_timeout
            )),
        }
    }

    fn report(&self, id: Uuid, decision: &Decision) {
        match decision {
            Decision::Delivered { channel } => {
                tracing::info!(notification_id = %id, channel = %channel, "Notification delivered");
            }
            Decision::Retry { channel, at } => {
                tracing::debug!(notification_id = %id, channel = %channel, next_attempt_at = %at, "Retry scheduled");
            }
            Decision::Fallback { from, to } => {
                tracing::info!(notification_id = %id, from = %from, to = %to, "Falling back to next channel");
                self.wake.notify_one();
            }
            Decision::Exhausted { reason } => {
                tracing::info!(notification_id = %id, reason = ?reason, "Notification exhausted");
            }
            Decision::Recorded => {
                tracing::debug!(notification_id = %id, "Attempt recorded on terminal notification");
            }
        }
    }
}

fn validate(submission: &SubmitNotification) -> Result<(), DeliveryError> {
    if submission.channels.is_empty() {
        return Err(DeliveryError::InvalidRequest(
            "at least one channel is required".to_string(),
        ));
    }
    for (i, channel) in submission.channels.iter().enumerate() {
        if submission.channels[..i].contains(channel) {
            return Err(DeliveryError::InvalidRequest(format!(
                "channel {} listed more than once",
                channel
            )));
        }
        if submission.recipient.address_for(*channel).is_none() {
            return Err(DeliveryError::InvalidRequest(format!(
                "recipient has no {} address",
                channel
            )));
        }
    }
    Ok(())
}

/// Manual retry on a terminal notification: a spent channel list is a budget
/// problem, anything else was settled on purpose.
fn terminal_rejection(status: &DeliveryStatus) -> DeliveryError {
    let id = status.notification_id;
    match (&status.terminal_reason, status.channels.last()) {
        (Some(TerminalReason::Aborted { .. }), _) | (_, None) => DeliveryError::AlreadyTerminal {
            id,
            state: status.state,
        },
        _ if status.state == DeliveryState::Delivered => DeliveryError::AlreadyTerminal {
            id,
            state: status.state,
        },
        (_, Some(last)) => DeliveryError::BudgetExhausted {
            id,
            channel: last.channel,
        },
    }
}
