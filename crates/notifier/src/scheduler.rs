//! Retry scheduler: the per-channel state machine.
//!
//! ```text
//! not_started -> attempting -> succeeded
//!                           -> retry_wait -> attempting
//!                           -> exhausted (advance to the next channel)
//! ```
//!
//! All functions here are pure transitions on a [`DeliveryStatus`]; callers
//! hold the notification's lock while applying them.

use chrono::{DateTime, Utc};
use herald_common::types::{
    AttemptOutcome, BudgetScope, ChannelKind, ChannelState, DeliveryAttempt, DeliveryState,
    DeliveryStatus, RetryPolicy, TerminalReason,
};

/// What happens after an attempt outcome has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Terminal success.
    Delivered { channel: ChannelKind },
    /// Try the same channel again at `at`.
    Retry {
        channel: ChannelKind,
        at: DateTime<Utc>,
    },
    /// `from` is exhausted; `to` is due immediately.
    Fallback {
        from: ChannelKind,
        to: ChannelKind,
    },
    /// Terminal failure.
    Exhausted { reason: TerminalReason },
    /// The notification was already terminal (aborted mid-flight); the attempt
    /// was recorded and nothing was scheduled.
    Recorded,
}

#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempts still allowed on the current channel.
    pub fn remaining_budget(&self, status: &DeliveryStatus) -> u32 {
        let Some(progress) = status.current_progress() else {
            return 0;
        };
        let used = match self.policy.budget {
            BudgetScope::PerChannel => progress.attempts,
            BudgetScope::Shared => status.attempts.len() as u32,
        };
        self.policy.max_attempts.saturating_sub(used)
    }

    /// Mark the current channel as attempting and return the attempt number it
    /// will carry.
    pub fn begin(&self, status: &mut DeliveryStatus, now: DateTime<Utc>) -> Option<(ChannelKind, u32)> {
        let index = status.current_channel_index;
        let progress = status.channels.get_mut(index)?;
        progress.state = ChannelState::Attempting;
        let number = progress.attempts + 1;
        let channel = progress.channel;

        status.state = DeliveryState::InProgress;
        status.next_attempt_at = None;
        status.updated_at = now;
        Some((channel, number))
    }

    /// Record `attempt` and drive the state machine.
    pub fn apply(
        &self,
        status: &mut DeliveryStatus,
        attempt: DeliveryAttempt,
        now: DateTime<Utc>,
    ) -> Decision {
        let outcome = attempt.outcome;
        let channel = attempt.channel;
        status.attempts.push(attempt);
        status.updated_at = now;

        if let Some(progress) = status
            .channels
            .iter_mut()
            .find(|p| p.channel == channel)
        {
            progress.attempts += 1;
            progress.last_outcome = Some(outcome);
        }

        if status.is_terminal() {
            return Decision::Recorded;
        }

        let index = status.current_channel_index;
        match outcome {
            AttemptOutcome::Success => {
                if let Some(progress) = status.channels.get_mut(index) {
                    progress.state = ChannelState::Succeeded;
                }
                status.state = DeliveryState::Delivered;
                status.delivered_via = Some(channel);
                status.next_attempt_at = None;
                Decision::Delivered { channel }
            }
            AttemptOutcome::TransientFailure if self.remaining_budget(status) > 0 => {
                let failures = status.channels.get(index).map_or(1, |p| p.attempts);
                let at = now
                    .checked_add_signed(self.policy.delay_after(failures))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if let Some(progress) = status.channels.get_mut(index) {
                    progress.state = ChannelState::RetryWait;
                }
                status.state = DeliveryState::FailedRetrying;
                status.next_attempt_at = Some(at);
                Decision::Retry { channel, at }
            }
            AttemptOutcome::TransientFailure | AttemptOutcome::PermanentFailure => {
                self.advance(status, now)
            }
        }
    }

    /// Move past channels with no budget left, so that no attempt is started
    /// beyond `max_attempts`. Returns the last decision taken, if any.
    pub fn skip_spent(&self, status: &mut DeliveryStatus, now: DateTime<Utc>) -> Option<Decision> {
        let mut decision = None;
        while !status.is_terminal() && self.remaining_budget(status) == 0 {
            status.updated_at = now;
            decision = Some(self.advance(status, now));
        }
        decision
    }

    /// Exhaust the current channel and move to the next candidate.
    fn advance(&self, status: &mut DeliveryStatus, now: DateTime<Utc>) -> Decision {
        let index = status.current_channel_index;
        let from = match status.channels.get_mut(index) {
            Some(progress) => {
                progress.state = ChannelState::Exhausted;
                progress.channel
            }
            None => return self.exhaust(status, TerminalReason::ChannelListExhausted),
        };

        let shared_spent = self.policy.budget == BudgetScope::Shared
            && status.attempts.len() as u32 >= self.policy.max_attempts;

        match status.channels.get(index + 1) {
            Some(next) if !shared_spent => {
                let to = next.channel;
                status.current_channel_index = index + 1;
                status.state = DeliveryState::FailedRetrying;
                status.next_attempt_at = Some(now);
                Decision::Fallback { from, to }
            }
            Some(_) => self.exhaust(status, TerminalReason::BudgetExhausted),
            None => self.exhaust(status, TerminalReason::ChannelListExhausted),
        }
    }

    fn exhaust(&self, status: &mut DeliveryStatus, reason: TerminalReason) -> Decision {
        status.state = DeliveryState::Exhausted;
        status.next_attempt_at = None;
        status.terminal_reason = Some(reason.clone());
        Decision::Exhausted { reason }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use herald_common::payload::{EventKind, EventPayload};
    use herald_common::types::{NotificationRequest, RecipientContact};
    use uuid::Uuid;

    use super::*;

    fn status(channels: &[ChannelKind], now: DateTime<Utc>) -> DeliveryStatus {
        DeliveryStatus::pending(&NotificationRequest {
            id: Uuid::new_v4(),
            recipient: RecipientContact::default(),
            channels: channels.to_vec(),
            payload: EventPayload::new(EventKind::FollowUp),
            created_at: now,
        })
    }

    fn run(
        scheduler: &RetryScheduler,
        status: &mut DeliveryStatus,
        outcome: AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Decision {
        let (channel, attempt_number) = scheduler.begin(status, now).unwrap();
        let attempt = DeliveryAttempt {
            notification_id: status.notification_id,
            channel,
            attempt_number,
            attempted_at: now,
            outcome,
            provider_message_id: None,
            error_detail: None,
        };
        scheduler.apply(status, attempt, now)
    }

    #[test]
    fn test_transient_failures_back_off_then_fall_back() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Utc::now();
        let mut s = status(&[ChannelKind::Telegram, ChannelKind::Email], now);

        let d1 = run(&scheduler, &mut s, AttemptOutcome::TransientFailure, now);
        assert_eq!(
            d1,
            Decision::Retry {
                channel: ChannelKind::Telegram,
                at: now + Duration::seconds(30)
            }
        );
        assert_eq!(s.state, DeliveryState::FailedRetrying);
        assert_eq!(s.channels[0].state, ChannelState::RetryWait);

        let t2 = now + Duration::seconds(30);
        let d2 = run(&scheduler, &mut s, AttemptOutcome::TransientFailure, t2);
        assert_eq!(
            d2,
            Decision::Retry {
                channel: ChannelKind::Telegram,
                at: t2 + Duration::seconds(120)
            }
        );

        let t3 = t2 + Duration::seconds(120);
        let d3 = run(&scheduler, &mut s, AttemptOutcome::TransientFailure, t3);
        assert_eq!(
            d3,
            Decision::Fallback {
                from: ChannelKind::Telegram,
                to: ChannelKind::Email
            }
        );
        assert_eq!(s.channels[0].state, ChannelState::Exhausted);
        assert_eq!(s.channels[0].attempts, 3);
        assert_eq!(s.current_channel(), Some(ChannelKind::Email));
        assert_eq!(s.next_attempt_at, Some(t3));
        assert!(s.is_due(t3));

        // Per-channel budget: email starts from attempt 1.
        let (channel, number) = scheduler.begin(&mut s, t3).unwrap();
        assert_eq!((channel, number), (ChannelKind::Email, 1));
    }

    #[test]
    fn test_permanent_failure_skips_remaining_attempts() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Utc::now();
        let mut s = status(&[ChannelKind::Whatsapp, ChannelKind::Email], now);

        let decision = run(&scheduler, &mut s, AttemptOutcome::PermanentFailure, now);
        assert_eq!(
            decision,
            Decision::Fallback {
                from: ChannelKind::Whatsapp,
                to: ChannelKind::Email
            }
        );
        assert_eq!(s.channels[0].attempts, 1);
        assert_eq!(
            s.channels[0].last_outcome,
            Some(AttemptOutcome::PermanentFailure)
        );
    }

    #[test]
    fn test_last_channel_failure_exhausts() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Utc::now();
        let mut s = status(&[ChannelKind::Email], now);

        let decision = run(&scheduler, &mut s, AttemptOutcome::PermanentFailure, now);
        assert_eq!(
            decision,
            Decision::Exhausted {
                reason: TerminalReason::ChannelListExhausted
            }
        );
        assert_eq!(s.state, DeliveryState::Exhausted);
        assert_eq!(s.next_attempt_at, None);
        assert!(!s.is_due(now + Duration::days(1)));
    }

    #[test]
    fn test_success_is_terminal() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Utc::now();
        let mut s = status(&[ChannelKind::Telegram, ChannelKind::Email], now);

        run(&scheduler, &mut s, AttemptOutcome::TransientFailure, now);
        let decision = run(&scheduler, &mut s, AttemptOutcome::Success, now);
        assert_eq!(
            decision,
            Decision::Delivered {
                channel: ChannelKind::Telegram
            }
        );
        assert_eq!(s.state, DeliveryState::Delivered);
        assert_eq!(s.delivered_via, Some(ChannelKind::Telegram));
        assert_eq!(s.channels[1].state, ChannelState::NotStarted);
    }

    #[test]
    fn test_shared_budget_spans_channels() {
        let scheduler = RetryScheduler::new(RetryPolicy {
            max_attempts: 3,
            budget: BudgetScope::Shared,
            ..Default::default()
        });
        let now = Utc::now();
        let mut s = status(
            &[ChannelKind::Telegram, ChannelKind::Email, ChannelKind::Whatsapp],
            now,
        );

        run(&scheduler, &mut s, AttemptOutcome::TransientFailure, now);
        let fallback = run(&scheduler, &mut s, AttemptOutcome::PermanentFailure, now);
        assert!(matches!(fallback, Decision::Fallback { .. }));
        // One attempt left in the shared budget.
        assert_eq!(scheduler.remaining_budget(&s), 1);

        let last = run(&scheduler, &mut s, AttemptOutcome::TransientFailure, now);
        assert_eq!(
            last,
            Decision::Exhausted {
                reason: TerminalReason::BudgetExhausted
            }
        );
        assert_eq!(s.attempts.len(), 3);
    }

    #[test]
    fn test_zero_budget_never_begins() {
        let scheduler = RetryScheduler::new(RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        });
        let now = Utc::now();
        let mut s = status(&[ChannelKind::Telegram, ChannelKind::Email], now);

        let decision = scheduler.skip_spent(&mut s, now);
        assert_eq!(
            decision,
            Some(Decision::Exhausted {
                reason: TerminalReason::ChannelListExhausted
            })
        );
        assert!(s.attempts.is_empty());
        assert!(s.channels.iter().all(|p| p.state == ChannelState::Exhausted));

        // A channel with budget left is untouched.
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let mut fresh = status(&[ChannelKind::Telegram], now);
        assert_eq!(scheduler.skip_spent(&mut fresh, now), None);
        assert_eq!(fresh.state, DeliveryState::Pending);
    }

    #[test]
    fn test_retry_time_saturates_instead_of_overflowing() {
        let scheduler = RetryScheduler::new(RetryPolicy {
            backoff_secs: vec![u64::MAX],
            ..Default::default()
        });
        let late = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        let mut s = status(&[ChannelKind::Telegram], late);

        let decision = run(&scheduler, &mut s, AttemptOutcome::TransientFailure, late);
        assert_eq!(
            decision,
            Decision::Retry {
                channel: ChannelKind::Telegram,
                at: DateTime::<Utc>::MAX_UTC
            }
        );
        assert_eq!(s.state, DeliveryState::FailedRetrying);
    }

    #[test]
    fn test_outcome_after_abort_is_recorded_only() {
        let scheduler = RetryScheduler::new(RetryPolicy::default());
        let now = Utc::now();
        let mut s = status(&[ChannelKind::Telegram], now);
        let (channel, attempt_number) = scheduler.begin(&mut s, now).unwrap();

        s.state = DeliveryState::Exhausted;
        s.terminal_reason = Some(TerminalReason::Aborted {
            reason: "operator".to_string(),
        });

        let notification_id = s.notification_id;
        let decision = scheduler.apply(
            &mut s,
            DeliveryAttempt {
                notification_id,
                channel,
                attempt_number,
                attempted_at: now,
                outcome: AttemptOutcome::Success,
                provider_message_id: Some("m".to_string()),
                error_detail: None,
            },
            now,
        );
        assert_eq!(decision, Decision::Recorded);
        assert_eq!(s.state, DeliveryState::Exhausted);
        assert_eq!(s.attempts.len(), 1);
        assert_eq!(s.delivered_via, None);
    }
}
