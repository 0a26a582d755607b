//! Delivery statistics over the registry's current contents.

use std::collections::BTreeMap;

use herald_common::types::{AttemptOutcome, ChannelKind, DeliveryState, DeliveryStatus};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelStats {
    pub attempts: u64,
    pub successes: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    /// Successful attempts over all attempts on this channel, 0 when unused.
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub total: u64,
    /// Count per state; every state is present, zeroes included.
    pub by_state: BTreeMap<String, u64>,
    pub by_channel: BTreeMap<ChannelKind, ChannelStats>,
    /// Attempts recorded on delivered notifications, averaged. `None` until
    /// something is delivered.
    pub mean_attempts_to_success: Option<f64>,
    /// Delivered over terminal notifications. `None` while nothing is terminal.
    pub success_rate: Option<f64>,
}

impl DeliveryStats {
    pub fn count(&self, state: DeliveryState) -> u64 {
        self.by_state.get(&state.to_string()).copied().unwrap_or(0)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

pub fn compute<'a>(statuses: impl IntoIterator<Item = &'a DeliveryStatus>) -> DeliveryStats {
    let mut by_state: BTreeMap<String, u64> = DeliveryState::ALL
        .iter()
        .map(|state| (state.to_string(), 0))
        .collect();
    let mut by_channel: BTreeMap<ChannelKind, ChannelStats> = ChannelKind::ALL
        .iter()
        .map(|&kind| (kind, ChannelStats::default()))
        .collect();

    let mut total = 0;
    let mut delivered = 0;
    let mut exhausted = 0;
    let mut attempts_on_delivered = 0;

    for status in statuses {
        total += 1;
        *by_state.entry(status.state.to_string()).or_default() += 1;
        match status.state {
            DeliveryState::Delivered => {
                delivered += 1;
                attempts_on_delivered += status.attempts.len() as u64;
            }
            DeliveryState::Exhausted => exhausted += 1,
            _ => {}
        }

        for attempt in &status.attempts {
            let channel = by_channel.entry(attempt.channel).or_default();
            channel.attempts += 1;
            match attempt.outcome {
                AttemptOutcome::Success => channel.successes += 1,
                AttemptOutcome::TransientFailure => channel.transient_failures += 1,
                AttemptOutcome::PermanentFailure => channel.permanent_failures += 1,
            }
        }
    }

    for channel in by_channel.values_mut() {
        channel.success_rate = ratio(channel.successes, channel.attempts);
    }

    DeliveryStats {
        total,
        by_state,
        by_channel,
        mean_attempts_to_success: (delivered > 0)
            .then(|| attempts_on_delivered as f64 / delivered as f64),
        success_rate: (delivered + exhausted > 0).then(|| ratio(delivered, delivered + exhausted)),
    }
}
