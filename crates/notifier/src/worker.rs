//! Background retry loop.
//!
//! Scans the registry every `scan_interval` (or sooner, when the engine
//! signals a fallback), dispatches everything that is due with at most
//! `max_in_flight` attempts running at once, then purges expired terminal
//! notifications.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::DeliveryEngine;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Counts from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub dispatched: usize,
    pub failed: usize,
    pub purged: usize,
}

pub struct DeliveryWorker {
    engine: Arc<DeliveryEngine>,
    scan_interval: Duration,
    max_in_flight: usize,
    retention: Duration,
}

impl DeliveryWorker {
    pub fn new(engine: Arc<DeliveryEngine>) -> Self {
        Self {
            engine,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Run until `shutdown` is cancelled. A scan in progress is finished
    /// before returning.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            max_in_flight = self.max_in_flight,
            "Delivery worker started"
        );

        loop {
            let report = self.scan_once().await;
            if report != ScanReport::default() {
                tracing::debug!(
                    dispatched = report.dispatched,
                    failed = report.failed,
                    purged = report.purged,
                    "Scan complete"
                );
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.scan_interval) => {}
                _ = self.engine.notified() => {}
            }
        }

        tracing::info!("Delivery worker stopped");
    }

    /// Dispatch every due notification once, then purge. One dispatch
    /// failing or panicking never stops the others.
    pub async fn scan_once(&self) -> ScanReport {
        let now = self.engine.now();
        let due = self.engine.registry().due(now).await;
        let mut report = ScanReport::default();

        let mut tasks: JoinSet<(Uuid, bool)> = JoinSet::new();
        for id in due {
            if tasks.len() >= self.max_in_flight
                && let Some(joined) = tasks.join_next().await
            {
                report.record(joined);
            }

            let engine = self.engine.clone();
            tasks.spawn(async move {
                match engine.dispatch(id).await {
                    Ok(_) => (id, true),
                    Err(e) => {
                        tracing::warn!(notification_id = %id, error = %e, "Scheduled dispatch failed");
                        (id, false)
                    }
                }
            });
            report.dispatched += 1;
        }
        while let Some(joined) = tasks.join_next().await {
            report.record(joined);
        }

        if let Ok(retention) = chrono::Duration::from_std(self.retention) {
            report.purged = self
                .engine
                .registry()
                .purge_older_than(retention, self.engine.now())
                .await;
        }
        report
    }
}

impl ScanReport {
    fn record(&mut self, joined: Result<(Uuid, bool), tokio::task::JoinError>) {
        match joined {
            Ok((_, true)) => {}
            Ok((_, false)) => self.failed += 1,
            Err(e) => {
                self.failed += 1;
                if e.is_panic() {
                    tracing::error!(error = ?e, "Dispatch task panicked");
                } else {
                    tracing::error!(error = ?e, "Dispatch task cancelled");
                }
            }
        }
    }
}
