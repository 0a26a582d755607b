//! Notification registry.
//!
//! Maps notification id to its immutable request and mutable delivery status.
//! Every mutation of one notification goes through that notification's own
//! lock, so a submission-time attempt, a worker retry, a manual retry and a
//! cancel can never interleave their writes. The sharded map itself is only
//! held long enough to clone the entry handle out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use herald_common::types::{DeliveryAttempt, DeliveryState, DeliveryStatus, NotificationRequest};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::store::NotificationStore;

/// One registered notification.
#[derive(Debug)]
pub struct Entry {
    pub request: Arc<NotificationRequest>,
    pub status: DeliveryStatus,
}

type Handle = Arc<Mutex<Entry>>;

pub struct NotificationRegistry {
    entries: DashMap<Uuid, Handle>,
    store: Arc<dyn NotificationStore>,
}

impl NotificationRegistry {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self {
            entries: DashMap::new(),
            store,
        }
    }

    /// Load every stored notification. Records caught mid-attempt by a crash
    /// are due again immediately; the provider may see that attempt twice.
    pub async fn restore(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let rows = self.store.load_all().await?;
        let mut requeued = 0;

        for (request, mut status) in rows {
            if status.state == DeliveryState::InProgress {
                status.state = DeliveryState::FailedRetrying;
                status.next_attempt_at = Some(now);
                status.updated_at = now;
                requeued += 1;
                if let Err(e) = self.store.save_status(&status).await {
                    tracing::warn!(notification_id = %status.notification_id, error = %e, "Failed to persist requeued notification");
                }
            }
            self.entries.insert(
                request.id,
                Arc::new(Mutex::new(Entry {
                    request: Arc::new(request),
                    status,
                })),
            );
        }

        tracing::info!(
            restored = self.entries.len(),
            requeued,
            "Notification registry restored"
        );
        Ok(self.entries.len())
    }

    /// Register a new notification in `pending`.
    pub async fn create(&self, request: NotificationRequest) -> Result<DeliveryStatus, DeliveryError> {
        self.create_with(request, |status, _| status.clone()).await
    }

    /// Register a new notification and run `f` on its fresh status before any
    /// other caller can observe it. The result of `f` is what gets stored.
    pub async fn create_with<T, F>(&self, request: NotificationRequest, f: F) -> Result<T, DeliveryError>
    where
        F: FnOnce(&mut DeliveryStatus, &NotificationRequest) -> T,
    {
        let id = request.id;
        let request = Arc::new(request);
        let handle = Arc::new(Mutex::new(Entry {
            request: request.clone(),
            status: DeliveryStatus::pending(&request),
        }));

        // Locked before it becomes visible; never contended.
        let mut entry = handle.lock().await;
        match self.entries.entry(id) {
            MapEntry::Occupied(_) => {
                return Err(DeliveryError::InvalidRequest(format!(
                    "notification {} already exists",
                    id
                )));
            }
            MapEntry::Vacant(slot) => {
                slot.insert(handle.clone());
            }
        }

        let value = f(&mut entry.status, request.as_ref());
        if let Err(e) = self.store.insert(&request, &entry.status).await {
            tracing::warn!(notification_id = %id, error = %e, "Failed to persist new notification");
        }
        Ok(value)
    }

    fn handle(&self, id: Uuid) -> Result<Handle, DeliveryError> {
        self.entries
            .get(&id)
            .map(|h| h.value().clone())
            .ok_or(DeliveryError::NotFound(id))
    }

    /// Run `f` under the notification's lock. When `f` succeeds, the status is
    /// written through to the store before the lock is released.
    pub async fn update<T, F>(&self, id: Uuid, f: F) -> Result<T, DeliveryError>
    where
        F: FnOnce(&mut DeliveryStatus, &NotificationRequest) -> Result<T, DeliveryError>,
    {
        let handle = self.handle(id)?;
        let mut entry = handle.lock().await;
        let Entry { request, status } = &mut *entry;
        let value = f(status, request.as_ref())?;

        if let Err(e) = self.store.save_status(status).await {
            tracing::warn!(notification_id = %id, error = %e, "Failed to persist delivery status");
        }
        Ok(value)
    }

    /// Append `attempt` to its notification's history through `apply`, which
    /// also drives whatever state transition the outcome causes.
    pub async fn record_attempt<T, F>(&self, attempt: DeliveryAttempt, apply: F) -> Result<T, DeliveryError>
    where
        F: FnOnce(&mut DeliveryStatus, DeliveryAttempt) -> T,
    {
        self.update(attempt.notification_id, |status, _| Ok(apply(status, attempt)))
            .await
    }

    /// Current status snapshot, reflecting every completed write.
    pub async fn get_status(&self, id: Uuid) -> Result<DeliveryStatus, DeliveryError> {
        let handle = self.handle(id)?;
        let entry = handle.lock().await;
        Ok(entry.status.clone())
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Arc<NotificationRequest>, DeliveryError> {
        let handle = self.handle(id)?;
        let entry = handle.lock().await;
        Ok(entry.request.clone())
    }

    fn handles(&self) -> Vec<(Uuid, Handle)> {
        self.entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Every status, optionally filtered by state, newest first.
    pub async fn list_by_status(&self, state: Option<DeliveryState>) -> Vec<DeliveryStatus> {
        let mut statuses = Vec::new();
        for (_, handle) in self.handles() {
            let entry = handle.lock().await;
            if state.is_none_or(|s| entry.status.state == s) {
                statuses.push(entry.status.clone());
            }
        }
        statuses.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.notification_id.cmp(&a.notification_id))
        });
        statuses
    }

    /// Ids whose next attempt is due at `now`, oldest deadline first.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut due = Vec::new();
        for (id, handle) in self.handles() {
            let entry = handle.lock().await;
            if entry.status.is_due(now)
                && let Some(at) = entry.status.next_attempt_at
            {
                due.push((at, id));
            }
        }
        due.sort();
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Remove terminal notifications last updated more than `age` before
    /// `now`. Non-terminal notifications are never removed, however old.
    pub async fn purge_older_than(&self, age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - age;
        let mut purged = Vec::new();

        for (id, handle) in self.handles() {
            let entry = handle.lock().await;
            if entry.status.is_terminal() && entry.status.updated_at < cutoff {
                // Removed while locked: a concurrent writer either finished
                // before us or will fail to find the id.
                self.entries.remove(&id);
                purged.push(id);
            }
        }

        if !purged.is_empty() {
            if let Err(e) = self.store.delete(&purged).await {
                tracing::warn!(count = purged.len(), error = %e, "Failed to delete purged notifications from store");
            }
            tracing::info!(count = purged.len(), "Purged terminal notifications");
        }
        purged.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }
}
