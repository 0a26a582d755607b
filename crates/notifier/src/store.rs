//! Durable backing for the notification registry.
//!
//! The registry is authoritative in memory and writes through to a
//! [`NotificationStore`] after every mutation. At startup it restores from the
//! store.

use async_trait::async_trait;
use dashmap::DashMap;
use herald_common::types::{DeliveryStatus, NotificationRequest};
use sqlx::{PgConnection, PgPool};
use sqlx::types::Json;
use uuid::Uuid;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a newly accepted notification.
    async fn insert(
        &self,
        request: &NotificationRequest,
        status: &DeliveryStatus,
    ) -> anyhow::Result<()>;

    /// Persist the latest status, including any new attempts.
    async fn save_status(&self, status: &DeliveryStatus) -> anyhow::Result<()>;

    /// Everything stored, for restore at startup.
    async fn load_all(&self) -> anyhow::Result<Vec<(NotificationRequest, DeliveryStatus)>>;

    /// Remove notifications and their attempts. Returns how many were removed.
    async fn delete(&self, ids: &[Uuid]) -> anyhow::Result<u64>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<Uuid, (NotificationRequest, DeliveryStatus)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(
        &self,
        request: &NotificationRequest,
        status: &DeliveryStatus,
    ) -> anyhow::Result<()> {
        self.rows
            .insert(request.id, (request.clone(), status.clone()));
        Ok(())
    }

    async fn save_status(&self, status: &DeliveryStatus) -> anyhow::Result<()> {
        match self.rows.get_mut(&status.notification_id) {
            Some(mut row) => {
                row.1 = status.clone();
                Ok(())
            }
            None => anyhow::bail!("notification {} is not stored", status.notification_id),
        }
    }

    async fn load_all(&self) -> anyhow::Result<Vec<(NotificationRequest, DeliveryStatus)>> {
        Ok(self.rows.iter().map(|row| row.value().clone()).collect())
    }

    async fn delete(&self, ids: &[Uuid]) -> anyhow::Result<u64> {
        Ok(ids.iter().filter(|id| self.rows.remove(*id).is_some()).count() as u64)
    }
}

/// PostgreSQL store. Request and status are kept as JSONB; attempts are also
/// appended to `delivery_attempts` for querying. Each write is one transaction.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Append the attempts not yet in `delivery_attempts`. Attempts are
/// append-only, so the stored count is where the new ones start.
async fn append_attempts(tx: &mut PgConnection, status: &DeliveryStatus) -> anyhow::Result<()> {
    let (stored,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM delivery_attempts WHERE notification_id = $1")
            .bind(status.notification_id)
            .fetch_one(&mut *tx)
            .await?;

    let start = usize::try_from(stored).unwrap_or(0);
    for (seq, attempt) in status.attempts.iter().enumerate().skip(start) {
        sqlx::query(
            r#"
            INSERT INTO delivery_attempts
                (notification_id, seq, channel, attempt_number, attempted_at, outcome, provider_message_id, error_detail)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (notification_id, seq) DO NOTHING
            "#,
        )
        .bind(status.notification_id)
        .bind(seq as i32)
        .bind(attempt.channel.to_string())
        .bind(attempt.attempt_number as i32)
        .bind(attempt.attempted_at)
        .bind(attempt.outcome.to_string())
        .bind(&attempt.provider_message_id)
        .bind(&attempt.error_detail)
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(
        &self,
        request: &NotificationRequest,
        status: &DeliveryStatus,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO notifications (id, state, request, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(request.id)
        .bind(status.state.to_string())
        .bind(Json(request))
        .bind(Json(status))
        .bind(status.created_at)
        .bind(status.updated_at)
        .execute(&mut *tx)
        .await?;
        append_attempts(&mut tx, status).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save_status(&self, status: &DeliveryStatus) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE notifications SET state = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(status.notification_id)
        .bind(status.state.to_string())
        .bind(Json(status))
        .bind(status.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("notification {} is not stored", status.notification_id);
        }
        append_attempts(&mut tx, status).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_all(&self) -> anyhow::Result<Vec<(NotificationRequest, DeliveryStatus)>> {
        let rows: Vec<(Json<NotificationRequest>, Json<DeliveryStatus>)> =
            sqlx::query_as("SELECT request, status FROM notifications ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(request, status)| (request.0, status.0))
            .collect())
    }

    async fn delete(&self, ids: &[Uuid]) -> anyhow::Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM notifications WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use herald_common::payload::{EventKind, EventPayload};
    use herald_common::types::{
        AttemptOutcome, ChannelKind, DeliveryAttempt, DeliveryState, RecipientContact,
    };

    use super::*;

    fn request() -> NotificationRequest {
        NotificationRequest {
            id: Uuid::new_v4(),
            recipient: RecipientContact::default(),
            channels: vec![ChannelKind::Email],
            payload: EventPayload::new(EventKind::FollowUp),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let request = request();
        let mut status = DeliveryStatus::pending(&request);
        store.insert(&request, &status).await.unwrap();

        status.state = DeliveryState::Delivered;
        store.save_status(&status).await.unwrap();

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.state, DeliveryState::Delivered);

        assert_eq!(store.delete(&[request.id, Uuid::new_v4()]).await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_rejects_unknown_status() {
        let store = MemoryStore::new();
        let status = DeliveryStatus::pending(&request());
        assert!(store.save_status(&status).await.is_err());
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_store_round_trip(pool: PgPool) {
        let store = PgStore::new(pool);
        let request = request();
        let mut status = DeliveryStatus::pending(&request);
        store.insert(&request, &status).await.unwrap();

        status.state = DeliveryState::Exhausted;
        store.save_status(&status).await.unwrap();

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, request);
        assert_eq!(rows[0].1.state, DeliveryState::Exhausted);

        assert_eq!(store.delete(&[request.id]).await.unwrap(), 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_pg_store_appends_new_attempts_only(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let request = request();
        let mut status = DeliveryStatus::pending(&request);
        store.insert(&request, &status).await.unwrap();

        for number in 1..=2 {
            status.attempts.push(DeliveryAttempt {
                notification_id: request.id,
                channel: ChannelKind::Email,
                attempt_number: number,
                attempted_at: Utc::now(),
                outcome: AttemptOutcome::TransientFailure,
                provider_message_id: None,
                error_detail: Some("HTTP 503".to_string()),
            });
            store.save_status(&status).await.unwrap();
        }
        store.save_status(&status).await.unwrap();

        let rows: Vec<(i32, i32)> = sqlx::query_as(
            "SELECT seq, attempt_number FROM delivery_attempts WHERE notification_id = $1 ORDER BY seq",
        )
        .bind(request.id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows, vec![(0, 1), (1, 2)]);
    }
}
