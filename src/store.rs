//! Persistence for alert dismissals.
//!
//! The pipeline only loads the full map, upserts one key, and prunes by age.
//! Records live in PostgreSQL when a database is configured, otherwise in
//! process memory.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::alerts::{
    record_dismissal, sweep_expired, AlertConditionKey, DismissalRecord, Dismissals,
};

// ---

#[derive(Debug, sqlx::FromRow)]
struct DismissalRow {
    content_hash: String,
    dismissed_at: DateTime<Utc>,
    dismiss_count: i32,
}

#[derive(Debug)]
pub enum DismissalStore {
    Memory(Mutex<Dismissals>),
    Postgres(PgPool),
}

impl DismissalStore {
    // ---
    pub fn memory() -> Self {
        DismissalStore::Memory(Mutex::new(Dismissals::new()))
    }

    pub fn postgres(pool: PgPool) -> Self {
        DismissalStore::Postgres(pool)
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            DismissalStore::Memory(_) => "memory",
            DismissalStore::Postgres(_) => "postgres",
        }
    }

    /// Every dismissal record currently stored.
    pub async fn load_all(&self) -> Result<Dismissals> {
        // ---
        match self {
            DismissalStore::Memory(map) => Ok(map.lock().await.clone()),
            DismissalStore::Postgres(pool) => {
                let rows: Vec<DismissalRow> = sqlx::query_as(
                    r#"
                    SELECT content_hash, dismissed_at, dismiss_count
                    FROM dismissed_alerts
                    "#,
                )
                .fetch_all(pool)
                .await?;

                Ok(rows
                    .into_iter()
                    .map(|row| {
                        (
                            AlertConditionKey::from_hex(row.content_hash),
                            DismissalRecord {
                                dismissed_at: row.dismissed_at,
                                count: u32::try_from(row.dismiss_count).unwrap_or(0),
                            },
                        )
                    })
                    .collect())
            }
        }
    }

    /// Record a dismissal of `key` at `now`, incrementing its count.
    pub async fn dismiss(
        &self,
        key: &AlertConditionKey,
        now: DateTime<Utc>,
    ) -> Result<DismissalRecord> {
        // ---
        match self {
            DismissalStore::Memory(map) => {
                let mut map = map.lock().await;
                Ok(record_dismissal(&mut map, key.clone(), now))
            }
            DismissalStore::Postgres(pool) => {
                let row: DismissalRow = sqlx::query_as(
                    r#"
                    INSERT INTO dismissed_alerts (content_hash, dismissed_at, dismiss_count)
                    VALUES ($1, $2, 1)
                    ON CONFLICT (content_hash) DO UPDATE SET
                        dismissed_at  = EXCLUDED.dismissed_at,
                        dismiss_count = dismissed_alerts.dismiss_count + 1
                    RETURNING content_hash, dismissed_at, dismiss_count
                    "#,
                )
                .bind(key.as_str())
                .bind(now)
                .fetch_one(pool)
                .await?;

                Ok(DismissalRecord {
                    dismissed_at: row.dismissed_at,
                    count: u32::try_from(row.dismiss_count).unwrap_or(0),
                })
            }
        }
    }

    /// Delete records dismissed at least `max_age` before `now`.
    pub async fn prune_older_than(&self, now: DateTime<Utc>, max_age: Duration) -> Result<u64> {
        // ---
        match self {
            DismissalStore::Memory(map) => {
                let mut map = map.lock().await;
                Ok(sweep_expired(&mut map, now, max_age) as u64)
            }
            DismissalStore::Postgres(pool) => {
                let result = sqlx::query("DELETE FROM dismissed_alerts WHERE dismissed_at <= $1")
                    .bind(now - max_age)
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;
    use tokio_test::assert_ok;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_round() {
        // ---
        let store = DismissalStore::memory();
        let key = AlertConditionKey::from_hex("feed");

        assert_ok!(store.dismiss(&key, now()).await);
        let record = assert_ok!(store.dismiss(&key, now() + Duration::minutes(1)).await);
        assert_eq!(record.count, 2);

        let all = assert_ok!(store.load_all().await);
        assert_eq!(all.get(&key), Some(&record));
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_memory_store_prune() {
        // ---
        let store = DismissalStore::memory();
        let old = AlertConditionKey::from_hex("old");
        assert_ok!(store.dismiss(&old, now() - Duration::days(10)).await);
        assert_ok!(store.dismiss(&AlertConditionKey::from_hex("new"), now()).await);

        let removed = assert_ok!(store.prune_older_than(now(), Duration::days(7)).await);
        assert_eq!(removed, 1);
        assert_eq!(assert_ok!(store.load_all().await).len(), 1);
    }
}
