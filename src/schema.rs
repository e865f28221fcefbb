//! Database schema management for `greenhouse-telemetry`.
//!
//! Only dismissal records are persisted. Applied once on startup from
//! `main.rs` when `DATABASE_URL` is set.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the dismissal table and its age index (idempotent).
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Keyed by the alert condition digest, never by the per-batch alert id
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dismissed_alerts (
            content_hash   TEXT        PRIMARY KEY,
            dismissed_at   TIMESTAMPTZ NOT NULL,
            dismiss_count  INTEGER     NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // The age sweep scans by dismissal time
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_dismissed_alerts_dismissed_at
            ON dismissed_alerts (dismissed_at);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
