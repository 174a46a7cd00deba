use approvals_models::{
    HistoryEntry, HistoryEvent, InstanceStatus, InstanceSummary, WorkflowInput, WorkflowInstance,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{check_transition, InstanceStore};
use crate::error::StoreError;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS approvals",
    r#"
    CREATE TABLE IF NOT EXISTS approvals.instances (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        input JSONB NOT NULL,
        correlation_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS approvals.history (
        instance_id TEXT NOT NULL REFERENCES approvals.instances (id),
        sequence_number BIGINT NOT NULL,
        event JSONB NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (instance_id, sequence_number)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_instances_status ON approvals.instances (status)",
];

/// PostgreSQL-backed store.
///
/// Each mutation runs in its own transaction that takes a row lock on the
/// instance (`SELECT ... FOR UPDATE`), so writers on the same id are
/// serialized even across processes. The call returns only after commit.
#[derive(Debug, Clone)]
pub struct PostgresInstanceStore {
    pool: PgPool,
}

impl PostgresInstanceStore {
    pub async fn connect(db_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `approvals` schema and tables if they don't exist
    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("✓ Instance store schema ready");
        Ok(())
    }

    async fn lock_status(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: &str,
    ) -> Result<InstanceStatus, StoreError> {
        let row = sqlx::query("SELECT status FROM approvals.instances WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        parse_status(id, row.try_get("status")?)
    }
}

fn parse_status(id: &str, raw: String) -> Result<InstanceStatus, StoreError> {
    raw.parse().map_err(|e: approvals_models::ParseStatusError| StoreError::Corrupt {
        id: id.to_string(),
        message: e.to_string(),
    })
}

fn history_entry(row: &PgRow) -> Result<HistoryEntry, StoreError> {
    let sequence_number: i64 = row.try_get("sequence_number")?;
    let Json(event): Json<HistoryEvent> = row.try_get("event")?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

    Ok(HistoryEntry {
        sequence_number: sequence_number as u64,
        recorded_at,
        event,
    })
}

#[async_trait]
impl InstanceStore for PostgresInstanceStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn create(&self, id: &str, input: &WorkflowInput) -> Result<WorkflowInstance, StoreError> {
        let instance = WorkflowInstance::new(id, input.clone(), Utc::now());

        let inserted = sqlx::query(
            r#"
            INSERT INTO approvals.instances
            (id, status, input, correlation_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&instance.id)
        .bind(instance.status.as_str())
        .bind(Json(&instance.input))
        .bind(&instance.correlation_id)
        .bind(instance.created_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(_) => Ok(instance),
            None => Err(StoreError::DuplicateInstance(id.to_string())),
        }
    }

    async fn load(&self, id: &str) -> Result<WorkflowInstance, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, status, input, correlation_id, created_at, updated_at
            FROM approvals.instances
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let Json(input): Json<WorkflowInput> = row.try_get("input")?;

        let history = sqlx::query(
            r#"
            SELECT sequence_number, event, recorded_at
            FROM approvals.history
            WHERE instance_id = $1
            ORDER BY sequence_number
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(history_entry)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(WorkflowInstance {
            id: row.try_get("id")?,
            status: parse_status(id, row.try_get("status")?)?,
            input,
            correlation_id: row.try_get("correlation_id")?,
            history,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn append_history(&self, id: &str, event: HistoryEvent) -> Result<HistoryEntry, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_status(&mut tx, id).await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_number) + 1, 0) FROM approvals.history WHERE instance_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO approvals.history (instance_id, sequence_number, event, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(next)
        .bind(Json(&event))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE approvals.instances SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(HistoryEntry {
            sequence_number: next as u64,
            recorded_at: now,
            event,
        })
    }

    async fn set_status(&self, id: &str, status: InstanceStatus) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_status(&mut tx, id).await?;
        check_transition(id, current, status)?;

        sqlx::query("UPDATE approvals.instances SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<InstanceSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.status, i.correlation_id, i.created_at, i.updated_at,
                   (SELECT h.event->>'error'
                    FROM approvals.history h
                    WHERE h.instance_id = i.id
                      AND h.event->>'type' = 'orchestration_failed'
                    ORDER BY h.sequence_number DESC
                    LIMIT 1) AS last_error
            FROM approvals.instances i
            WHERE $1::text IS NULL OR i.status = $1
            ORDER BY i.created_at DESC, i.id
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<InstanceSummary, StoreError> {
                let id: String = row.try_get("id")?;
                let status = parse_status(&id, row.try_get("status")?)?;
                Ok(InstanceSummary {
                    status,
                    correlation_id: row.try_get("correlation_id")?,
                    last_error: row.try_get("last_error")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                    id,
                })
            })
            .collect()
    }
}
