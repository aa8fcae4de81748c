use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Side, Signal, SignalStatus};
use crate::store::SignalStore;

const SIGNAL_COLUMNS: &str = "id, symbol, side, reference_price, quantity, status, message, \
                              order_id, created_at, updated_at, version";

/// Postgres persistence for signals
pub struct PostgresSignalStore {
    pool: PgPool,
}

impl PostgresSignalStore {
    /// Connect to Postgres and apply pending migrations
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    /// Number of signals per status, for the startup summary
    pub async fn status_counts(&self) -> Result<Vec<(SignalStatus, i64)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM signals
            GROUP BY status
            ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                let count: i64 = row.get("count");
                let status = status.parse().map_err(StoreError::Corrupt)?;
                Ok((status, count))
            })
            .collect()
    }

    /// Delete every signal (test helper)
    pub async fn clear_all_signals(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM signals")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn signal_from_row(row: &PgRow) -> Result<Signal, StoreError> {
    let side: String = row.get("side");
    let status: String = row.get("status");

    Ok(Signal {
        id: row.get("id"),
        symbol: row.get("symbol"),
        side: side.parse::<Side>().map_err(StoreError::Corrupt)?,
        reference_price: row.get("reference_price"),
        quantity: row.get::<Decimal, _>("quantity"),
        status: status.parse::<SignalStatus>().map_err(StoreError::Corrupt)?,
        message: row.get("message"),
        order_id: row.get("order_id"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        version: row.get("version"),
    })
}

#[async_trait]
impl SignalStore for PostgresSignalStore {
    async fn insert(&self, signal: &Signal) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, side, reference_price, quantity, status,
                message, order_id, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(signal.id)
        .bind(&signal.symbol)
        .bind(signal.side.as_str())
        .bind(signal.reference_price)
        .bind(signal.quantity)
        .bind(signal.status.as_str())
        .bind(&signal.message)
        .bind(signal.order_id)
        .bind(signal.created_at)
        .bind(signal.updated_at)
        .bind(signal.version)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!("Saved signal {} for {} to Postgres", signal.id, signal.symbol);
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Duplicate(signal.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Signal>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM signals WHERE id = $1", SIGNAL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(signal_from_row).transpose()
    }

    async fn find_by_status(&self, statuses: &[SignalStatus]) -> Result<Vec<Signal>, StoreError> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();

        let rows = sqlx::query(&format!(
            "SELECT {} FROM signals WHERE status = ANY($1) ORDER BY created_at ASC",
            SIGNAL_COLUMNS
        ))
        .bind(&statuses[..])
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(signal_from_row).collect()
    }

    async fn transition(
        &self,
        signal: &Signal,
        expected: SignalStatus,
    ) -> Result<Option<Signal>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE signals SET
                quantity = $1,
                status = $2,
                message = $3,
                order_id = $4,
                updated_at = $5,
                version = version + 1
            WHERE id = $6 AND status = $7 AND version = $8
            RETURNING {}
            "#,
            SIGNAL_COLUMNS
        ))
        .bind(signal.quantity)
        .bind(signal.status.as_str())
        .bind(&signal.message)
        .bind(signal.order_id)
        .bind(signal.updated_at)
        .bind(signal.id)
        .bind(expected.as_str())
        .bind(signal.version)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(signal_from_row).transpose()
    }
}
