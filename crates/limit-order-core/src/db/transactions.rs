//! PostgreSQL-backed transaction store.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{TransactionQuery, TransactionStore};
use crate::types::{TransactionRecord, TransactionStatus};
use crate::{Error, Result};

const SELECT_COLUMNS: &str = r#"
    SELECT id, maker, maker_asset, taker_asset, maker_symbol, taker_symbol,
           making_amount, taking_amount, limit_price, usd_value, order_hash,
           status, tx_hash, block_number, gas_used, gas_price, error,
           created_at, last_polled_at, updated_at
    FROM order_transactions
"#;

/// Repository for order transaction records.
#[derive(Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    maker: String,
    maker_asset: String,
    taker_asset: String,
    maker_symbol: String,
    taker_symbol: String,
    making_amount: Decimal,
    taking_amount: Decimal,
    limit_price: Option<Decimal>,
    usd_value: Option<Decimal>,
    order_hash: Option<String>,
    status: String,
    tx_hash: Option<String>,
    block_number: Option<i64>,
    gas_used: Option<i64>,
    gas_price: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    last_polled_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

fn column<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Store(format!("bad {} column '{}': {}", name, value, e)))
}

impl TransactionRow {
    fn into_record(self) -> Result<TransactionRecord> {
        Ok(TransactionRecord {
            id: self.id,
            maker: column::<Address>("maker", &self.maker)?,
            maker_asset: column::<Address>("maker_asset", &self.maker_asset)?,
            taker_asset: column::<Address>("taker_asset", &self.taker_asset)?,
            maker_symbol: self.maker_symbol,
            taker_symbol: self.taker_symbol,
            making_amount: self.making_amount,
            taking_amount: self.taking_amount,
            limit_price: self.limit_price,
            usd_value: self.usd_value,
            order_hash: self
                .order_hash
                .as_deref()
                .map(|h| column::<B256>("order_hash", h))
                .transpose()?,
            status: self.status.parse::<TransactionStatus>()?,
            tx_hash: self
                .tx_hash
                .as_deref()
                .map(|h| column::<B256>("tx_hash", h))
                .transpose()?,
            block_number: self.block_number.map(|b| b as u64),
            gas_used: self.gas_used.map(|g| g as u64),
            gas_price: self
                .gas_price
                .as_deref()
                .map(|p| column::<u128>("gas_price", p))
                .transpose()?,
            error: self.error,
            created_at: self.created_at,
            last_polled_at: self.last_polled_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn save(&self, record: &TransactionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_transactions (
                id, maker, maker_asset, taker_asset, maker_symbol, taker_symbol,
                making_amount, taking_amount, limit_price, usd_value, order_hash,
                status, tx_hash, block_number, gas_used, gas_price, error,
                created_at, last_polled_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(record.id)
        .bind(record.maker.to_string())
        .bind(record.maker_asset.to_string())
        .bind(record.taker_asset.to_string())
        .bind(&record.maker_symbol)
        .bind(&record.taker_symbol)
        .bind(record.making_amount)
        .bind(record.taking_amount)
        .bind(record.limit_price)
        .bind(record.usd_value)
        .bind(record.order_hash.map(|h| h.to_string()))
        .bind(record.status.as_str())
        .bind(record.tx_hash.map(|h| h.to_string()))
        .bind(record.block_number.map(|b| b as i64))
        .bind(record.gas_used.map(|g| g as i64))
        .bind(record.gas_price.map(|p| p.to_string()))
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.last_polled_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, record: &TransactionRecord) -> Result<()> {
        // Terminal rows only accept writes that keep their status.
        let result = sqlx::query(
            r#"
            UPDATE order_transactions SET
                usd_value = $2,
                order_hash = $3,
                status = $4,
                tx_hash = $5,
                block_number = $6,
                gas_used = $7,
                gas_price = $8,
                error = $9,
                last_polled_at = $10,
                updated_at = $11
            WHERE id = $1 AND (status = 'pending' OR status = $4)
            "#,
        )
        .bind(record.id)
        .bind(record.usd_value)
        .bind(record.order_hash.map(|h| h.to_string()))
        .bind(record.status.as_str())
        .bind(record.tx_hash.map(|h| h.to_string()))
        .bind(record.block_number.map(|b| b as i64))
        .bind(record.gas_used.map(|g| g as i64))
        .bind(record.gas_price.map(|p| p.to_string()))
        .bind(&record.error)
        .bind(record.last_polled_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(record.id).await? {
                Some(stored) => Err(Error::InvalidTransition {
                    from: stored.status.to_string(),
                    to: record.status.to_string(),
                }),
                None => Err(Error::Store(format!("record {} not found", record.id))),
            };
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TransactionRecord>> {
        self.query(&TransactionQuery::new()).await
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM order_transactions")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TransactionRecord>> {
        let sql = format!("{} WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransactionRow::into_record).transpose()
    }

    async fn query(&self, query: &TransactionQuery) -> Result<Vec<TransactionRecord>> {
        let mut sql = format!("{} WHERE 1=1", SELECT_COLUMNS);
        let mut param_count = 0;

        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${}", param_count));
        }
        if query.from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at >= ${}", param_count));
        }
        if query.to.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND created_at <= ${}", param_count));
        }

        sql.push_str(" ORDER BY created_at DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${}", param_count));
        }

        let mut builder = sqlx::query_as::<_, TransactionRow>(&sql);
        if let Some(status) = query.status {
            builder = builder.bind(status.as_str());
        }
        if let Some(from) = query.from {
            builder = builder.bind(from);
        }
        if let Some(to) = query.to {
            builder = builder.bind(to);
        }
        if let Some(limit) = query.limit {
            builder = builder.bind(limit as i64);
        }

        let rows = builder.fetch_all(&self.pool).await?;
        rows.into_iter().map(TransactionRow::into_record).collect()
    }
}
