//! Postgres storage sink
//!
//! Multi-row `INSERT ... ON CONFLICT DO NOTHING` per chunk. Every entity
//! table carries a unique index over its natural key (see migrations), so
//! `rows_affected` is the inserted count and the remainder were duplicates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::entities::{RowBatch, StorageRow};
use crate::error::Result;

use super::{EntityStore, InsertStats};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn insert_rows<R: StorageRow>(pool: &PgPool, rows: &[R]) -> Result<InsertStats> {
    if rows.is_empty() {
        return Ok(InsertStats::default());
    }

    let now: DateTime<Utc> = Utc::now();
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} ({}, created_at, updated_at) ",
        R::TABLE,
        R::COLUMNS
    ));

    builder.push_values(rows.iter(), |mut b, row| {
        row.push_bind(&mut b);
        b.push_bind(now);
        b.push_bind(now);
    });
    builder.push(" ON CONFLICT DO NOTHING");

    let result = builder.build().execute(pool).await?;
    let inserted = result.rows_affected();

    Ok(InsertStats {
        inserted,
        skipped: rows.len() as u64 - inserted,
    })
}

#[async_trait]
impl EntityStore for PgStore {
    async fn insert_ignore(&self, batch: RowBatch) -> Result<InsertStats> {
        match batch {
            RowBatch::Stocks(rows) => insert_rows(&self.pool, &rows).await,
            RowBatch::Incomes(rows) => insert_rows(&self.pool, &rows).await,
            RowBatch::Sales(rows) => insert_rows(&self.pool, &rows).await,
            RowBatch::Orders(rows) => insert_rows(&self.pool, &rows).await,
        }
    }
}
