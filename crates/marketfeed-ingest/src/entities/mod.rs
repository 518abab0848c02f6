//! Entity registry and row mapping
//!
//! The four dataset kinds the remote API serves, as a closed registry.
//! Each entity has a typed storage row implementing [`StorageRow`]: lenient
//! mapping from the raw API record, the natural key used for deduplication,
//! and the binding order for multi-row inserts. Unknown endpoint names are
//! rejected at parse time with a typed error, not at lookup time.

pub mod income;
pub mod order;
pub mod sale;
pub mod stock;

pub use income::IncomeRow;
pub use order::OrderRow;
pub use sale::SaleRow;
pub use stock::StockRow;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{query_builder::Separated, Postgres};

use crate::error::IngestError;

/// A dataset kind: endpoint name, target table, row mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Stocks,
    Incomes,
    Sales,
    Orders,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Stocks,
        EntityType::Incomes,
        EntityType::Sales,
        EntityType::Orders,
    ];

    /// Path segment on the remote API.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EntityType::Stocks => "stocks",
            EntityType::Incomes => "incomes",
            EntityType::Sales => "sales",
            EntityType::Orders => "orders",
        }
    }

    /// Target table in the storage sink.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::Stocks => "stocks",
            EntityType::Incomes => "incomes",
            EntityType::Sales => "sales",
            EntityType::Orders => "orders",
        }
    }

    /// Resolve an endpoint name from user input.
    pub fn from_endpoint(name: &str) -> Result<Self, IngestError> {
        match name {
            "stocks" => Ok(EntityType::Stocks),
            "incomes" => Ok(EntityType::Incomes),
            "sales" => Ok(EntityType::Sales),
            "orders" => Ok(EntityType::Orders),
            other => Err(IngestError::UnknownEndpoint(other.to_string())),
        }
    }

    /// The remote serves stock snapshots for the current day only, so date
    /// ranges for this entity are pinned to today at orchestration time.
    pub fn pins_date_to_today(&self) -> bool {
        matches!(self, EntityType::Stocks)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Capability interface implemented by each entity's storage row.
pub trait StorageRow: Sized + Send + Sync + Clone {
    /// Target table name.
    const TABLE: &'static str;
    /// Comma-separated column list matching [`StorageRow::push_bind`] order,
    /// without the timestamp columns (attached by the store).
    const COLUMNS: &'static str;

    /// Map a raw API record. `None` means the record lacks its natural-key
    /// fields and is dropped (counted by the persister, never fatal).
    fn from_api(raw: &Value) -> Option<Self>;

    /// Dedup identity; mirrors the unique index on [`StorageRow::TABLE`].
    fn natural_key(&self) -> String;

    /// Bind this row's values, in `COLUMNS` order.
    fn push_bind(&self, b: &mut Separated<'_, '_, Postgres, &'static str>);

    /// Wrap a homogeneous row vector into the tagged batch type.
    fn into_batch(rows: Vec<Self>) -> RowBatch;
}

/// A chunk of mapped rows, tagged by entity so the storage seam can stay
/// object-safe while inserts remain statically typed.
#[derive(Debug, Clone)]
pub enum RowBatch {
    Stocks(Vec<StockRow>),
    Incomes(Vec<IncomeRow>),
    Sales(Vec<SaleRow>),
    Orders(Vec<OrderRow>),
}

impl RowBatch {
    pub fn entity(&self) -> EntityType {
        match self {
            RowBatch::Stocks(_) => EntityType::Stocks,
            RowBatch::Incomes(_) => EntityType::Incomes,
            RowBatch::Sales(_) => EntityType::Sales,
            RowBatch::Orders(_) => EntityType::Orders,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowBatch::Stocks(rows) => rows.len(),
            RowBatch::Incomes(rows) => rows.len(),
            RowBatch::Sales(rows) => rows.len(),
            RowBatch::Orders(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn natural_keys(&self) -> Vec<String> {
        match self {
            RowBatch::Stocks(rows) => rows.iter().map(StorageRow::natural_key).collect(),
            RowBatch::Incomes(rows) => rows.iter().map(StorageRow::natural_key).collect(),
            RowBatch::Sales(rows) => rows.iter().map(StorageRow::natural_key).collect(),
            RowBatch::Orders(rows) => rows.iter().map(StorageRow::natural_key).collect(),
        }
    }
}

// Lenient field extraction. The remote's records are hand-assembled JSON;
// numbers occasionally arrive as strings and vice versa.

pub(crate) fn str_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn i64_field(raw: &Value, key: &str) -> Option<i64> {
    match raw.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn f64_field(raw: &Value, key: &str) -> Option<f64> {
    match raw.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn bool_field(raw: &Value, key: &str) -> Option<bool> {
    match raw.get(key) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

/// Accepts "2026-08-06" as well as longer timestamps with a date prefix.
pub(crate) fn date_field(raw: &Value, key: &str) -> Option<NaiveDate> {
    let s = str_field(raw, key)?;
    let prefix = s.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Accepts "2026-08-06T10:48:52" and bare dates (midnight).
pub(crate) fn datetime_field(raw: &Value, key: &str) -> Option<NaiveDateTime> {
    let s = str_field(raw, key)?;
    NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| date_field(raw, key).and_then(|d| d.and_hms_opt(0, 0, 0)))
}
