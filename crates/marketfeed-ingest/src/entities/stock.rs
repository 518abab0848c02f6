//! Stock-level rows: one per (date, barcode, warehouse, nomenclature).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{query_builder::Separated, Postgres};

use super::{
    bool_field, date_field, f64_field, i64_field, str_field, RowBatch, StorageRow,
};

/// Warehouse stock snapshot for a single article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRow {
    pub date: NaiveDate,
    pub last_change_date: Option<NaiveDate>,
    pub supplier_article: Option<String>,
    pub tech_size: Option<String>,
    pub barcode: i64,
    pub quantity: i64,
    pub is_supply: Option<bool>,
    pub is_realization: Option<bool>,
    pub quantity_full: Option<i64>,
    pub warehouse_name: Option<String>,
    pub in_way_to_client: Option<i64>,
    pub in_way_from_client: Option<i64>,
    pub nm_id: Option<i64>,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub sc_code: Option<i64>,
    pub price: Option<f64>,
    pub discount: Option<i64>,
}

impl StorageRow for StockRow {
    const TABLE: &'static str = "stocks";
    const COLUMNS: &'static str = "date, last_change_date, supplier_article, tech_size, \
        barcode, quantity, is_supply, is_realization, quantity_full, warehouse_name, \
        in_way_to_client, in_way_from_client, nm_id, subject, category, brand, sc_code, \
        price, discount";

    fn from_api(raw: &Value) -> Option<Self> {
        Some(Self {
            date: date_field(raw, "date")?,
            last_change_date: date_field(raw, "last_change_date"),
            supplier_article: str_field(raw, "supplier_article"),
            tech_size: str_field(raw, "tech_size"),
            barcode: i64_field(raw, "barcode")?,
            quantity: i64_field(raw, "quantity").unwrap_or(0),
            is_supply: bool_field(raw, "is_supply"),
            is_realization: bool_field(raw, "is_realization"),
            quantity_full: i64_field(raw, "quantity_full"),
            warehouse_name: str_field(raw, "warehouse_name"),
            in_way_to_client: i64_field(raw, "in_way_to_client"),
            in_way_from_client: i64_field(raw, "in_way_from_client"),
            nm_id: i64_field(raw, "nm_id"),
            subject: str_field(raw, "subject"),
            category: str_field(raw, "category"),
            brand: str_field(raw, "brand"),
            sc_code: i64_field(raw, "sc_code"),
            price: f64_field(raw, "price"),
            discount: i64_field(raw, "discount"),
        })
    }

    fn natural_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.date,
            self.barcode,
            self.warehouse_name.as_deref().unwrap_or(""),
            self.nm_id.unwrap_or(0)
        )
    }

    fn push_bind(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.date);
        b.push_bind(self.last_change_date);
        b.push_bind(self.supplier_article.clone());
        b.push_bind(self.tech_size.clone());
        b.push_bind(self.barcode);
        b.push_bind(self.quantity);
        b.push_bind(self.is_supply);
        b.push_bind(self.is_realization);
        b.push_bind(self.quantity_full);
        b.push_bind(self.warehouse_name.clone());
        b.push_bind(self.in_way_to_client);
        b.push_bind(self.in_way_from_client);
        b.push_bind(self.nm_id);
        b.push_bind(self.subject.clone());
        b.push_bind(self.category.clone());
        b.push_bind(self.brand.clone());
        b.push_bind(self.sc_code);
        b.push_bind(self.price);
        b.push_bind(self.discount);
    }

    fn into_batch(rows: Vec<Self>) -> RowBatch {
        RowBatch::Stocks(rows)
    }
}
