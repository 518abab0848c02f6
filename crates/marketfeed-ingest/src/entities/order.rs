//! Order rows.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{query_builder::Separated, Postgres};

use super::{
    bool_field, date_field, datetime_field, f64_field, i64_field, str_field, RowBatch,
    StorageRow,
};

/// A placed order; `date` carries the order timestamp, not just the day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRow {
    pub g_number: String,
    pub date: NaiveDateTime,
    pub last_change_date: Option<NaiveDate>,
    pub supplier_article: Option<String>,
    pub tech_size: Option<String>,
    pub barcode: i64,
    pub total_price: Option<f64>,
    pub discount_percent: Option<i64>,
    pub warehouse_name: Option<String>,
    pub oblast: Option<String>,
    pub income_id: Option<i64>,
    pub odid: Option<String>,
    pub nm_id: Option<i64>,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub is_cancel: bool,
    pub cancel_dt: Option<NaiveDate>,
}

impl StorageRow for OrderRow {
    const TABLE: &'static str = "orders";
    const COLUMNS: &'static str = "g_number, date, last_change_date, supplier_article, \
        tech_size, barcode, total_price, discount_percent, warehouse_name, oblast, \
        income_id, odid, nm_id, subject, category, brand, is_cancel, cancel_dt";

    fn from_api(raw: &Value) -> Option<Self> {
        Some(Self {
            g_number: str_field(raw, "g_number")?,
            date: datetime_field(raw, "date")?,
            last_change_date: date_field(raw, "last_change_date"),
            supplier_article: str_field(raw, "supplier_article"),
            tech_size: str_field(raw, "tech_size"),
            barcode: i64_field(raw, "barcode")?,
            total_price: f64_field(raw, "total_price"),
            discount_percent: i64_field(raw, "discount_percent"),
            warehouse_name: str_field(raw, "warehouse_name"),
            oblast: str_field(raw, "oblast"),
            income_id: i64_field(raw, "income_id"),
            odid: str_field(raw, "odid"),
            nm_id: i64_field(raw, "nm_id"),
            subject: str_field(raw, "subject"),
            category: str_field(raw, "category"),
            brand: str_field(raw, "brand"),
            is_cancel: bool_field(raw, "is_cancel").unwrap_or(false),
            cancel_dt: date_field(raw, "cancel_dt"),
        })
    }

    fn natural_key(&self) -> String {
        format!("{}:{}", self.g_number, self.barcode)
    }

    fn push_bind(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.g_number.clone());
        b.push_bind(self.date);
        b.push_bind(self.last_change_date);
        b.push_bind(self.supplier_article.clone());
        b.push_bind(self.tech_size.clone());
        b.push_bind(self.barcode);
        b.push_bind(self.total_price);
        b.push_bind(self.discount_percent);
        b.push_bind(self.warehouse_name.clone());
        b.push_bind(self.oblast.clone());
        b.push_bind(self.income_id);
        b.push_bind(self.odid.clone());
        b.push_bind(self.nm_id);
        b.push_bind(self.subject.clone());
        b.push_bind(self.category.clone());
        b.push_bind(self.brand.clone());
        b.push_bind(self.is_cancel);
        b.push_bind(self.cancel_dt);
    }

    fn into_batch(rows: Vec<Self>) -> RowBatch {
        RowBatch::Orders(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_api_parses_order_timestamp() {
        let raw = json!({
            "g_number": "G-7",
            "date": "2026-08-02T14:30:00",
            "barcode": 900,
            "is_cancel": false
        });
        let row = OrderRow::from_api(&raw).unwrap();
        assert_eq!(row.date.format("%H:%M").to_string(), "14:30");
        assert_eq!(row.natural_key(), "G-7:900");
        assert!(!row.is_cancel);
    }

    #[test]
    fn test_from_api_is_cancel_defaults_false() {
        let raw = json!({"g_number": "G-8", "date": "2026-08-02", "barcode": 1});
        let row = OrderRow::from_api(&raw).unwrap();
        assert!(!row.is_cancel);
    }

    #[test]
    fn test_from_api_requires_g_number() {
        let raw = json!({"date": "2026-08-02", "barcode": 1});
        assert!(OrderRow::from_api(&raw).is_none());
    }
}
