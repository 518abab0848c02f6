//! Income (supply delivery) rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{query_builder::Separated, Postgres};

use super::{date_field, f64_field, i64_field, str_field, RowBatch, StorageRow};

/// One delivered position of a supply document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeRow {
    pub income_id: i64,
    pub number: Option<String>,
    pub date: NaiveDate,
    pub last_change_date: Option<NaiveDate>,
    pub supplier_article: Option<String>,
    pub tech_size: Option<String>,
    pub barcode: i64,
    pub quantity: i64,
    pub total_price: Option<f64>,
    pub date_close: Option<NaiveDate>,
    pub warehouse_name: Option<String>,
    pub nm_id: Option<i64>,
}

impl StorageRow for IncomeRow {
    const TABLE: &'static str = "incomes";
    const COLUMNS: &'static str = "income_id, number, date, last_change_date, \
        supplier_article, tech_size, barcode, quantity, total_price, date_close, \
        warehouse_name, nm_id";

    fn from_api(raw: &Value) -> Option<Self> {
        Some(Self {
            income_id: i64_field(raw, "income_id")?,
            number: str_field(raw, "number"),
            date: date_field(raw, "date")?,
            last_change_date: date_field(raw, "last_change_date"),
            supplier_article: str_field(raw, "supplier_article"),
            tech_size: str_field(raw, "tech_size"),
            barcode: i64_field(raw, "barcode")?,
            quantity: i64_field(raw, "quantity").unwrap_or(0),
            total_price: f64_field(raw, "total_price"),
            date_close: date_field(raw, "date_close"),
            warehouse_name: str_field(raw, "warehouse_name"),
            nm_id: i64_field(raw, "nm_id"),
        })
    }

    fn natural_key(&self) -> String {
        format!("{}:{}", self.income_id, self.barcode)
    }

    fn push_bind(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.income_id);
        b.push_bind(self.number.clone());
        b.push_bind(self.date);
        b.push_bind(self.last_change_date);
        b.push_bind(self.supplier_article.clone());
        b.push_bind(self.tech_size.clone());
        b.push_bind(self.barcode);
        b.push_bind(self.quantity);
        b.push_bind(self.total_price);
        b.push_bind(self.date_close);
        b.push_bind(self.warehouse_name.clone());
        b.push_bind(self.nm_id);
    }

    fn into_batch(rows: Vec<Self>) -> RowBatch {
        RowBatch::Incomes(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_api_maps_fields() {
        let raw = json!({
            "income_id": 987654,
            "number": "WB-1",
            "date": "2026-08-01",
            "barcode": 123,
            "quantity": 4,
            "total_price": "1200.00",
            "warehouse_name": "Tula"
        });
        let row = IncomeRow::from_api(&raw).unwrap();
        assert_eq!(row.income_id, 987654);
        assert_eq!(row.total_price, Some(1200.0));
        assert_eq!(row.natural_key(), "987654:123");
    }

    #[test]
    fn test_from_api_requires_income_id_and_barcode() {
        assert!(IncomeRow::from_api(&json!({"date": "2026-08-01", "barcode": 1})).is_none());
        assert!(IncomeRow::from_api(&json!({"date": "2026-08-01", "income_id": 1})).is_none());
    }
}
