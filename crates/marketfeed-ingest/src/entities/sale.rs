//! Sale (buyout) rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{query_builder::Separated, Postgres};

use super::{
    bool_field, date_field, f64_field, i64_field, str_field, RowBatch, StorageRow,
};

/// A completed sale, identified by the remote's `sale_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRow {
    pub g_number: String,
    pub date: NaiveDate,
    pub last_change_date: Option<NaiveDate>,
    pub supplier_article: Option<String>,
    pub tech_size: Option<String>,
    pub barcode: i64,
    pub quantity: i64,
    pub total_price: Option<f64>,
    pub discount_percent: Option<f64>,
    pub is_supply: Option<bool>,
    pub is_realization: Option<bool>,
    pub promo_code_discount: Option<f64>,
    pub warehouse_name: Option<String>,
    pub country_name: Option<String>,
    pub oblast_okrug_name: Option<String>,
    pub region_name: Option<String>,
    pub income_id: Option<i64>,
    pub sale_id: String,
    pub odid: Option<i64>,
    pub spp: Option<f64>,
    pub for_pay: Option<f64>,
    pub finished_price: Option<f64>,
    pub price_with_disc: Option<f64>,
    pub nm_id: Option<i64>,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub is_storno: Option<bool>,
}

impl StorageRow for SaleRow {
    const TABLE: &'static str = "sales";
    const COLUMNS: &'static str = "g_number, date, last_change_date, supplier_article, \
        tech_size, barcode, quantity, total_price, discount_percent, is_supply, \
        is_realization, promo_code_discount, warehouse_name, country_name, \
        oblast_okrug_name, region_name, income_id, sale_id, odid, spp, for_pay, \
        finished_price, price_with_disc, nm_id, subject, category, brand, is_storno";

    fn from_api(raw: &Value) -> Option<Self> {
        Some(Self {
            g_number: str_field(raw, "g_number")?,
            date: date_field(raw, "date")?,
            last_change_date: date_field(raw, "last_change_date"),
            supplier_article: str_field(raw, "supplier_article"),
            tech_size: str_field(raw, "tech_size"),
            barcode: i64_field(raw, "barcode")?,
            quantity: i64_field(raw, "quantity").unwrap_or(0),
            total_price: f64_field(raw, "total_price"),
            discount_percent: f64_field(raw, "discount_percent"),
            is_supply: bool_field(raw, "is_supply"),
            is_realization: bool_field(raw, "is_realization"),
            promo_code_discount: f64_field(raw, "promo_code_discount"),
            warehouse_name: str_field(raw, "warehouse_name"),
            country_name: str_field(raw, "country_name"),
            oblast_okrug_name: str_field(raw, "oblast_okrug_name"),
            region_name: str_field(raw, "region_name"),
            income_id: i64_field(raw, "income_id"),
            sale_id: str_field(raw, "sale_id")?,
            odid: i64_field(raw, "odid"),
            spp: f64_field(raw, "spp"),
            for_pay: f64_field(raw, "for_pay"),
            finished_price: f64_field(raw, "finished_price"),
            price_with_disc: f64_field(raw, "price_with_disc"),
            nm_id: i64_field(raw, "nm_id"),
            subject: str_field(raw, "subject"),
            category: str_field(raw, "category"),
            brand: str_field(raw, "brand"),
            is_storno: bool_field(raw, "is_storno"),
        })
    }

    fn natural_key(&self) -> String {
        self.sale_id.clone()
    }

    fn push_bind(&self, b: &mut Separated<'_, '_, Postgres, &'static str>) {
        b.push_bind(self.g_number.clone());
        b.push_bind(self.date);
        b.push_bind(self.last_change_date);
        b.push_bind(self.supplier_article.clone());
        b.push_bind(self.tech_size.clone());
        b.push_bind(self.barcode);
        b.push_bind(self.quantity);
        b.push_bind(self.total_price);
        b.push_bind(self.discount_percent);
        b.push_bind(self.is_supply);
        b.push_bind(self.is_realization);
        b.push_bind(self.promo_code_discount);
        b.push_bind(self.warehouse_name.clone());
        b.push_bind(self.country_name.clone());
        b.push_bind(self.oblast_okrug_name.clone());
        b.push_bind(self.region_name.clone());
        b.push_bind(self.income_id);
        b.push_bind(self.sale_id.clone());
        b.push_bind(self.odid);
        b.push_bind(self.spp);
        b.push_bind(self.for_pay);
        b.push_bind(self.finished_price);
        b.push_bind(self.price_with_disc);
        b.push_bind(self.nm_id);
        b.push_bind(self.subject.clone());
        b.push_bind(self.category.clone());
        b.push_bind(self.brand.clone());
        b.push_bind(self.is_storno);
    }

    fn into_batch(rows: Vec<Self>) -> RowBatch {
        RowBatch::Sales(rows)
    }
}
