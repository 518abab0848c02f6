//! Wire and result types for the paginated statistics API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entities::EntityType;

/// Parameters of a single page request. Built per request, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub entity: EntityType,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub page: u32,
    pub page_size: u32,
}

impl FetchRequest {
    pub fn new(
        entity: EntityType,
        date_from: NaiveDate,
        date_to: NaiveDate,
        page: u32,
        page_size: u32,
    ) -> Self {
        Self {
            entity,
            date_from,
            date_to,
            page,
            page_size,
        }
    }

    /// Same request aimed at a different page.
    pub fn for_page(&self, page: u32) -> Self {
        Self { page, ..self.clone() }
    }
}

/// Pagination metadata returned alongside every page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub last_page: Option<u32>,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Successful response body: `{ meta: { last_page, .. }, data: [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageEnvelope {
    #[serde(default)]
    pub meta: PageMeta,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// Outcome of fetching one page, after all retries.
///
/// `is_error` keeps "the call failed" distinct from "the page had no data";
/// conflating the two would silently drop failed pages.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page: u32,
    pub records: Vec<serde_json::Value>,
    pub is_error: bool,
}

impl PageResult {
    pub fn data(page: u32, records: Vec<serde_json::Value>) -> Self {
        Self {
            page,
            records,
            is_error: false,
        }
    }

    pub fn empty(page: u32) -> Self {
        Self {
            page,
            records: Vec::new(),
            is_error: false,
        }
    }

    pub fn error(page: u32) -> Self {
        Self {
            page,
            records: Vec::new(),
            is_error: true,
        }
    }

    /// True when the page genuinely produced records.
    pub fn has_data(&self) -> bool {
        !self.is_error && !self.records.is_empty()
    }
}
