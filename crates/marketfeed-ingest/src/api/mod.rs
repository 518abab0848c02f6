//! Remote API access: request/response types and the HTTP page fetcher.

pub mod client;
pub mod types;

pub use client::ApiClient;
pub use types::{FetchRequest, PageEnvelope, PageMeta, PageResult};
