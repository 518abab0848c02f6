//! HTTP client for the paginated statistics API
//!
//! One method, one page: `get_page` issues
//! `GET {base}/{endpoint}?dateFrom&dateTo&page&limit&key` and decodes the
//! `{ meta, data }` envelope. Classification of failures (rate limit vs
//! transport vs status) happens here; retry policy lives in `fetch::retry`.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::config::ApiConfig;
use crate::error::{IngestError, Result};

use super::types::{FetchRequest, PageEnvelope};

/// Keep-alive tuned client for the statistics API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    /// Build a client from configuration. Fails only on TLS/backend setup.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(Duration::from_secs(600))
            .pool_max_idle_per_host(20)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fetch a single page.
    ///
    /// - 2xx with a decodable body returns the envelope (possibly with an
    ///   empty `data` array — the caller decides what emptiness means).
    /// - 429 maps to [`IngestError::RateLimited`].
    /// - Any other non-success status maps to [`IngestError::Status`].
    pub async fn get_page(&self, request: &FetchRequest) -> Result<PageEnvelope> {
        let url = format!("{}/{}", self.base_url, request.entity.endpoint());

        let response = self
            .http
            .get(&url)
            .query(&[
                ("dateFrom", request.date_from.format("%Y-%m-%d").to_string()),
                ("dateTo", request.date_to.format("%Y-%m-%d").to_string()),
                ("page", request.page.to_string()),
                ("limit", request.page_size.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(IngestError::RateLimited),
            status if !status.is_success() => Err(IngestError::Status(status)),
            _ => {
                let body = response.bytes().await?;
                let envelope: PageEnvelope = serde_json::from_slice(&body)?;
                Ok(envelope)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityType;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ApiConfig {
        ApiConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            timeout_secs: 5,
            connect_timeout_secs: 2,
            max_retries: 3,
            retry_base_delay_ms: 1,
        }
    }

    fn request() -> FetchRequest {
        FetchRequest::new(
            EntityType::Orders,
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
            2,
            500,
        )
    }

    #[tokio::test]
    async fn test_get_page_sends_expected_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders"))
            .and(query_param("dateFrom", "2026-08-01"))
            .and(query_param("dateTo", "2026-08-02"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "500"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meta": {"last_page": 4},
                "data": [{"g_number": "g1", "barcode": 11}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let envelope = client.get_page(&request()).await.unwrap();
        assert_eq!(envelope.meta.last_page, Some(4));
        assert_eq!(envelope.data.len(), 1);
    }

    #[tokio::test]
    async fn test_get_page_maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let err = client.get_page(&request()).await.unwrap_err();
        assert!(matches!(err, IngestError::RateLimited));
    }

    #[tokio::test]
    async fn test_get_page_maps_500_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let err = client.get_page(&request()).await.unwrap_err();
        assert!(matches!(err, IngestError::Status(s) if s.as_u16() == 500));
    }

    #[tokio::test]
    async fn test_get_page_decode_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&config_for(&server)).unwrap();
        let err = client.get_page(&request()).await.unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
        assert!(err.is_retryable_fetch());
    }
}
