//! End-to-end pipeline tests: supervisor → fetch → queue → workers → store,
//! with the remote API mocked and the in-memory queue/store pair.

use std::sync::Arc;

use marketfeed_ingest::config::{ApiConfig, IngestConfig};
use marketfeed_ingest::entities::EntityType;
use marketfeed_ingest::persist::MemoryStore;
use marketfeed_ingest::queue::{MemoryQueue, WorkQueue};
use marketfeed_ingest::supervisor::{DrainOutcome, WorkerSupervisor};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> IngestConfig {
    IngestConfig {
        api: ApiConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            timeout_secs: 5,
            connect_timeout_secs: 2,
            max_retries: 3,
            retry_base_delay_ms: 1,
        },
        database_url: None,
        workers: 2,
        concurrent: 30,
        page_size: 500,
        chunk_size: 500,
        // Fast polling so draining finishes as soon as it is stable.
        drain_poll_secs: 1,
        drain_budget_secs: 60,
        worker_grace_secs: 3,
        worker_idle_sleep_secs: 1,
        queue_retry_after_secs: 300,
        job_max_attempts: 5,
        page_cache_ttl_secs: 1800,
        group_pause_ms: 0,
    }
}

fn stock_records(page: u32, count: usize) -> Vec<serde_json::Value> {
    (0..count)
        .map(|n| {
            serde_json::json!({
                "date": "2026-08-06",
                "barcode": (page as usize) * 1000 + n,
                "quantity": 1,
                "warehouse_name": "Koledino",
                "nm_id": 42,
            })
        })
        .collect()
}

fn stocks_page(page: u32, count: usize, last_page: u32) -> serde_json::Value {
    serde_json::json!({
        "meta": {"last_page": last_page},
        "data": stock_records(page, count),
    })
}

async fn mount_stocks_pages(server: &MockServer) {
    // Page 1 is hit twice: once for pagination discovery, once for data.
    Mock::given(method("GET"))
        .and(path("/stocks"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stocks_page(1, 2, 3)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stocks"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stocks_page(2, 2, 3)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stocks"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stocks_page(3, 1, 3)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_dispatches_one_job_per_page() {
    let server = MockServer::start().await;
    mount_stocks_pages(&server).await;

    let queue = Arc::new(MemoryQueue::new(5));
    let store = Arc::new(MemoryStore::new());
    let supervisor =
        WorkerSupervisor::new(test_config(&server), queue.clone(), store.clone()).unwrap();

    let today = chrono::Utc::now().date_naive();
    let summary = supervisor
        .run(&[EntityType::Stocks], today, today)
        .await
        .unwrap();

    assert_eq!(summary.jobs_dispatched, 3, "one job per non-empty page");
    assert_eq!(summary.items_accepted, 5);
    assert_eq!(summary.drain, DrainOutcome::Drained);
    assert_eq!(summary.endpoints.len(), 1);
    assert_eq!(summary.endpoints[0].pages, Some(3));

    assert_eq!(store.row_count("stocks").await, 5);
    assert_eq!(queue.counts().await.unwrap().total(), 0);
    assert!(queue.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_replayed_run_adds_no_net_new_rows() {
    let server = MockServer::start().await;
    mount_stocks_pages(&server).await;

    let queue = Arc::new(MemoryQueue::new(5));
    let store = Arc::new(MemoryStore::new());
    let supervisor =
        WorkerSupervisor::new(test_config(&server), queue, store.clone()).unwrap();

    let today = chrono::Utc::now().date_naive();
    supervisor.run(&[EntityType::Stocks], today, today).await.unwrap();
    assert_eq!(store.row_count("stocks").await, 5);

    // Same pages again: every row collides on its natural key.
    supervisor.run(&[EntityType::Stocks], today, today).await.unwrap();
    assert_eq!(store.row_count("stocks").await, 5);
}

#[tokio::test]
async fn test_unresolvable_endpoint_is_skipped_and_run_continues() {
    let server = MockServer::start().await;

    // Sales discovery always fails; orders serve a single page.
    Mock::given(method("GET"))
        .and(path("/sales"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "meta": {"last_page": 1},
            "data": [{
                "g_number": "G-1",
                "date": "2026-08-02T09:00:00",
                "barcode": 7,
            }],
        })))
        .mount(&server)
        .await;

    let queue = Arc::new(MemoryQueue::new(5));
    let store = Arc::new(MemoryStore::new());
    let supervisor =
        WorkerSupervisor::new(test_config(&server), queue, store.clone()).unwrap();

    let today = chrono::Utc::now().date_naive();
    let summary = supervisor
        .run(&[EntityType::Sales, EntityType::Orders], today, today)
        .await
        .unwrap();

    assert_eq!(summary.endpoints[0].pages, None, "sales discovery failed");
    assert_eq!(summary.endpoints[0].jobs_dispatched, 0);
    assert_eq!(summary.endpoints[1].pages, Some(1));
    assert_eq!(summary.jobs_dispatched, 1);
    assert_eq!(store.row_count("orders").await, 1);
    assert_eq!(store.row_count("sales").await, 0);
}
