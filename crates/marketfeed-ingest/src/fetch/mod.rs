//! Page fetching: bounded retry, concurrent pooling, pagination discovery.

pub mod pagination;
pub mod pool;
pub mod retry;

pub use pagination::PaginationResolver;
pub use pool::{ConcurrentPageFetcher, PageSink};
pub use retry::{RetryPolicy, RetryingSingleFetcher};
