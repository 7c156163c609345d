//! HTTP client, bulk-operation driver, REST paginator, date-range chunker,
//! and parallel executor for talking to the Shopify Admin API.

pub mod bulk;
pub mod date_chunk;
pub mod error;
pub mod http;
pub mod pagination;
pub mod parallel;
pub mod rate_limit;
pub mod rest_paginate;

pub use bulk::{BulkDriver, BulkOperation, BulkOperationState};
pub use error::ClientError;
pub use http::{ApiCallLimit, ShopifyClient};
pub use rate_limit::RateLimiter;
