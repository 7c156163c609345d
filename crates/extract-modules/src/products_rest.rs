//! REST fallback for the products module (spec §4.7.6): used when a run is
//! configured to pull via REST rather than the bulk operation driver.
//! Partitions the shop's activity window into date chunks, fans a worker
//! per chunk out to its own [`ShopifyClient`] instance (Design Note: no
//! shared `reqwest::Client` state across workers), and folds the paginated
//! `products.json` responses back into the intermediate store.

use chrono::{DateTime, Utc};

use extract_client::date_chunk::{build_date_ranges, DateRange};
use extract_client::parallel::do_parallel;
use extract_client::rest_paginate::{derived_rate_limit, RestPaginator, PRODUCT_PAGE_SIZE_TIERS};
use extract_client::{ClientError, RateLimiter, ShopifyClient};
use extract_core::model::{InventoryPolicy, Product, ProductStatus, SelectedOption, Variant};
use extract_core::FieldHaver;
use extract_store::{DuplicateKeyPolicy, IntermediateStore};
use serde_json::Value;

use crate::error::{ModuleError, PullStats};
use crate::products::NAME;

/// Per-worker REST pull configuration. `Clone` so each worker can build its
/// own `ShopifyClient` rather than sharing one.
#[derive(Clone)]
pub struct RestWorkerConfig {
    pub shop_domain: String,
    pub api_version: String,
    pub access_token: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Clone)]
struct RestJob {
    config: RestWorkerConfig,
    range: DateRange,
    published_status: String,
}

impl RestWorkerConfig {
    fn build_client(&self) -> Result<ShopifyClient, ClientError> {
        ShopifyClient::new(
            &self.shop_domain,
            &self.api_version,
            &self.access_token,
            self.timeout_secs,
            &self.user_agent,
        )
    }
}

/// Pulls products via REST across `ranges`, writing to the same
/// `products_prod`/`products_vars` tables the bulk path uses.
///
/// # Errors
///
/// Propagates [`ModuleError`] from the store. Individual worker/page
/// failures are recorded in [`PullStats::errors`] rather than aborting the
/// whole run, matching the bulk path's sticky-error-but-keep-reporting
/// semantics from [`do_parallel`].
pub async fn run(
    store: &IntermediateStore,
    config: RestWorkerConfig,
    ranges: Vec<DateRange>,
    published_status: &str,
    rate_limit: f64,
) -> Result<PullStats, ModuleError> {
    store.create_module_tables(NAME).await?;

    let mut stats = PullStats::default();
    let worker_count = extract_client::rest_paginate::worker_thread_count(
        rate_limit.max(1.0) as usize,
        ranges.len(),
    );

    let jobs: Vec<RestJob> = ranges
        .into_iter()
        .map(|range| RestJob {
            config: config.clone(),
            range,
            published_status: published_status.to_string(),
        })
        .collect();

    let mut limiter = RateLimiter::new(rate_limit.max(1.0), 1.0);
    let mut batches: Vec<Vec<u8>> = Vec::new();
    let mut page_count = 0u64;
    let mut error_count = 0u64;

    do_parallel(
        jobs,
        worker_count.max(1),
        Some(&mut limiter),
        |job| async move { fetch_range(job).await },
        |result, _job| match result {
            Ok(bytes) => {
                page_count += 1;
                batches.push(bytes);
            }
            Err(_) => error_count += 1,
        },
    )
    .await;

    stats.pages = page_count;
    stats.errors = error_count;

    for batch in batches {
        let products: Vec<Value> = serde_json::from_slice(&batch)
            .map_err(|e| ModuleError::Parse { module: NAME, reason: e.to_string() })?;
        for raw in products {
            let product = parse_rest_product(&raw)?;
            stats.products += 1;
            stats.variants += product.variants.len() as u64;
            store
                .insert_prod(NAME, product.id, &product_to_json(&product), DuplicateKeyPolicy::Update)
                .await?;
            for variant in &product.variants {
                store
                    .insert_vars(
                        NAME,
                        variant.id,
                        product.id,
                        &variant_to_json(variant),
                        DuplicateKeyPolicy::Update,
                    )
                    .await?;
            }
        }
    }

    Ok(stats)
}

/// Probes `products/count` to build the date-range chunks (spec §4.6/§4.11),
/// then runs the REST fallback across them. Entry point for
/// `force_bulk_pieces` runs, which skip the bulk operation driver entirely.
///
/// # Errors
///
/// Propagates [`ModuleError`] from the store; a failed count probe degrades
/// to an empty `product_count`/range estimate rather than aborting, since
/// `build_date_ranges` still converges (just with more, smaller probes).
pub async fn run_chunked(
    store: &IntermediateStore,
    probe_client: &ShopifyClient,
    config: RestWorkerConfig,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    published_status: &str,
) -> Result<PullStats, ModuleError> {
    let total_count = probe_client
        .count_products(&[("published_status".to_string(), published_status.to_string())])
        .await
        .unwrap_or(0);
    // Api-Call-Limit burst observed on the probe above; 40 (the default
    // shop plan's burst) if the header was never reported.
    let burst = probe_client.last_call_limit().total.max(40);

    let ranges = build_date_ranges(window_start, window_end, total_count, |range| async move {
        probe_client
            .count_products(&[
                ("created_at_min".to_string(), range.start.to_rfc3339()),
                ("created_at_max".to_string(), range.end.to_rfc3339()),
                ("published_status".to_string(), published_status.to_string()),
            ])
            .await
            .unwrap_or(0)
    })
    .await;

    let rate_limit = derived_rate_limit(burst, total_count);
    run(store, config, ranges, published_status, rate_limit).await
}

async fn fetch_range(job: RestJob) -> Result<Vec<u8>, ClientError> {
    let client = job.config.build_client()?;
    let tiers = PRODUCT_PAGE_SIZE_TIERS.to_vec();
    let mut paginator = RestPaginator::new(&client, &tiers);

    let query_params = vec![
        ("created_at_min".to_string(), job.range.start.to_rfc3339()),
        ("created_at_max".to_string(), job.range.end.to_rfc3339()),
        ("published_status".to_string(), job.published_status.clone()),
        ("order".to_string(), "created_at ASC".to_string()),
    ];

    let mut collected = Vec::new();
    paginator
        .paginate("products.json", &query_params, |body| {
            if let Some(products) = body.get("products").and_then(Value::as_array) {
                collected.extend(products.iter().cloned());
            }
        })
        .await?;

    serde_json::to_vec(&collected).map_err(|e| ClientError::Parse(e.to_string()))
}

fn parse_rest_product(raw: &Value) -> Result<Product, ModuleError> {
    let id = raw.get("id").and_then(Value::as_i64).ok_or_else(|| ModuleError::Parse {
        module: NAME,
        reason: "REST product missing id".to_string(),
    })?;
    let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();
    let handle = raw.get("handle").and_then(Value::as_str).unwrap_or_default();

    let mut product = Product::new(id, title, handle);
    product.description_html = raw.get("body_html").and_then(Value::as_str).map(str::to_string);
    product.vendor = raw.get("vendor").and_then(Value::as_str).map(str::to_string);
    product.product_type = raw.get("product_type").and_then(Value::as_str).map(str::to_string);
    product.tags = raw
        .get("tags")
        .and_then(Value::as_str)
        .map(|s| s.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect())
        .unwrap_or_default();
    product.status = match raw.get("status").and_then(Value::as_str) {
        Some("archived") => ProductStatus::Archived,
        Some("draft") => ProductStatus::Draft,
        _ => ProductStatus::Active,
    };
    product.published_at = raw.get("published_at").and_then(Value::as_str).map(str::to_string);
    product.created_at = raw.get("created_at").and_then(Value::as_str).map(str::to_string);

    if let Some(variants) = raw.get("variants").and_then(Value::as_array) {
        for v in variants {
            product.variants.push(parse_rest_variant(v, id));
        }
    }

    Ok(product)
}

fn parse_rest_variant(raw: &Value, product_id: i64) -> Variant {
    let id = raw.get("id").and_then(Value::as_i64).unwrap_or(0);
    let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();
    let mut variant = Variant::new(id, product_id, title);
    variant.sku = raw.get("sku").and_then(Value::as_str).map(str::to_string);
    variant.barcode = raw.get("barcode").and_then(Value::as_str).map(str::to_string);
    variant.price = raw.get("price").and_then(Value::as_str).unwrap_or_default().to_string();
    variant.compare_at_price = raw.get("compare_at_price").and_then(Value::as_str).map(str::to_string);
    variant.position = raw.get("position").and_then(Value::as_i64).unwrap_or(1) as i32;
    variant.inventory_quantity = raw.get("inventory_quantity").and_then(Value::as_i64).map(|v| v as i32);
    variant.inventory_management = raw.get("inventory_management").and_then(Value::as_str).map(str::to_string);
    variant.inventory_policy = match raw.get("inventory_policy").and_then(Value::as_str) {
        Some("continue") => InventoryPolicy::Continue,
        _ => InventoryPolicy::Deny,
    };
    if let Some(name) = raw.get("option1").and_then(Value::as_str) {
        variant.selected_options.push(SelectedOption {
            name: "Option1".to_string(),
            value: name.to_string(),
        });
    }
    variant
}

fn product_to_json(product: &Product) -> Value {
    product.to_json()
}

fn variant_to_json(variant: &Variant) -> Value {
    variant.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_rest_product() {
        let raw: Value = serde_json::from_str(
            r#"{"id":1,"title":"Shirt","handle":"shirt","status":"active","tags":"a, b",
                "variants":[{"id":2,"title":"Default","price":"9.99"}]}"#,
        )
        .unwrap();
        let product = parse_rest_product(&raw).unwrap();
        assert_eq!(product.id, 1);
        assert_eq!(product.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(product.variants.len(), 1);
        assert_eq!(product.variants[0].price, "9.99");
    }
}
