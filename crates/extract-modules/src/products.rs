//! Products module (spec §4.7.1): the primary module in nearly every run.
//! Pulls the full product+variant tree via the bulk driver and parses the
//! interleaved JSONL stream into the intermediate store.

use std::io::BufRead;

use extract_client::bulk::checked_read_line;
use extract_client::{BulkDriver, ShopifyClient};
use extract_core::model::{
    InventoryItem, InventoryPolicy, MediaImage, PresentmentPrice, Money, Product, ProductOption,
    ProductStatus, Publication, SelectedOption, Variant, VariantImage, WeightMeasurement,
    WeightUnit,
};
use extract_core::{FieldHaver, FilterManager, Gid};
use extract_store::{DuplicateKeyPolicy, IntermediateStore};
use serde_json::Value;

use crate::bulk_line::BulkLine;
use crate::error::{ModuleError, PullStats};

pub const NAME: &str = "products";

pub struct ProductsModule;

impl ProductsModule {
    #[must_use]
    pub fn output_fields() -> Vec<&'static str> {
        vec![
            "id",
            "title",
            "description_html",
            "vendor",
            "product_type",
            "tags",
            "handle",
            "status",
            "published_at",
        ]
    }

    /// Builds the inner bulk query selecting the product tree.
    ///
    /// `include_publications` gates the `resourcePublicationsV2` connection,
    /// included only when the `read_publications` scope is present.
    #[must_use]
    pub fn build_query(filters: &FilterManager, include_publications: bool) -> String {
        let (search, _search_args) = filters.as_graphql_search();
        let search = if search.is_empty() {
            String::new()
        } else {
            format!(r#"(query: "{search}")"#)
        };

        let publications_block = if include_publications {
            "resourcePublicationsV2 { edges { node { publication { name } } } }"
        } else {
            ""
        };

        format!(
            r#"{{
  products{search} {{
    edges {{
      node {{
        id
        title
        descriptionHtml
        vendor
        productType
        tags
        handle
        status
        publishedAt
        createdAt
        options {{ name position values }}
        {publications_block}
        media(query: "media_type:IMAGE") {{
          edges {{ node {{ id ... on MediaImage {{ image {{ url width height }} alt }} }} }}
        }}
        variants {{
          edges {{
            node {{
              id
              title
              sku
              barcode
              price
              compareAtPrice
              position
              availableForSale
              image {{ url }}
              selectedOptions {{ name value }}
              inventoryItem {{
                id
                sku
                tracked
                requiresShipping
                measurement {{ weight {{ value unit }} }}
                unitCost {{ amount currencyCode }}
              }}
              inventoryQuantity
              inventoryPolicy
              inventoryManagement
              media(first: 10) {{
                edges {{ node {{ id ... on MediaImage {{ image {{ url width height }} alt }} }} }}
              }}
              presentmentPrices(first: 250) {{
                edges {{ node {{ price {{ amount currencyCode }} compareAtPrice {{ amount currencyCode }} }} }}
              }}
            }}
          }}
        }}
      }}
    }}
  }}
}}"#
        )
    }

    /// Pulls products via the bulk driver and persists them to the
    /// intermediate store.
    ///
    /// # Errors
    ///
    /// Propagates [`ModuleError`] from the client, parser, or store.
    pub async fn run(
        client: &ShopifyClient,
        store: &IntermediateStore,
        filters: &FilterManager,
        include_publications: bool,
    ) -> Result<PullStats, ModuleError> {
        store.create_module_tables(NAME).await?;

        let driver = BulkDriver::new(client);
        let query = Self::build_query(filters, include_publications);
        let path = driver.run(&query).await?;

        let mut stats = PullStats::default();
        if let Some(path) = path {
            let mut reader = extract_client::bulk::open_jsonl(&path)?;
            let mut parser = ProductParser::new(store);

            let mut buf = String::new();
            while let Some(line) = checked_read_line(&mut reader, &mut buf)? {
                if line.is_empty() {
                    continue;
                }
                let parsed = BulkLine::parse(&line)?;
                parser.handle_line(parsed).await?;
            }
            parser.flush_product().await?;
            stats = parser.into_stats();
        }

        Ok(stats)
    }

    /// Ascending product ids from the store — the primary module's
    /// `get_products` iterator.
    ///
    /// # Errors
    ///
    /// [`ModuleError::Store`] on a query failure.
    pub async fn get_products(store: &IntermediateStore) -> Result<Vec<i64>, ModuleError> {
        Ok(store.all_prod_ids(NAME).await?)
    }
}

struct ProductParser<'a> {
    store: &'a IntermediateStore,
    current_product: Option<Product>,
    current_variant_idx: Option<usize>,
    /// Media gid per entry in `current_product.media`, parallel by index —
    /// `MediaImage` carries no id in the domain model, so this is the only
    /// way to join a variant-scoped media line back to its product-level
    /// entry once both have streamed in.
    current_media_ids: Vec<i64>,
    /// `(media_id, variant_id)` pairs observed from each variant's own
    /// `media` connection, applied to `current_media_ids` at flush.
    current_variant_media: Vec<(i64, i64)>,
    stats: PullStats,
}

impl<'a> ProductParser<'a> {
    fn new(store: &'a IntermediateStore) -> Self {
        Self {
            store,
            current_product: None,
            current_variant_idx: None,
            current_media_ids: Vec::new(),
            current_variant_media: Vec::new(),
            stats: PullStats::default(),
        }
    }

    fn into_stats(self) -> PullStats {
        self.stats
    }

    async fn handle_line(&mut self, line: BulkLine) -> Result<(), ModuleError> {
        match line.resource_type() {
            Some("Product") => {
                self.flush_product().await?;
                self.current_product = Some(parse_product(&line.raw)?);
                self.current_variant_idx = None;
            }
            Some("ProductVariant") => {
                let variant = parse_variant(&line.raw)?;
                if let Some(product) = self.current_product.as_mut() {
                    product.variants.push(variant);
                    self.current_variant_idx = Some(product.variants.len() - 1);
                }
            }
            Some("MediaImage") => {
                let media_id = gid_id(&line.raw)?;
                let parent_is_variant = line
                    .parent_gid
                    .as_ref()
                    .is_some_and(|g| g.resource == "ProductVariant");

                if parent_is_variant {
                    if let Some(product) = self.current_product.as_ref() {
                        if let Some(idx) = self.current_variant_idx {
                            self.current_variant_media.push((media_id, product.variants[idx].id));
                        }
                    }
                } else {
                    let media = parse_media(&line.raw)?;
                    if let Some(product) = self.current_product.as_mut() {
                        product.media.push(media);
                        self.current_media_ids.push(media_id);
                    }
                }
            }
            Some("Publication") => {
                let name = line
                    .raw
                    .get("publication")
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if let Some(product) = self.current_product.as_mut() {
                    product
                        .publications
                        .get_or_insert_with(Vec::new)
                        .push(Publication { name });
                }
            }
            None => {
                // Presentment price child: no id, parent points at a variant.
                if line
                    .parent_gid
                    .as_ref()
                    .is_some_and(|g| g.resource == "ProductVariant")
                {
                    if let (Some(product), Some(idx)) =
                        (self.current_product.as_mut(), self.current_variant_idx)
                    {
                        product.variants[idx]
                            .presentment_prices
                            .get_or_insert_with(Vec::new)
                            .push(parse_presentment_price(&line.raw)?);
                    }
                } else {
                    self.stats.warnings += 1;
                }
            }
            Some(_) => {
                self.stats.warnings += 1;
            }
        }
        Ok(())
    }

    async fn flush_product(&mut self) -> Result<(), ModuleError> {
        let Some(mut product) = self.current_product.take() else {
            return Ok(());
        };

        for (media_id, variant_id) in self.current_variant_media.drain(..) {
            if let Some(idx) = self.current_media_ids.iter().position(|id| *id == media_id) {
                product.media[idx].variant_ids.push(variant_id);
            }
        }
        self.current_media_ids.clear();

        self.stats.products += 1;
        self.stats.variants += product.variants.len() as u64;

        self.store
            .insert_prod(NAME, product.id, &product.to_json(), DuplicateKeyPolicy::Update)
            .await?;
        for variant in &product.variants {
            self.store
                .insert_vars(
                    NAME,
                    variant.id,
                    product.id,
                    &variant.to_json(),
                    DuplicateKeyPolicy::Update,
                )
                .await?;
        }
        Ok(())
    }
}

fn gid_id(raw: &Value) -> Result<i64, ModuleError> {
    raw.get("id")
        .and_then(Value::as_str)
        .and_then(|s| Gid::parse(s).ok())
        .map(|g| g.id)
        .ok_or_else(|| ModuleError::Parse {
            module: NAME,
            reason: "missing or malformed id".to_string(),
        })
}

fn parse_product(raw: &Value) -> Result<Product, ModuleError> {
    let id = gid_id(raw)?;
    let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();
    let handle = raw.get("handle").and_then(Value::as_str).unwrap_or_default();

    let mut product = Product::new(id, title, handle);
    product.description_html = raw.get("descriptionHtml").and_then(Value::as_str).map(str::to_string);
    product.vendor = raw.get("vendor").and_then(Value::as_str).map(str::to_string);
    product.product_type = raw.get("productType").and_then(Value::as_str).map(str::to_string);
    product.tags = raw
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    product.status = match raw.get("status").and_then(Value::as_str) {
        Some("ARCHIVED") => ProductStatus::Archived,
        Some("DRAFT") => ProductStatus::Draft,
        _ => ProductStatus::Active,
    };
    product.published_at = raw.get("publishedAt").and_then(Value::as_str).map(str::to_string);
    product.created_at = raw.get("createdAt").and_then(Value::as_str).map(str::to_string);
    product.options = raw
        .get("options")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|o| ProductOption {
                    name: o.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    position: o.get("position").and_then(Value::as_i64).unwrap_or(1) as i32,
                    values: o
                        .get("values")
                        .and_then(Value::as_array)
                        .map(|v| v.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(product)
}

fn parse_variant(raw: &Value) -> Result<Variant, ModuleError> {
    let id = gid_id(raw)?;
    let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();

    let mut variant = Variant::new(id, 0, title);
    variant.sku = raw.get("sku").and_then(Value::as_str).map(str::to_string);
    variant.barcode = raw.get("barcode").and_then(Value::as_str).map(str::to_string);
    variant.price = raw.get("price").and_then(Value::as_str).unwrap_or_default().to_string();
    variant.compare_at_price = raw.get("compareAtPrice").and_then(Value::as_str).map(str::to_string);
    variant.position = raw.get("position").and_then(Value::as_i64).unwrap_or(1) as i32;
    variant.available_for_sale = raw.get("availableForSale").and_then(Value::as_bool).unwrap_or(true);
    variant.inventory_quantity = raw.get("inventoryQuantity").and_then(Value::as_i64).map(|v| v as i32);
    variant.inventory_policy = match raw.get("inventoryPolicy").and_then(Value::as_str) {
        Some("CONTINUE") => InventoryPolicy::Continue,
        _ => InventoryPolicy::Deny,
    };
    variant.inventory_management = raw.get("inventoryManagement").and_then(Value::as_str).map(str::to_string);

    variant.selected_options = raw
        .get("selectedOptions")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|o| SelectedOption {
                    name: o.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    value: o.get("value").and_then(Value::as_str).unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    if let Some(image) = raw.get("image") {
        if let Some(url) = image.get("url").and_then(Value::as_str) {
            variant.image = Some(VariantImage { url: url.to_string() });
        }
    }

    if let Some(item) = raw.get("inventoryItem") {
        variant.inventory_item = InventoryItem {
            id: item
                .get("id")
                .and_then(Value::as_str)
                .and_then(|s| Gid::parse(s).ok())
                .map(|g| g.id),
            sku: item.get("sku").and_then(Value::as_str).map(str::to_string),
            measurement: parse_measurement(item.get("measurement")),
            tracked: item.get("tracked").and_then(Value::as_bool).unwrap_or(false),
            requires_shipping: item.get("requiresShipping").and_then(Value::as_bool).unwrap_or(true),
            unit_cost: item.get("unitCost").map(parse_money),
        };
    }

    Ok(variant)
}

fn parse_measurement(raw: Option<&Value>) -> WeightMeasurement {
    let Some(raw) = raw.and_then(|m| m.get("weight")) else {
        return WeightMeasurement::default();
    };
    WeightMeasurement {
        value: raw.get("value").and_then(Value::as_f64),
        unit: match raw.get("unit").and_then(Value::as_str) {
            Some("GRAMS") => Some(WeightUnit::Grams),
            Some("OUNCES") => Some(WeightUnit::Ounces),
            Some("POUNDS") => Some(WeightUnit::Pounds),
            Some("KILOGRAMS") => Some(WeightUnit::Kilograms),
            Some(_) => Some(WeightUnit::Unknown),
            None => None,
        },
    }
}

fn parse_money(raw: &Value) -> Money {
    Money {
        amount: raw.get("amount").and_then(Value::as_str).unwrap_or_default().to_string(),
        currency: raw
            .get("currencyCode")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

fn parse_media(raw: &Value) -> Result<MediaImage, ModuleError> {
    let image = raw.get("image").unwrap_or(raw);
    Ok(MediaImage {
        url: image.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
        alt_text: raw.get("alt").and_then(Value::as_str).map(str::to_string),
        width: image.get("width").and_then(Value::as_i64).map(|v| v as i32),
        height: image.get("height").and_then(Value::as_i64).map(|v| v as i32),
        variant_ids: Vec::new(),
    })
}

fn parse_presentment_price(raw: &Value) -> Result<PresentmentPrice, ModuleError> {
    let price = raw
        .get("price")
        .map(parse_money)
        .ok_or_else(|| ModuleError::Parse {
            module: NAME,
            reason: "presentment price node missing price".to_string(),
        })?;
    let compare_at_price = raw.get("compareAtPrice").map(parse_money);
    Ok(PresentmentPrice {
        price,
        compare_at_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_product() {
        let raw: Value = serde_json::from_str(
            r#"{"id":"gid://shopify/Product/1","title":"Shirt","handle":"shirt","status":"ACTIVE"}"#,
        )
        .unwrap();
        let product = parse_product(&raw).unwrap();
        assert_eq!(product.id, 1);
        assert_eq!(product.title, "Shirt");
        assert_eq!(product.status, ProductStatus::Active);
    }

    #[test]
    fn parses_variant_with_inventory_item() {
        let raw: Value = serde_json::from_str(
            r#"{"id":"gid://shopify/ProductVariant/2","title":"Default","price":"10.00",
                "inventoryItem":{"id":"gid://shopify/InventoryItem/9","tracked":true,"requiresShipping":true}}"#,
        )
        .unwrap();
        let variant = parse_variant(&raw).unwrap();
        assert_eq!(variant.id, 2);
        assert_eq!(variant.price, "10.00");
        assert!(variant.inventory_item.tracked);
    }

    #[tokio::test]
    async fn build_query_includes_publications_only_when_requested() {
        let filters = FilterManager::new(std::collections::HashMap::new()).unwrap();
        let with_pub = ProductsModule::build_query(&filters, true);
        let without_pub = ProductsModule::build_query(&filters, false);
        assert!(with_pub.contains("resourcePublicationsV2"));
        assert!(!without_pub.contains("resourcePublicationsV2"));
    }
}
