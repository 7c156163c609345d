//! Inventories module (spec §4.7.5): per-variant inventory item and level
//! accumulation. Storage always keeps the full `levels` array per variant;
//! `inventory_level_explode` is an output-phase concern (the run manager
//! fans one row into N when the flag is set), not something this module
//! decides.

use extract_client::bulk::checked_read_line;
use extract_client::{BulkDriver, ShopifyClient};
use extract_core::Gid;
use extract_store::{DuplicateKeyPolicy, IntermediateStore};
use serde_json::Value;

use crate::bulk_line::BulkLine;
use crate::error::{ModuleError, PullStats};

pub const NAME: &str = "inventory";

pub struct InventoriesModule;

impl InventoriesModule {
    #[must_use]
    pub fn build_query() -> String {
        r#"{
  productVariants(first: 250) {
    edges {
      node {
        id
        inventoryItem {
          id
          sku
          unitCost { amount currencyCode }
          inventoryLevels {
            edges {
              node {
                id
                quantities(names: ["available"]) { name quantity }
                location { id name }
              }
            }
          }
        }
      }
    }
  }
}"#
        .to_string()
    }

    /// Pulls inventory items/levels via the bulk driver.
    ///
    /// # Errors
    ///
    /// Propagates [`ModuleError`] from the client, parser, or store.
    pub async fn run(client: &ShopifyClient, store: &IntermediateStore) -> Result<PullStats, ModuleError> {
        store.create_module_tables(NAME).await?;

        let driver = BulkDriver::new(client);
        let path = driver.run(&Self::build_query()).await?;

        let mut stats = PullStats::default();
        let Some(path) = path else {
            return Ok(stats);
        };

        let mut reader = extract_client::bulk::open_jsonl(&path)?;
        let mut buf = String::new();
        let mut parser = InventoryParser::new(store);

        while let Some(line) = checked_read_line(&mut reader, &mut buf)? {
            if line.is_empty() {
                continue;
            }
            let parsed = BulkLine::parse(&line)?;
            parser.handle_line(parsed).await?;
        }
        parser.flush_variant().await?;
        stats = parser.into_stats();

        Ok(stats)
    }

    /// Fetches a variant's inventory row (item + levels), if pulled.
    ///
    /// # Errors
    ///
    /// [`ModuleError::Store`] on a query failure.
    pub async fn row_for_variant(
        store: &IntermediateStore,
        variant_id: i64,
    ) -> Result<Option<Value>, ModuleError> {
        Ok(store.query_prod(NAME, variant_id).await?)
    }
}

struct InventoryParser<'a> {
    store: &'a IntermediateStore,
    current_variant_id: Option<i64>,
    current_item: Value,
    levels: Vec<Value>,
    stats: PullStats,
}

impl<'a> InventoryParser<'a> {
    fn new(store: &'a IntermediateStore) -> Self {
        Self {
            store,
            current_variant_id: None,
            current_item: Value::Null,
            levels: Vec::new(),
            stats: PullStats::default(),
        }
    }

    fn into_stats(self) -> PullStats {
        self.stats
    }

    async fn handle_line(&mut self, line: BulkLine) -> Result<(), ModuleError> {
        match line.resource_type() {
            Some("ProductVariant") => {
                self.flush_variant().await?;
                self.current_variant_id = line.gid.as_ref().map(|g| g.id);
                self.current_item = line.raw.get("inventoryItem").cloned().unwrap_or(Value::Null);
            }
            Some("InventoryLevel") => {
                if self.current_variant_id.is_some() {
                    self.levels.push(build_level(&line.raw));
                } else {
                    self.stats.warnings += 1;
                }
            }
            _ => self.stats.warnings += 1,
        }
        Ok(())
    }

    async fn flush_variant(&mut self) -> Result<(), ModuleError> {
        let Some(variant_id) = self.current_variant_id.take() else {
            return Ok(());
        };
        self.stats.variants += 1;
        let row = serde_json::json!({
            "item": self.current_item,
            "levels": std::mem::take(&mut self.levels),
        });
        self.store
            .insert_prod(NAME, variant_id, &row, DuplicateKeyPolicy::Throw)
            .await?;
        self.current_item = Value::Null;
        Ok(())
    }
}

fn build_level(raw: &Value) -> Value {
    let available = raw
        .get("quantities")
        .and_then(Value::as_array)
        .and_then(|q| q.iter().find(|x| x.get("name").and_then(Value::as_str) == Some("available")))
        .and_then(|x| x.get("quantity"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let location = raw.get("location");
    serde_json::json!({
        "available": available,
        "location_id": location.and_then(|l| l.get("id")).and_then(Value::as_str).and_then(|s| Gid::parse(s).ok()).map(|g| g.id),
        "location_name": location.and_then(|l| l.get("name")).and_then(Value::as_str).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_level_extracts_available_quantity_and_location() {
        let raw: Value = serde_json::from_str(
            r#"{"id":"gid://shopify/InventoryLevel/1","quantities":[{"name":"available","quantity":7}],
                "location":{"id":"gid://shopify/Location/9","name":"Warehouse"}}"#,
        )
        .unwrap();
        let level = build_level(&raw);
        assert_eq!(level["available"], 7);
        assert_eq!(level["location_name"], "Warehouse");
        assert_eq!(level["location_id"], 9);
    }

    #[test]
    fn query_requests_available_quantity_name() {
        assert!(InventoriesModule::build_query().contains(r#"names: ["available"]"#));
    }
}
