//! Collections module (spec §4.7.3): collection-rooted bulk query, producing
//! a product-keyed enrichment table split into `custom_*`/`smart_*` columns
//! by `ruleSet` presence.

use std::collections::HashMap;

use extract_client::bulk::checked_read_line;
use extract_client::{BulkDriver, ShopifyClient};
use extract_store::{DuplicateKeyPolicy, IntermediateStore};
use serde_json::Value;

use crate::bulk_line::BulkLine;
use crate::error::{ModuleError, PullStats};

pub const NAME: &str = "collections";

pub struct CollectionsModule;

struct CollectionRecord {
    handle: String,
    title: String,
    has_rule_set: bool,
    metafields: Vec<Value>,
}

impl CollectionsModule {
    #[must_use]
    pub fn build_query(include_metafields: bool) -> String {
        let meta_block = if include_metafields {
            "metafields { edges { node { namespace key value description } } }"
        } else {
            ""
        };

        format!(
            r#"{{
  collections(first: 250) {{
    edges {{
      node {{
        id
        handle
        title
        ruleSet {{ appliedDisjunctively }}
        {meta_block}
        products {{ edges {{ node {{ id }} }} }}
      }}
    }}
  }}
}}"#
        )
    }

    /// Pulls collections via the bulk driver, persisting one enrichment row
    /// per member product into `collections_prod`.
    ///
    /// # Errors
    ///
    /// Propagates [`ModuleError`] from the client, parser, or store.
    pub async fn run(
        client: &ShopifyClient,
        store: &IntermediateStore,
        include_metafields: bool,
    ) -> Result<PullStats, ModuleError> {
        store.create_module_tables(NAME).await?;

        let driver = BulkDriver::new(client);
        let query = Self::build_query(include_metafields);
        let path = driver.run(&query).await?;

        let mut stats = PullStats::default();
        let Some(path) = path else {
            return Ok(stats);
        };

        let mut reader = extract_client::bulk::open_jsonl(&path)?;
        let mut collections: HashMap<i64, CollectionRecord> = HashMap::new();
        let mut product_collections: HashMap<i64, Vec<i64>> = HashMap::new();

        let mut current_collection: Option<i64> = None;
        let mut buf = String::new();

        while let Some(line) = checked_read_line(&mut reader, &mut buf)? {
            if line.is_empty() {
                continue;
            }
            let parsed = BulkLine::parse(&line)?;
            match parsed.resource_type() {
                Some("Collection") => {
                    let id = parsed.gid.as_ref().map(|g| g.id).ok_or_else(|| ModuleError::Parse {
                        module: NAME,
                        reason: "collection line missing id".to_string(),
                    })?;
                    collections.insert(
                        id,
                        CollectionRecord {
                            handle: parsed.str_field("handle").unwrap_or_default(),
                            title: parsed.str_field("title").unwrap_or_default(),
                            has_rule_set: parsed.raw.get("ruleSet").is_some_and(|r| !r.is_null()),
                            metafields: Vec::new(),
                        },
                    );
                    current_collection = Some(id);
                }
                Some("Metafield") => {
                    if let Some(cid) = current_collection {
                        if let Some(record) = collections.get_mut(&cid) {
                            record.metafields.push(parsed.raw);
                        }
                    } else {
                        stats.warnings += 1;
                    }
                }
                Some("Product") => {
                    let Some(cid) = current_collection else {
                        stats.warnings += 1;
                        continue;
                    };
                    let Some(product_id) = parsed.gid.as_ref().map(|g| g.id) else {
                        stats.warnings += 1;
                        continue;
                    };
                    product_collections.entry(product_id).or_default().push(cid);
                }
                _ => stats.warnings += 1,
            }
        }

        stats.products = collections.len() as u64;

        for (product_id, collection_ids) in &product_collections {
            let row = build_product_row(collection_ids, &collections, include_metafields);
            store
                .insert_prod(NAME, *product_id, &row, DuplicateKeyPolicy::Throw)
                .await?;
        }

        Ok(stats)
    }

    /// Fetches a product's collections enrichment row, if it belongs to any.
    ///
    /// # Errors
    ///
    /// [`ModuleError::Store`] on a query failure.
    pub async fn row_for_product(
        store: &IntermediateStore,
        product_id: i64,
    ) -> Result<Option<Value>, ModuleError> {
        Ok(store.query_prod(NAME, product_id).await?)
    }
}

fn build_product_row(
    collection_ids: &[i64],
    collections: &HashMap<i64, CollectionRecord>,
    include_metafields: bool,
) -> Value {
    let mut custom_ids = Vec::new();
    let mut custom_handles = Vec::new();
    let mut custom_titles = Vec::new();
    let mut custom_meta = Vec::new();

    let mut smart_ids = Vec::new();
    let mut smart_handles = Vec::new();
    let mut smart_titles = Vec::new();
    let mut smart_meta = Vec::new();

    for cid in collection_ids {
        let Some(record) = collections.get(cid) else {
            continue;
        };
        if record.has_rule_set {
            smart_ids.push(cid.to_string());
            smart_handles.push(record.handle.clone());
            smart_titles.push(record.title.clone());
            if include_metafields {
                smart_meta.push(serde_json::json!({ "collection_id": cid, "metafields": record.metafields }));
            }
        } else {
            custom_ids.push(cid.to_string());
            custom_handles.push(record.handle.clone());
            custom_titles.push(record.title.clone());
            if include_metafields {
                custom_meta.push(serde_json::json!({ "collection_id": cid, "metafields": record.metafields }));
            }
        }
    }

    let mut map = serde_json::Map::new();
    map.insert("custom_collections_id".into(), Value::from(custom_ids.join("|")));
    map.insert("custom_collections_handle".into(), Value::from(custom_handles.join("|")));
    map.insert("custom_collections_title".into(), Value::from(custom_titles.join("|")));
    map.insert("smart_collections_id".into(), Value::from(smart_ids.join("|")));
    map.insert("smart_collections_handle".into(), Value::from(smart_handles.join("|")));
    map.insert("smart_collections_title".into(), Value::from(smart_titles.join("|")));
    if include_metafields {
        map.insert("custom_collections_meta".into(), Value::from(custom_meta));
        map.insert("smart_collections_meta".into(), Value::from(smart_meta));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_includes_metafields_block_only_when_requested() {
        assert!(CollectionsModule::build_query(true).contains("metafields {"));
        assert!(!CollectionsModule::build_query(false).contains("metafields {"));
    }

    #[test]
    fn build_product_row_splits_custom_and_smart_and_pipe_joins() {
        let mut collections = HashMap::new();
        collections.insert(
            1,
            CollectionRecord {
                handle: "sale".into(),
                title: "Sale".into(),
                has_rule_set: false,
                metafields: Vec::new(),
            },
        );
        collections.insert(
            2,
            CollectionRecord {
                handle: "auto".into(),
                title: "Auto".into(),
                has_rule_set: true,
                metafields: Vec::new(),
            },
        );
        collections.insert(
            3,
            CollectionRecord {
                handle: "clearance".into(),
                title: "Clearance".into(),
                has_rule_set: false,
                metafields: Vec::new(),
            },
        );
        let row = build_product_row(&[1, 2, 3], &collections, false);
        assert_eq!(row["custom_collections_handle"], "sale|clearance");
        assert_eq!(row["smart_collections_handle"], "auto");
        assert_eq!(row["custom_collections_id"], "1|3");
    }
}
