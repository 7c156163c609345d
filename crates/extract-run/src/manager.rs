//! Run manager (spec §4.10-§4.13): owns a run end to end — preflight,
//! per-module pull, the product/variant join, and rendering through a
//! [`RowSink`]. One [`RunManager`] instance per run; table teardown is
//! guaranteed via [`IntermediateStore::drop_all`] on every exit path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use extract_client::ShopifyClient;
use extract_core::model::MetafieldOwnerType;
use extract_core::{DataType, FilterManager, Product, Settings, ShopContext, Variant};
use extract_modules::registry::{active_modules, ModuleName};
use extract_modules::{
    collections::CollectionsModule, fields, inventories::InventoriesModule, metafields::MetafieldsModule,
    products::ProductsModule, products_rest::{self, RestWorkerConfig}, translations::TranslationsModule, PullStats,
};
use extract_store::IntermediateStore;

use crate::error::RunError;
use crate::sink::{RowFormat, RowSink};
use crate::template::OutputTemplate;

/// Which half of the run is in progress — pulling enrichment data into the
/// intermediate store, or rendering the joined output (spec §9 Design Note:
/// the output template may only grow columns during `Pull`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Pull,
    FinalOutput,
}

pub struct RunManager<'a> {
    client: &'a ShopifyClient,
    store: &'a IntermediateStore,
    settings: &'a Settings,
    filters: &'a FilterManager,
    locales: Vec<String>,
    shop: ShopContext,
    has_publications_scope: bool,
    stage: RunStage,
}

impl<'a> RunManager<'a> {
    /// `locales` and the shop/scope context are threaded explicitly rather
    /// than read off `Settings`/`ShopifyClient`: neither carries them, since
    /// locales are a caller choice independent of data-type settings and the
    /// client doesn't expose the domain/api_version it was built with.
    #[must_use]
    pub fn new(
        client: &'a ShopifyClient,
        store: &'a IntermediateStore,
        settings: &'a Settings,
        filters: &'a FilterManager,
        locales: Vec<String>,
        shop: ShopContext,
        has_publications_scope: bool,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            filters,
            locales,
            shop,
            has_publications_scope,
            stage: RunStage::Pull,
        }
    }

    #[must_use]
    pub fn stage(&self) -> RunStage {
        self.stage
    }

    /// Runs the whole pull + join + output pipeline, writing one header row
    /// followed by one row per variant (or per inventory level, when
    /// `inventory_level_explode` is set) to `sink`.
    ///
    /// Tables are always dropped on exit, success or failure, unless
    /// `Settings.debug` is set (spec §4.13).
    ///
    /// # Errors
    ///
    /// Any [`RunError`] raised during preflight, pull, or output. Table
    /// teardown failures are logged, not propagated, so they never mask the
    /// run's real error.
    pub async fn run(&mut self, sink: &mut dyn RowSink) -> Result<(), RunError> {
        let result = self.run_inner(sink).await;

        if !self.settings.debug {
            if let Err(e) = self.store.drop_all().await {
                warn!(error = %e, "failed to drop intermediate store tables");
            }
        }

        result
    }

    async fn run_inner(&mut self, sink: &mut dyn RowSink) -> Result<(), RunError> {
        self.stage = RunStage::Pull;
        let modules = self.modules_to_pull();
        for module in &modules {
            let stats = self.pull_module(*module).await?;
            info!(
                module = module.table_name(),
                products = stats.products,
                variants = stats.variants,
                warnings = stats.warnings,
                "module pull complete"
            );
        }

        let product_ids = self.store.all_prod_ids(extract_modules::products::NAME).await?;

        let mut template = OutputTemplate::new(base_columns());
        let mut rows: Vec<HashMap<String, String>> = Vec::new();

        for product_id in &product_ids {
            let Some(product_raw) = self.store.query_prod("products", *product_id).await? else {
                warn!(product_id, "primary product id missing its own prod row");
                continue;
            };
            let product = Product::from_json(&product_raw);
            let variant_rows = self.store.query_vars_by_parent("products", *product_id).await?;

            let collections_row = CollectionsModule::row_for_product(self.store, *product_id).await?;
            let translations_row = if self.locales.is_empty() {
                None
            } else {
                TranslationsModule::row_for_product(self.store, *product_id).await?
            };
            let product_meta = if self.settings.has_data_type(DataType::Meta) {
                MetafieldsModule::metafields_for(self.store, *product_id, MetafieldOwnerType::Product).await?
            } else {
                Vec::new()
            };

            for (_, variant_raw) in &variant_rows {
                let variant = Variant::from_json(variant_raw);

                let variant_meta = if self.settings.has_data_type(DataType::Meta) {
                    MetafieldsModule::metafields_for(self.store, variant.id, MetafieldOwnerType::Variant).await?
                } else {
                    Vec::new()
                };

                let inventory_row = if self.settings.has_data_type(DataType::InventoryItem)
                    || self.settings.has_data_type(DataType::InventoryLevel)
                {
                    InventoriesModule::row_for_variant(self.store, variant.id).await?
                } else {
                    None
                };

                let levels = inventory_row
                    .as_ref()
                    .and_then(|r| r.get("levels"))
                    .and_then(|l| l.as_array())
                    .cloned()
                    .unwrap_or_default();

                // With explode=true, one output row per inventory level
                // (spec §4.8); with explode=false, a single row carrying
                // every level (spec §8 invariant 4) — never just the first.
                let variant_rows_out: Vec<Vec<serde_json::Value>> =
                    if self.settings.inventory_level_explode && !levels.is_empty() {
                        levels.iter().map(|level| vec![level.clone()]).collect()
                    } else {
                        vec![levels.clone()]
                    };

                for levels_for_row in variant_rows_out {
                    let mut values = self.build_row_values(
                        &product,
                        &variant,
                        collections_row.as_ref(),
                        translations_row.as_ref(),
                        &product_meta,
                        &variant_meta,
                        &levels_for_row,
                    );
                    for key in values.keys() {
                        template.ensure_column(key);
                    }
                    rows.push(values);
                }
            }
        }

        self.stage = RunStage::FinalOutput;
        template.seal();

        let format = RowFormat::from_settings(self.settings);
        sink.write_row(template.columns(), &format)?;
        for row in &rows {
            sink.write_row(&template.render_row(row), &format)?;
        }

        Ok(())
    }

    fn modules_to_pull(&self) -> Vec<ModuleName> {
        let mut modules = active_modules(self.settings);
        if !self.locales.is_empty() {
            modules.push(ModuleName::Translations);
        }
        modules
    }

    async fn pull_module(&self, module: ModuleName) -> Result<PullStats, RunError> {
        let stats = match module {
            ModuleName::Products if self.settings.force_bulk_pieces => self.pull_products_via_rest().await?,
            ModuleName::Products => {
                ProductsModule::run(self.client, self.store, self.filters, self.has_publications_scope).await?
            }
            ModuleName::Inventory => InventoriesModule::run(self.client, self.store).await?,
            ModuleName::Meta => {
                let namespace = self.filters.value("namespace");
                MetafieldsModule::run(self.client, self.store, self.filters, namespace).await?
            }
            ModuleName::Translations => TranslationsModule::run(self.client, self.store, &self.locales).await?,
            ModuleName::Collections => {
                let include_metafields = self.settings.has_data_type(DataType::CollectionsMeta);
                CollectionsModule::run(self.client, self.store, include_metafields).await?
            }
            // Same underlying table and puller as `Collections` — see the
            // `Collections` arm above, which already honors
            // `collections_meta` via `include_metafields`.
            ModuleName::CollectionsMeta => PullStats::default(),
        };
        Ok(stats)
    }

    /// Routes the products pull through date-chunked REST pagination instead
    /// of the bulk operation driver (spec §4.6/§4.11 `force_bulk_pieces`):
    /// probes `products/count` per candidate range and fans workers out
    /// across the committed ranges.
    async fn pull_products_via_rest(&self) -> Result<PullStats, RunError> {
        let window_start: DateTime<Utc> = self
            .shop
            .created_at
            .parse()
            .unwrap_or_else(|_| Utc::now() - chrono::Duration::days(365));
        let window_end = Utc::now();
        let published_status = self.filters.value("published_status").unwrap_or("published");

        let config = RestWorkerConfig {
            shop_domain: self.client.shop_domain().to_string(),
            api_version: self.client.api_version().to_string(),
            access_token: self.client.access_token().to_string(),
            timeout_secs: self.client.timeout_secs(),
            user_agent: self.client.user_agent().to_string(),
        };

        let stats =
            products_rest::run_chunked(self.store, self.client, config, window_start, window_end, published_status)
                .await?;
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_row_values(
        &self,
        product: &Product,
        variant: &Variant,
        collections_row: Option<&serde_json::Value>,
        translations_row: Option<&serde_json::Value>,
        product_meta: &[extract_core::model::Metafield],
        variant_meta: &[extract_core::model::Metafield],
        levels: &[serde_json::Value],
    ) -> HashMap<String, String> {
        let mut values = HashMap::new();

        // GMC feed convention (spec §8 invariant 3): `id` names the variant,
        // `item_group_id` names the owning product.
        values.insert("id".to_string(), variant.id.to_string());
        values.insert("item_group_id".to_string(), product.id.to_string());
        values.insert("title".to_string(), product.title.clone());
        values.insert(
            "description_html".to_string(),
            product.description_html.clone().unwrap_or_default(),
        );
        values.insert("vendor".to_string(), product.vendor.clone().unwrap_or_default());
        values.insert("product_type".to_string(), product.product_type.clone().unwrap_or_default());
        values.insert("tags".to_string(), product.tags.join(","));
        values.insert("handle".to_string(), product.handle.clone());
        values.insert("status".to_string(), product.status.as_str().to_string());
        values.insert(
            "published_status".to_string(),
            fields::published_status(product.published_at.as_deref()).to_string(),
        );
        values.insert("sku".to_string(), variant.sku.clone().unwrap_or_default());
        values.insert("barcode".to_string(), variant.barcode.clone().unwrap_or_default());

        values.insert(
            "link".to_string(),
            fields::link(&self.shop.domain, &product.handle, variant.id),
        );
        values.insert("availability".to_string(), fields::availability(variant).to_string());
        values.insert("price".to_string(), fields::price(variant, self.settings.compare_price_override));
        values.insert("sale_price".to_string(), fields::sale_price(variant));
        values.insert("image_link".to_string(), fields::image_link(variant));

        let unit_str = fields::weight_unit(variant.inventory_item.measurement.unit.as_ref());
        let weight = fields::weight(variant.inventory_item.measurement.value);
        values.insert("shipping_weight".to_string(), fields::shipping_weight(&weight, unit_str));
        values.insert("weight".to_string(), weight);
        values.insert("weight_unit".to_string(), unit_str.to_string());

        if self.settings.use_gmc_transition_id {
            values.insert(
                "gmc_transition_id".to_string(),
                fields::gmc_transition_id(&self.shop.country_code, product.id, variant.id),
            );
        }

        let names = fields::variant_names(variant);
        let color = names.get("Color").or_else(|| names.get("color")).cloned();
        values.insert(
            "additional_variant_image_link".to_string(),
            fields::additional_variant_image_link(&product.media, variant.id, color.as_deref()),
        );
        if self.settings.variant_names_split_columns {
            for (name, value) in &names {
                values.insert(fields::variant_name_column(name), value.clone());
            }
        } else if !names.is_empty() {
            values.insert(
                "variant_names".to_string(),
                serde_json::to_string(&names).unwrap_or_default(),
            );
        }

        if self.settings.include_presentment_prices {
            if let Some(prices) = &variant.presentment_prices {
                for p in prices {
                    values.insert(
                        format!("price_{}", p.price.currency.to_lowercase()),
                        p.price.amount.clone(),
                    );
                    if let Some(cap) = &p.compare_at_price {
                        values.insert(
                            format!("compare_at_price_{}", cap.currency.to_lowercase()),
                            cap.amount.clone(),
                        );
                    }
                }
            }
        }

        if let Some(row) = collections_row {
            if let Some(obj) = row.as_object() {
                for (k, v) in obj {
                    values.insert(k.clone(), render_scalar(v));
                }
            }
        }

        if let Some(row) = translations_row {
            if let Some(obj) = row.as_object() {
                for (k, v) in obj {
                    values.insert(k.clone(), render_scalar(v));
                }
            }
        }

        if self.settings.metafields_split_columns {
            for meta in product_meta.iter().chain(variant_meta.iter()) {
                let column = fields::metafield_display_identifier(
                    meta.owner_type,
                    &meta.namespace,
                    &meta.key,
                    self.settings.use_metafield_namespaces,
                );
                values.insert(column, meta.value.clone());
            }
        } else {
            if !product_meta.is_empty() {
                values.insert("product_meta".to_string(), metafields_json(product_meta));
            }
            if !variant_meta.is_empty() {
                values.insert("variant_meta".to_string(), metafields_json(variant_meta));
            }
        }

        if self.settings.inventory_level_explode {
            if let Some(level) = levels.first() {
                if let Some(available) = level.get("available").and_then(|v| v.as_i64()) {
                    values.insert("location_available".to_string(), available.to_string());
                }
                if let Some(location_id) = level.get("location_id").and_then(|v| v.as_i64()) {
                    values.insert("location_id".to_string(), location_id.to_string());
                }
                if let Some(location_name) = level.get("location_name").and_then(|v| v.as_str()) {
                    values.insert("location_name".to_string(), location_name.to_string());
                }
            }
        } else if !levels.is_empty() {
            values.insert("inventory_levels".to_string(), render_levels_json(levels));
        }

        values
    }
}

/// Renders a metafield group as the JSON array `{key, value, namespace,
/// description}` the unsplit `product_meta`/`variant_meta` columns carry
/// (spec §8 scenario S3).
fn metafields_json(metas: &[extract_core::model::Metafield]) -> String {
    let arr: Vec<serde_json::Value> = metas
        .iter()
        .map(|m| {
            serde_json::json!({
                "key": m.key,
                "value": m.value,
                "namespace": m.namespace,
                "description": m.description,
            })
        })
        .collect();
    serde_json::Value::Array(arr).to_string()
}

/// Full-levels JSON array rendered into the `inventory_levels` column when
/// `inventory_level_explode=false` (spec §8 invariant 4): one row per
/// variant, content unreduced.
fn render_levels_json(levels: &[serde_json::Value]) -> String {
    serde_json::Value::Array(levels.to_vec()).to_string()
}

fn render_scalar(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => v.to_string(),
        other => other.to_string(),
    }
}

fn base_columns() -> Vec<String> {
    ProductsModule::output_fields()
        .into_iter()
        .map(str::to_string)
        .chain(
            [
                "item_group_id",
                "published_status",
                "sku",
                "barcode",
                "link",
                "availability",
                "price",
                "sale_price",
                "image_link",
                "additional_variant_image_link",
                "weight",
                "weight_unit",
                "shipping_weight",
            ]
            .into_iter()
            .map(str::to_string),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_columns_includes_product_fields_and_variant_derivations() {
        let cols = base_columns();
        assert!(cols.contains(&"id".to_string()));
        assert!(cols.contains(&"availability".to_string()));
        assert!(cols.contains(&"item_group_id".to_string()));
    }

    #[test]
    fn render_scalar_empties_null() {
        assert_eq!(render_scalar(&serde_json::Value::Null), "");
        assert_eq!(render_scalar(&serde_json::Value::from("x")), "x");
    }

    #[test]
    fn metafields_json_renders_one_object_per_entry() {
        use extract_core::model::{Metafield, MetafieldOwnerType};

        let metas = vec![
            Metafield {
                owner_type: MetafieldOwnerType::Product,
                owner_id: 1,
                namespace: "custom".to_string(),
                key: "a".to_string(),
                value: "1".to_string(),
                description: None,
            },
            Metafield {
                owner_type: MetafieldOwnerType::Product,
                owner_id: 1,
                namespace: "custom".to_string(),
                key: "b".to_string(),
                value: "2".to_string(),
                description: Some("desc".to_string()),
            },
        ];
        let rendered = metafields_json(&metas);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["key"], "a");
        assert_eq!(parsed[1]["description"], "desc");
    }

    #[test]
    fn render_levels_json_keeps_every_entry() {
        let levels = vec![
            serde_json::json!({"available": 3, "location_id": 1, "location_name": "A"}),
            serde_json::json!({"available": 0, "location_id": 2, "location_name": "B"}),
        ];
        let rendered = render_levels_json(&levels);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[1]["location_name"], "B");
    }
}
