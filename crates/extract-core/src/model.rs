//! Data model (spec §3): `Product`, `Variant`, `Metafield`, `Collection`,
//! inventory rows, translations, and the ambient `ShopContext`.
//!
//! Each model is a [`FieldHaver`]: a typed field bag with a small set of
//! strongly-typed members plus an `extra` passthrough bag for
//! caller-requested additional GraphQL fields (`extra_parent_fields`,
//! `extra_variant_fields`, `extra_options` of spec §6). Output-field
//! *derivations* (availability, price, weight, …) are not methods here —
//! per the "ambient session" design note they need [`ShopContext`] and
//! run `Settings`, so they live as free functions in `extract-modules::fields`
//! that take an explicit context argument instead of reaching for a global.

use std::collections::HashMap;

use serde_json::Value;

/// A typed field bag with a JSON escape hatch for fields the model doesn't
/// know about by name (spec §2.5).
pub trait FieldHaver {
    /// Returns the value of `name`, checking known typed fields first and
    /// falling back to the `extra` bag.
    fn field(&self, name: &str) -> Option<Value>;

    /// A full JSON view of the model (known fields + extras), used when a
    /// module needs to persist the whole record to the intermediate store.
    fn to_json(&self) -> Value;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductStatus {
    Active,
    Archived,
    Draft,
}

impl ProductStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
            ProductStatus::Draft => "draft",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "archived" => ProductStatus::Archived,
            "draft" => ProductStatus::Draft,
            _ => ProductStatus::Active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProductOption {
    pub name: String,
    pub position: i32,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MediaImage {
    pub url: String,
    pub alt_text: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub variant_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct Publication {
    pub name: String,
}

/// spec §3 `Product`. Invariant: `id > 0`.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: i64,
    pub title: String,
    pub description_html: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub tags: Vec<String>,
    pub handle: String,
    pub status: ProductStatus,
    pub published_at: Option<String>,
    pub created_at: Option<String>,
    pub options: Vec<ProductOption>,
    pub media: Vec<MediaImage>,
    pub publications: Option<Vec<Publication>>,
    pub variants: Vec<Variant>,
    pub extra: HashMap<String, Value>,
}

impl Product {
    /// # Panics
    /// Never: construction enforces `id > 0` is the caller's responsibility,
    /// matching how GID parsing already rejects non-positive ids upstream.
    #[must_use]
    pub fn new(id: i64, title: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description_html: None,
            vendor: None,
            product_type: None,
            tags: Vec::new(),
            handle: handle.into(),
            status: ProductStatus::Active,
            published_at: None,
            created_at: None,
            options: Vec::new(),
            media: Vec::new(),
            publications: None,
            variants: Vec::new(),
            extra: HashMap::new(),
        }
    }
}

impl FieldHaver for Product {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.id)),
            "title" => Some(Value::from(self.title.clone())),
            "description_html" => self.description_html.clone().map(Value::from),
            "vendor" => self.vendor.clone().map(Value::from),
            "product_type" => self.product_type.clone().map(Value::from),
            "tags" => Some(Value::from(self.tags.clone())),
            "handle" => Some(Value::from(self.handle.clone())),
            "status" => Some(Value::from(self.status.as_str())),
            "published_at" => self.published_at.clone().map(Value::from),
            "created_at" => self.created_at.clone().map(Value::from),
            _ => self.extra.get(name).cloned(),
        }
    }

    fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), Value::from(self.id));
        map.insert("title".into(), Value::from(self.title.clone()));
        map.insert("handle".into(), Value::from(self.handle.clone()));
        map.insert("status".into(), Value::from(self.status.as_str()));
        if let Some(v) = &self.description_html {
            map.insert("description_html".into(), Value::from(v.clone()));
        }
        if let Some(v) = &self.vendor {
            map.insert("vendor".into(), Value::from(v.clone()));
        }
        if let Some(v) = &self.product_type {
            map.insert("product_type".into(), Value::from(v.clone()));
        }
        map.insert("tags".into(), Value::from(self.tags.clone()));
        if let Some(v) = &self.published_at {
            map.insert("published_at".into(), Value::from(v.clone()));
        }
        if let Some(v) = &self.created_at {
            map.insert("created_at".into(), Value::from(v.clone()));
        }
        map.insert(
            "options".into(),
            Value::Array(
                self.options
                    .iter()
                    .map(|o| {
                        serde_json::json!({ "name": o.name, "position": o.position, "values": o.values })
                    })
                    .collect(),
            ),
        );
        map.insert(
            "media".into(),
            Value::Array(self.media.iter().map(media_to_json).collect()),
        );
        if let Some(publications) = &self.publications {
            map.insert(
                "publications".into(),
                Value::Array(
                    publications
                        .iter()
                        .map(|p| serde_json::json!({ "name": p.name }))
                        .collect(),
                ),
            );
        }
        for (k, v) in &self.extra {
            map.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Value::Object(map)
    }
}

fn media_to_json(media: &MediaImage) -> Value {
    serde_json::json!({
        "url": media.url,
        "alt_text": media.alt_text,
        "width": media.width,
        "height": media.height,
        "variant_ids": media.variant_ids,
    })
}

fn media_from_json(raw: &Value) -> MediaImage {
    MediaImage {
        url: raw.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
        alt_text: raw.get("alt_text").and_then(Value::as_str).map(str::to_string),
        width: raw.get("width").and_then(Value::as_i64).map(|v| v as i32),
        height: raw.get("height").and_then(Value::as_i64).map(|v| v as i32),
        variant_ids: raw
            .get("variant_ids")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default(),
    }
}

impl Product {
    /// Reconstructs a `Product` from its [`FieldHaver::to_json`] view — the
    /// run manager's read path when joining the intermediate store's
    /// `products_prod` rows back into typed models. Variants are not
    /// included; they live in `products_vars` and are attached separately.
    #[must_use]
    pub fn from_json(raw: &Value) -> Self {
        let id = raw.get("id").and_then(Value::as_i64).unwrap_or(0);
        let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();
        let handle = raw.get("handle").and_then(Value::as_str).unwrap_or_default();
        let mut product = Self::new(id, title, handle);

        product.description_html = raw.get("description_html").and_then(Value::as_str).map(str::to_string);
        product.vendor = raw.get("vendor").and_then(Value::as_str).map(str::to_string);
        product.product_type = raw.get("product_type").and_then(Value::as_str).map(str::to_string);
        product.tags = raw
            .get("tags")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        product.status = raw.get("status").and_then(Value::as_str).map_or(ProductStatus::Active, ProductStatus::parse);
        product.published_at = raw.get("published_at").and_then(Value::as_str).map(str::to_string);
        product.created_at = raw.get("created_at").and_then(Value::as_str).map(str::to_string);
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
        product.media = raw
            .get("media")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().map(media_from_json).collect())
            .unwrap_or_default();
        product.publications = raw.get("publications").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .map(|p| Publication {
                    name: p.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                })
                .collect()
        });

        product
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightUnit {
    Grams,
    Ounces,
    Pounds,
    Kilograms,
    Unknown,
}

impl WeightUnit {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Grams => "GRAMS",
            WeightUnit::Ounces => "OUNCES",
            WeightUnit::Pounds => "POUNDS",
            WeightUnit::Kilograms => "KILOGRAMS",
            WeightUnit::Unknown => "UNKNOWN",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "GRAMS" => Some(WeightUnit::Grams),
            "OUNCES" => Some(WeightUnit::Ounces),
            "POUNDS" => Some(WeightUnit::Pounds),
            "KILOGRAMS" => Some(WeightUnit::Kilograms),
            "UNKNOWN" => Some(WeightUnit::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WeightMeasurement {
    pub value: Option<f64>,
    pub unit: Option<WeightUnit>,
}

#[derive(Debug, Clone)]
pub struct Money {
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, Default)]
pub struct InventoryItem {
    pub id: Option<i64>,
    pub sku: Option<String>,
    pub measurement: WeightMeasurement,
    pub tracked: bool,
    pub requires_shipping: bool,
    pub unit_cost: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryPolicy {
    Deny,
    Continue,
}

impl InventoryPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryPolicy::Deny => "deny",
            InventoryPolicy::Continue => "continue",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "continue" | "CONTINUE" => InventoryPolicy::Continue,
            _ => InventoryPolicy::Deny,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectedOption {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct VariantImage {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct PresentmentPrice {
    pub price: Money,
    pub compare_at_price: Option<Money>,
}

/// spec §3 `Variant`. Invariant: `product_id > 0`. The back-reference to the
/// owning `Product` is a non-owning index, not a strong reference — see
/// Design Note on circular owner/variant references.
#[derive(Debug, Clone)]
pub struct Variant {
    pub id: i64,
    pub product_id: i64,
    pub title: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: String,
    pub compare_at_price: Option<String>,
    pub selected_options: Vec<SelectedOption>,
    pub inventory_item: InventoryItem,
    pub inventory_quantity: Option<i32>,
    pub inventory_policy: InventoryPolicy,
    pub inventory_management: Option<String>,
    pub available_for_sale: bool,
    pub image: Option<VariantImage>,
    pub position: i32,
    pub presentment_prices: Option<Vec<PresentmentPrice>>,
    pub extra: HashMap<String, Value>,
}

impl Variant {
    #[must_use]
    pub fn new(id: i64, product_id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            product_id,
            title: title.into(),
            sku: None,
            barcode: None,
            price: String::new(),
            compare_at_price: None,
            selected_options: Vec::new(),
            inventory_item: InventoryItem::default(),
            inventory_quantity: None,
            inventory_policy: InventoryPolicy::Deny,
            inventory_management: None,
            available_for_sale: true,
            image: None,
            position: 1,
            presentment_prices: None,
            extra: HashMap::new(),
        }
    }
}

impl FieldHaver for Variant {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.id)),
            "product_id" => Some(Value::from(self.product_id)),
            "title" => Some(Value::from(self.title.clone())),
            "sku" => self.sku.clone().map(Value::from),
            "barcode" => self.barcode.clone().map(Value::from),
            "price" => Some(Value::from(self.price.clone())),
            "compare_at_price" => self.compare_at_price.clone().map(Value::from),
            "inventory_quantity" => self.inventory_quantity.map(Value::from),
            "available_for_sale" => Some(Value::from(self.available_for_sale)),
            "position" => Some(Value::from(self.position)),
            _ => self.extra.get(name).cloned(),
        }
    }

    fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), Value::from(self.id));
        map.insert("product_id".into(), Value::from(self.product_id));
        map.insert("title".into(), Value::from(self.title.clone()));
        map.insert("price".into(), Value::from(self.price.clone()));
        if let Some(v) = &self.sku {
            map.insert("sku".into(), Value::from(v.clone()));
        }
        if let Some(v) = &self.barcode {
            map.insert("barcode".into(), Value::from(v.clone()));
        }
        if let Some(v) = &self.compare_at_price {
            map.insert("compare_at_price".into(), Value::from(v.clone()));
        }
        map.insert(
            "available_for_sale".into(),
            Value::from(self.available_for_sale),
        );
        map.insert("position".into(), Value::from(self.position));
        map.insert(
            "selected_options".into(),
            Value::Array(
                self.selected_options
                    .iter()
                    .map(|o| serde_json::json!({ "name": o.name, "value": o.value }))
                    .collect(),
            ),
        );
        map.insert("inventory_item".into(), inventory_item_to_json(&self.inventory_item));
        if let Some(v) = self.inventory_quantity {
            map.insert("inventory_quantity".into(), Value::from(v));
        }
        map.insert("inventory_policy".into(), Value::from(self.inventory_policy.as_str()));
        if let Some(v) = &self.inventory_management {
            map.insert("inventory_management".into(), Value::from(v.clone()));
        }
        if let Some(image) = &self.image {
            map.insert("image".into(), serde_json::json!({ "url": image.url }));
        }
        if let Some(prices) = &self.presentment_prices {
            map.insert(
                "presentment_prices".into(),
                Value::Array(prices.iter().map(presentment_price_to_json).collect()),
            );
        }
        for (k, v) in &self.extra {
            map.entry(k.clone()).or_insert_with(|| v.clone());
        }
        Value::Object(map)
    }
}

fn money_to_json(money: &Money) -> Value {
    serde_json::json!({ "amount": money.amount, "currency": money.currency })
}

fn money_from_json(raw: &Value) -> Option<Money> {
    let amount = raw.get("amount").and_then(Value::as_str)?.to_string();
    let currency = raw.get("currency").and_then(Value::as_str)?.to_string();
    Some(Money { amount, currency })
}

fn inventory_item_to_json(item: &InventoryItem) -> Value {
    serde_json::json!({
        "id": item.id,
        "sku": item.sku,
        "measurement": {
            "value": item.measurement.value,
            "unit": item.measurement.unit.as_ref().map(WeightUnit::as_str),
        },
        "tracked": item.tracked,
        "requires_shipping": item.requires_shipping,
        "unit_cost": item.unit_cost.as_ref().map(money_to_json),
    })
}

fn inventory_item_from_json(raw: &Value) -> InventoryItem {
    let measurement = raw.get("measurement");
    InventoryItem {
        id: raw.get("id").and_then(Value::as_i64),
        sku: raw.get("sku").and_then(Value::as_str).map(str::to_string),
        measurement: WeightMeasurement {
            value: measurement.and_then(|m| m.get("value")).and_then(Value::as_f64),
            unit: measurement
                .and_then(|m| m.get("unit"))
                .and_then(Value::as_str)
                .and_then(WeightUnit::parse),
        },
        tracked: raw.get("tracked").and_then(Value::as_bool).unwrap_or(false),
        requires_shipping: raw.get("requires_shipping").and_then(Value::as_bool).unwrap_or(false),
        unit_cost: raw.get("unit_cost").and_then(money_from_json),
    }
}

fn presentment_price_to_json(price: &PresentmentPrice) -> Value {
    serde_json::json!({
        "price": money_to_json(&price.price),
        "compare_at_price": price.compare_at_price.as_ref().map(money_to_json),
    })
}

fn presentment_price_from_json(raw: &Value) -> Option<PresentmentPrice> {
    let price = raw.get("price").and_then(money_from_json)?;
    let compare_at_price = raw.get("compare_at_price").and_then(money_from_json);
    Some(PresentmentPrice { price, compare_at_price })
}

impl Variant {
    /// Reconstructs a `Variant` from its [`FieldHaver::to_json`] view — the
    /// run manager's read path when joining `products_vars` rows back into
    /// typed models before running field derivations against them.
    #[must_use]
    pub fn from_json(raw: &Value) -> Self {
        let id = raw.get("id").and_then(Value::as_i64).unwrap_or(0);
        let product_id = raw.get("product_id").and_then(Value::as_i64).unwrap_or(0);
        let title = raw.get("title").and_then(Value::as_str).unwrap_or_default();
        let mut variant = Self::new(id, product_id, title);

        variant.sku = raw.get("sku").and_then(Value::as_str).map(str::to_string);
        variant.barcode = raw.get("barcode").and_then(Value::as_str).map(str::to_string);
        variant.price = raw.get("price").and_then(Value::as_str).unwrap_or_default().to_string();
        variant.compare_at_price = raw.get("compare_at_price").and_then(Value::as_str).map(str::to_string);
        variant.available_for_sale = raw.get("available_for_sale").and_then(Value::as_bool).unwrap_or(true);
        variant.position = raw.get("position").and_then(Value::as_i64).unwrap_or(1) as i32;
        variant.selected_options = raw
            .get("selected_options")
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
        variant.inventory_item = raw
            .get("inventory_item")
            .map(inventory_item_from_json)
            .unwrap_or_default();
        variant.inventory_quantity = raw.get("inventory_quantity").and_then(Value::as_i64).map(|v| v as i32);
        variant.inventory_policy = raw
            .get("inventory_policy")
            .and_then(Value::as_str)
            .map_or(InventoryPolicy::Deny, InventoryPolicy::parse);
        variant.inventory_management = raw.get("inventory_management").and_then(Value::as_str).map(str::to_string);
        variant.image = raw.get("image").and_then(|i| i.get("url")).and_then(Value::as_str).map(|url| VariantImage {
            url: url.to_string(),
        });
        variant.presentment_prices = raw.get("presentment_prices").and_then(Value::as_array).map(|arr| {
            arr.iter().filter_map(presentment_price_from_json).collect()
        });

        variant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetafieldOwnerType {
    Product,
    Variant,
    Collection,
}

impl MetafieldOwnerType {
    #[must_use]
    pub fn display_prefix(self) -> &'static str {
        match self {
            MetafieldOwnerType::Product => "parent",
            MetafieldOwnerType::Variant => "variant",
            MetafieldOwnerType::Collection => "collection",
        }
    }
}

/// spec §3 `Metafield`. Display identifier is computed in
/// `extract-modules::fields::metafield_display_identifier`.
#[derive(Debug, Clone)]
pub struct Metafield {
    pub owner_type: MetafieldOwnerType,
    pub owner_id: i64,
    pub namespace: String,
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

impl FieldHaver for Metafield {
    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "namespace" => Some(Value::from(self.namespace.clone())),
            "key" => Some(Value::from(self.key.clone())),
            "value" => Some(Value::from(self.value.clone())),
            "description" => self.description.clone().map(Value::from),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        serde_json::json!({
            "value": self.value,
            "namespace": self.namespace,
            "description": self.description,
        })
    }
}

#[derive(Debug, Clone)]
pub enum CollectionKind {
    Custom,
    Smart,
}

/// spec §3 `Collection`. `rule_set` presence decides `CollectionKind`.
#[derive(Debug, Clone)]
pub struct Collection {
    pub id: i64,
    pub handle: String,
    pub title: String,
    pub has_rule_set: bool,
    pub product_ids: Vec<i64>,
    pub metafields: Vec<Metafield>,
}

impl Collection {
    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        if self.has_rule_set {
            CollectionKind::Smart
        } else {
            CollectionKind::Custom
        }
    }
}

#[derive(Debug, Clone)]
pub struct InventoryLevel {
    pub inventory_item_id: i64,
    pub location_id: i64,
    pub available: i32,
    pub location_name: String,
    pub fulfillment_service: Option<String>,
}

/// spec §3 inventory row: one per variant, holding its item and all levels.
#[derive(Debug, Clone)]
pub struct InventoryRow {
    pub variant_id: i64,
    pub item: InventoryItem,
    pub levels: Vec<InventoryLevel>,
}

/// spec §3 `Translation`: one `{locale, key, value}` per product.
#[derive(Debug, Clone)]
pub struct Translation {
    pub product_id: i64,
    pub locale: String,
    pub key: String,
    pub value: String,
}

/// spec §3 `Shop context`: explicit, threaded context replacing the
/// original's process-global "active session" (Design Note).
#[derive(Debug, Clone)]
pub struct ShopContext {
    pub domain: String,
    pub country_code: String,
    pub created_at: String,
    pub tax_rates_json: Value,
    pub api_version: String,
}
