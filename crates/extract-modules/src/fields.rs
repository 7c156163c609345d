//! Per-field output derivations (spec §4.8). Pure functions over the model
//! types plus the ambient [`ShopContext`] and `Settings` — no global state,
//! per the Design Note replacing the original's process-global session.

use std::collections::BTreeMap;

use extract_core::{DataType, MetafieldOwnerType, Settings, ShopContext, Variant, WeightUnit};

/// `availability`: "out of stock" iff the item is tracked, below one unit,
/// and denies oversell, or the variant itself is unavailable for sale.
#[must_use]
pub fn availability(variant: &Variant) -> &'static str {
    let tracked = variant.inventory_item.tracked;
    let deny_oversell = variant.inventory_policy == extract_core::model::InventoryPolicy::Deny;
    let below_one = variant.inventory_quantity.is_some_and(|q| q < 1);

    if (tracked && below_one && deny_oversell) || !variant.available_for_sale {
        "out of stock"
    } else {
        "in stock"
    }
}

/// `price`: `compareAtPrice` when both prices are present and
/// `compare_price_override` is set; else `price`.
#[must_use]
pub fn price(variant: &Variant, compare_price_override: bool) -> String {
    match &variant.compare_at_price {
        Some(cap) if !cap.is_empty() && !variant.price.is_empty() && compare_price_override => {
            cap.clone()
        }
        _ => variant.price.clone(),
    }
}

/// `sale_price`: `price` when both prices are present; else empty.
#[must_use]
pub fn sale_price(variant: &Variant) -> String {
    match &variant.compare_at_price {
        Some(cap) if !cap.is_empty() && !variant.price.is_empty() => variant.price.clone(),
        _ => String::new(),
    }
}

/// `weight_unit` mapping (GRAMS→g, OUNCES→oz, POUNDS→lb, KILOGRAMS→kg).
#[must_use]
pub fn weight_unit(unit: Option<&WeightUnit>) -> &'static str {
    match unit {
        Some(WeightUnit::Grams) => "g",
        Some(WeightUnit::Ounces) => "oz",
        Some(WeightUnit::Pounds) => "lb",
        Some(WeightUnit::Kilograms) => "kg",
        _ => "",
    }
}

/// `weight`: appends `.0` when the raw value has no decimal point.
#[must_use]
pub fn weight(raw_value: Option<f64>) -> String {
    match raw_value {
        None => String::new(),
        Some(v) => {
            let s = v.to_string();
            if s.contains('.') {
                s
            } else {
                format!("{s}.0")
            }
        }
    }
}

/// `shipping_weight`: `trim(weight + " " + weight_unit)`.
#[must_use]
pub fn shipping_weight(weight: &str, weight_unit: &str) -> String {
    format!("{weight} {weight_unit}").trim().to_string()
}

/// `link`: canonical product URL, normalizing the shop domain's `www.`
/// prefix (strip if present, then re-prepend if the host has fewer than two
/// dots, e.g. `example.myshopify.com` stays bare but `example.com` gets
/// `www.` added back).
#[must_use]
pub fn link(domain: &str, handle: &str, variant_id: i64) -> String {
    let stripped = domain.strip_prefix("www.").unwrap_or(domain);
    let dot_count = stripped.matches('.').count();
    let normalized = if dot_count < 2 {
        format!("www.{stripped}")
    } else {
        stripped.to_string()
    };
    format!("https://{normalized}/products/{handle}?variant={variant_id}")
}

/// `gmc_transition_id`: `shopify_<country_code>_<product_id>_<variant_id>`.
#[must_use]
pub fn gmc_transition_id(country_code: &str, product_id: i64, variant_id: i64) -> String {
    format!("shopify_{country_code}_{product_id}_{variant_id}")
}

/// `image_link`: the variant's own image, if any.
#[must_use]
pub fn image_link(variant: &Variant) -> String {
    variant
        .image
        .as_ref()
        .map(|img| img.url.clone())
        .unwrap_or_default()
}

/// `additional_variant_image_link`: union of product media attached to this
/// variant by id, or matched by a `color-<value>` / `<value>` substring in
/// `altText` (case-insensitive), de-duplicated and comma-joined.
#[must_use]
pub fn additional_variant_image_link(
    media: &[extract_core::MediaImage],
    variant_id: i64,
    color_value: Option<&str>,
) -> String {
    let color_needle_a = color_value.map(|c| format!("color-{}", c.to_lowercase()));
    let color_needle_b = color_value.map(str::to_lowercase);

    let mut seen = std::collections::BTreeSet::new();
    let mut urls = Vec::new();

    for image in media {
        let by_variant = image.variant_ids.contains(&variant_id);
        let by_alt = image
            .alt_text
            .as_deref()
            .map(str::to_lowercase)
            .is_some_and(|alt| {
                color_needle_a.as_deref().is_some_and(|n| alt.contains(n))
                    || color_needle_b.as_deref().is_some_and(|n| alt.contains(n))
            });

        if (by_variant || by_alt) && seen.insert(image.url.clone()) {
            urls.push(image.url.clone());
        }
    }

    urls.join(",")
}

/// `variant_names`: option-name → selected-value map, in selection order.
#[must_use]
pub fn variant_names(variant: &Variant) -> BTreeMap<String, String> {
    variant
        .selected_options
        .iter()
        .map(|o| (o.name.clone(), o.value.clone()))
        .collect()
}

/// Column name for a split `variant_names` entry: `variant_<lowercased name>`.
#[must_use]
pub fn variant_name_column(option_name: &str) -> String {
    format!("variant_{}", option_name.to_lowercase())
}

/// `requires_shipping` / `taxable` render as the literal strings `"true"`/`"false"`.
#[must_use]
pub fn bool_field(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// `published_status`: "published" if `publishedAt` is set.
#[must_use]
pub fn published_status(published_at: Option<&str>) -> &'static str {
    if published_at.is_some() {
        "published"
    } else {
        "unpublished"
    }
}

/// Display identifier for a translation row: `<locale>_<key>` with non-word
/// characters stripped (spec §3 Translation).
#[must_use]
pub fn translation_display_identifier(locale: &str, key: &str) -> String {
    strip_non_word(&format!("{locale}_{key}"))
}

/// Display identifier for a metafield (spec §3 Metafield):
/// `{parent|variant|collection}_meta_[<namespace>_]<key>`, non-word chars
/// stripped, lowercased, `-` mapped to `_`, length-capped at 254.
#[must_use]
pub fn metafield_display_identifier(
    owner_type: MetafieldOwnerType,
    namespace: &str,
    key: &str,
    use_namespaces: bool,
) -> String {
    let body = if use_namespaces {
        format!("{namespace}_{key}")
    } else {
        key.to_string()
    };
    let raw = format!("{}_meta_{body}", owner_type.display_prefix());
    let id = strip_non_word(&raw).to_lowercase();
    id.chars().take(254).collect()
}

fn strip_non_word(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Per-module required OAuth scopes (spec §4.12).
#[must_use]
pub fn required_scopes(settings: &Settings) -> Vec<&'static str> {
    let mut scopes = vec!["read_products"];
    if settings.has_data_type(DataType::InventoryItem) || settings.has_data_type(DataType::InventoryLevel) {
        scopes.push("read_inventory");
    }
    scopes.sort_unstable();
    scopes.dedup();
    scopes
}

#[must_use]
pub fn shop_context_is_valid(ctx: &ShopContext) -> bool {
    !ctx.domain.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract_core::model::{InventoryItem, InventoryPolicy, MediaImage, SelectedOption, VariantImage};
    use extract_core::Variant;

    fn base_variant() -> Variant {
        let mut v = Variant::new(1, 10, "Default Title");
        v.price = "19.99".to_string();
        v
    }

    #[test]
    fn availability_out_of_stock_when_tracked_deny_and_empty() {
        let mut v = base_variant();
        v.inventory_item = InventoryItem {
            tracked: true,
            ..Default::default()
        };
        v.inventory_policy = InventoryPolicy::Deny;
        v.inventory_quantity = Some(0);
        assert_eq!(availability(&v), "out of stock");
    }

    #[test]
    fn availability_in_stock_when_continue_policy_allows_oversell() {
        let mut v = base_variant();
        v.inventory_item = InventoryItem {
            tracked: true,
            ..Default::default()
        };
        v.inventory_policy = InventoryPolicy::Continue;
        v.inventory_quantity = Some(0);
        assert_eq!(availability(&v), "in stock");
    }

    #[test]
    fn availability_out_of_stock_when_not_available_for_sale() {
        let mut v = base_variant();
        v.available_for_sale = false;
        assert_eq!(availability(&v), "out of stock");
    }

    #[test]
    fn price_uses_compare_at_when_override_enabled() {
        let mut v = base_variant();
        v.compare_at_price = Some("24.99".to_string());
        assert_eq!(price(&v, true), "24.99");
        assert_eq!(price(&v, false), "19.99");
    }

    #[test]
    fn sale_price_empty_unless_both_prices_present() {
        let mut v = base_variant();
        assert_eq!(sale_price(&v), "");
        v.compare_at_price = Some("24.99".to_string());
        assert_eq!(sale_price(&v), "19.99");
    }

    #[test]
    fn weight_unit_mapping() {
        assert_eq!(weight_unit(Some(&WeightUnit::Grams)), "g");
        assert_eq!(weight_unit(Some(&WeightUnit::Kilograms)), "kg");
        assert_eq!(weight_unit(None), "");
    }

    #[test]
    fn weight_appends_decimal_when_missing() {
        assert_eq!(weight(Some(5.0)), "5.0");
        assert_eq!(weight(Some(5.5)), "5.5");
        assert_eq!(weight(None), "");
    }

    #[test]
    fn link_normalizes_bare_domain_with_www() {
        assert_eq!(
            link("example.com", "acme-shirt", 42),
            "https://www.example.com/products/acme-shirt?variant=42"
        );
    }

    #[test]
    fn link_strips_and_preserves_multi_dot_domain() {
        assert_eq!(
            link("www.shop.example.com", "acme-shirt", 42),
            "https://shop.example.com/products/acme-shirt?variant=42"
        );
    }

    #[test]
    fn gmc_transition_id_format() {
        assert_eq!(gmc_transition_id("US", 1, 2), "shopify_US_1_2");
    }

    #[test]
    fn additional_variant_image_dedupes_and_matches_by_color() {
        let media = vec![
            MediaImage {
                url: "https://cdn/a.jpg".into(),
                alt_text: Some("Color-Red detail".into()),
                width: None,
                height: None,
                variant_ids: vec![],
            },
            MediaImage {
                url: "https://cdn/b.jpg".into(),
                alt_text: None,
                width: None,
                height: None,
                variant_ids: vec![42],
            },
            MediaImage {
                url: "https://cdn/a.jpg".into(),
                alt_text: Some("Color-Red again".into()),
                width: None,
                height: None,
                variant_ids: vec![],
            },
        ];
        let result = additional_variant_image_link(&media, 42, Some("Red"));
        assert_eq!(result, "https://cdn/a.jpg,https://cdn/b.jpg");
    }

    #[test]
    fn variant_names_map_and_column_naming() {
        let mut v = base_variant();
        v.selected_options = vec![
            SelectedOption {
                name: "Color".into(),
                value: "Red".into(),
            },
            SelectedOption {
                name: "Size".into(),
                value: "M".into(),
            },
        ];
        let names = variant_names(&v);
        assert_eq!(names.get("Color"), Some(&"Red".to_string()));
        assert_eq!(variant_name_column("Color"), "variant_color");
    }

    #[test]
    fn published_status_reflects_published_at() {
        assert_eq!(published_status(Some("2024-01-01")), "published");
        assert_eq!(published_status(None), "unpublished");
    }

    #[test]
    fn translation_display_identifier_strips_non_word_chars() {
        assert_eq!(translation_display_identifier("en-US", "title"), "en_US_title");
    }

    #[test]
    fn metafield_display_identifier_respects_namespace_flag() {
        assert_eq!(
            metafield_display_identifier(MetafieldOwnerType::Product, "custom", "color", true),
            "parent_meta_custom_color"
        );
        assert_eq!(
            metafield_display_identifier(MetafieldOwnerType::Product, "custom", "color", false),
            "parent_meta_color"
        );
    }

    #[test]
    fn metafield_display_identifier_prefixes_by_owner_and_lowercases() {
        assert_eq!(
            metafield_display_identifier(MetafieldOwnerType::Variant, "Custom-NS", "Color", true),
            "variant_meta_custom_ns_color"
        );
        assert_eq!(
            metafield_display_identifier(MetafieldOwnerType::Collection, "ns", "k", true),
            "collection_meta_ns_k"
        );
    }

    #[test]
    fn metafield_display_identifier_caps_length_at_254() {
        let long_key = "k".repeat(300);
        let id = metafield_display_identifier(MetafieldOwnerType::Product, "ns", &long_key, false);
        assert_eq!(id.chars().count(), 254);
    }

    #[test]
    fn image_link_uses_variant_image_url() {
        let mut v = base_variant();
        assert_eq!(image_link(&v), "");
        v.image = Some(VariantImage {
            url: "https://cdn/v.jpg".into(),
        });
        assert_eq!(image_link(&v), "https://cdn/v.jpg");
    }
}
