//! Per-run request configuration (spec §4.3), parsed from a flat
//! `name -> value` option map — the CLI's `--option key=value` flags or a
//! `--config-file` yaml document, both normalized to this map before they
//! reach [`Settings::parse`].

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::CoreError;

fn shop_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-_A-Za-z0-9]+$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataType {
    Meta,
    Collections,
    CollectionsMeta,
    InventoryLevel,
    InventoryItem,
}

/// Per-run settings parsed from the inbound option map.
#[derive(Debug, Clone)]
pub struct Settings {
    pub shop_name: String,
    pub oauth_token: String,
    pub data_types: BTreeSet<DataType>,

    pub metafields_split_columns: bool,
    pub variant_names_split_columns: bool,
    pub inventory_level_explode: bool,
    pub include_presentment_prices: bool,
    pub compare_price_override: bool,
    pub use_gmc_transition_id: bool,
    pub use_metafield_namespaces: bool,
    pub force_bulk_pieces: bool,
    pub debug: bool,

    pub delimiter: String,
    pub enclosure: String,
    pub escape: String,
    pub strip_characters: String,
    pub tax_rates: String,

    pub table_prefix: String,
}

impl Settings {
    /// Parses a flat option map into `Settings`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `shop_name` is missing or fails
    /// `^[-_A-Za-z0-9]+$`, or if neither `oauth_token` nor the legacy
    /// `password` alias is present.
    pub fn parse(
        options: &HashMap<String, String>,
        high_precision_now: &str,
    ) -> Result<Self, CoreError> {
        let shop_name = options
            .get("shop_name")
            .cloned()
            .ok_or_else(|| CoreError::Validation("missing required option: shop_name".into()))?;
        if !shop_name_re().is_match(&shop_name) {
            return Err(CoreError::Validation(format!(
                "shop_name {shop_name:?} does not match ^[-_A-Za-z0-9]+$"
            )));
        }

        let oauth_token = options
            .get("oauth_token")
            .or_else(|| options.get("password"))
            .cloned()
            .ok_or_else(|| {
                CoreError::Validation(
                    "missing required option: oauth_token (or legacy alias password)".into(),
                )
            })?;

        let mut data_types = BTreeSet::new();
        if bool_opt(options, "meta") {
            data_types.insert(DataType::Meta);
        }
        if bool_opt(options, "collections") {
            data_types.insert(DataType::Collections);
        }
        if bool_opt(options, "collections_meta") {
            data_types.insert(DataType::CollectionsMeta);
            data_types.insert(DataType::Collections);
        }
        if bool_opt(options, "inventory_level") {
            data_types.insert(DataType::InventoryLevel);
            data_types.insert(DataType::InventoryItem);
        }
        if bool_opt(options, "inventory_item") {
            data_types.insert(DataType::InventoryItem);
        }

        let table_prefix = derive_table_prefix(&shop_name, high_precision_now);

        Ok(Self {
            shop_name,
            oauth_token,
            data_types,
            metafields_split_columns: bool_opt(options, "metafields_split_columns"),
            variant_names_split_columns: bool_opt(options, "variant_names_split_columns"),
            inventory_level_explode: bool_opt(options, "inventory_level_explode"),
            include_presentment_prices: bool_opt_default(options, "include_presentment_prices", true),
            compare_price_override: bool_opt_default(options, "compare_price_override", true),
            use_gmc_transition_id: bool_opt(options, "use_gmc_transition_id"),
            use_metafield_namespaces: bool_opt(options, "use_metafield_namespaces"),
            force_bulk_pieces: bool_opt(options, "force_bulk_pieces"),
            debug: bool_opt(options, "debug"),
            delimiter: options.get("delimiter").cloned().unwrap_or_else(|| ",".into()),
            enclosure: options.get("enclosure").cloned().unwrap_or_else(|| "\"".into()),
            escape: options.get("escape").cloned().unwrap_or_else(|| "\"".into()),
            strip_characters: options.get("strip_characters").cloned().unwrap_or_default(),
            tax_rates: options.get("tax_rates").cloned().unwrap_or_default(),
            table_prefix,
        })
    }

    #[must_use]
    pub fn has_data_type(&self, dt: DataType) -> bool {
        self.data_types.contains(&dt)
    }
}

fn bool_opt(options: &HashMap<String, String>, key: &str) -> bool {
    bool_opt_default(options, key, false)
}

fn bool_opt_default(options: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match options.get(key) {
        None => default,
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
    }
}

/// table-prefix = last 32 chars of alphanumeric-only `shop_name + high_precision_now`.
fn derive_table_prefix(shop_name: &str, high_precision_now: &str) -> String {
    let combined: String = format!("{shop_name}{high_precision_now}")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if combined.len() <= 32 {
        combined
    } else {
        combined[combined.len() - 32..].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opts() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("shop_name".into(), "acme-store".into());
        m.insert("oauth_token".into(), "shpat_abc".into());
        m
    }

    #[test]
    fn parses_minimal_settings() {
        let s = Settings::parse(&base_opts(), "1690000000.123").unwrap();
        assert_eq!(s.shop_name, "acme-store");
        assert_eq!(s.oauth_token, "shpat_abc");
        assert_eq!(s.delimiter, ",");
        assert!(s.include_presentment_prices);
        assert!(s.compare_price_override);
    }

    #[test]
    fn rejects_invalid_shop_name() {
        let mut opts = base_opts();
        opts.insert("shop_name".into(), "not valid!".into());
        assert!(Settings::parse(&opts, "1").is_err());
    }

    #[test]
    fn password_alias_substitutes_for_oauth_token() {
        let mut opts = HashMap::new();
        opts.insert("shop_name".into(), "acme".into());
        opts.insert("password".into(), "legacy-pw".into());
        let s = Settings::parse(&opts, "1").unwrap();
        assert_eq!(s.oauth_token, "legacy-pw");
    }

    #[test]
    fn missing_oauth_token_and_password_fails() {
        let mut opts = HashMap::new();
        opts.insert("shop_name".into(), "acme".into());
        assert!(Settings::parse(&opts, "1").is_err());
    }

    #[test]
    fn collections_meta_implies_collections() {
        let mut opts = base_opts();
        opts.insert("collections_meta".into(), "true".into());
        let s = Settings::parse(&opts, "1").unwrap();
        assert!(s.has_data_type(DataType::Collections));
        assert!(s.has_data_type(DataType::CollectionsMeta));
    }

    #[test]
    fn inventory_level_implies_inventory_item() {
        let mut opts = base_opts();
        opts.insert("inventory_level".into(), "1".into());
        let s = Settings::parse(&opts, "1").unwrap();
        assert!(s.has_data_type(DataType::InventoryItem));
        assert!(s.has_data_type(DataType::InventoryLevel));
    }

    #[test]
    fn strip_characters_defaults_empty_and_is_passed_through() {
        let s = Settings::parse(&base_opts(), "1").unwrap();
        assert_eq!(s.strip_characters, "");

        let mut opts = base_opts();
        opts.insert("strip_characters".into(), "\r\n".into());
        let s = Settings::parse(&opts, "1").unwrap();
        assert_eq!(s.strip_characters, "\r\n");
    }

    #[test]
    fn table_prefix_is_alphanumeric_and_at_most_32_chars() {
        let s = Settings::parse(&base_opts(), "1690000000.123456").unwrap();
        assert!(s.table_prefix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(s.table_prefix.len() <= 32);
    }

    #[test]
    fn table_prefix_keeps_suffix_when_combined_exceeds_32() {
        let long_now = "9".repeat(40);
        let s = Settings::parse(&base_opts(), &long_now).unwrap();
        assert_eq!(s.table_prefix.len(), 32);
        assert!(s.table_prefix.ends_with("999"));
    }
}
