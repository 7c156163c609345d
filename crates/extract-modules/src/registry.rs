//! Module precedence and primary-module selection (spec §4.10).
//!
//! The five pullers (products is always active; the rest gate on
//! `Settings.data_types`) don't share a uniform `run()` signature — each
//! needs different inputs (locales for translations, a namespace for
//! metafields, a `force_bulk_pieces` decision for products). Rather than
//! force them behind one `async fn` trait object (not object-safe without
//! `async_trait`, which nothing in this stack pulls in), the run manager
//! matches on [`ModuleName`] and calls the concrete puller directly; this
//! registry only decides *which* modules are active and which one drives
//! output.

use extract_core::{DataType, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleName {
    Inventory,
    Products,
    Meta,
    Translations,
    Collections,
    CollectionsMeta,
}

impl ModuleName {
    /// Lower is higher precedence (spec §4.10: inventory, products, meta,
    /// translations, collections, collections_meta).
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            ModuleName::Inventory => 0,
            ModuleName::Products => 1,
            ModuleName::Meta => 2,
            ModuleName::Translations => 3,
            ModuleName::Collections => 4,
            ModuleName::CollectionsMeta => 5,
        }
    }

    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            ModuleName::Inventory => crate::inventories::NAME,
            ModuleName::Products => crate::products::NAME,
            ModuleName::Meta => crate::metafields::NAME,
            ModuleName::Translations => crate::translations::NAME,
            ModuleName::Collections | ModuleName::CollectionsMeta => crate::collections::NAME,
        }
    }
}

/// Active modules for `settings`, in registration order (products is
/// unconditional; the rest are data-type-gated).
#[must_use]
pub fn active_modules(settings: &Settings) -> Vec<ModuleName> {
    let mut modules = vec![ModuleName::Products];
    if settings.has_data_type(DataType::InventoryItem) || settings.has_data_type(DataType::InventoryLevel) {
        modules.push(ModuleName::Inventory);
    }
    if settings.has_data_type(DataType::Meta) {
        modules.push(ModuleName::Meta);
    }
    if settings.has_data_type(DataType::Collections) {
        modules.push(ModuleName::Collections);
    }
    if settings.has_data_type(DataType::CollectionsMeta) {
        modules.push(ModuleName::CollectionsMeta);
    }
    modules
}

/// The highest-precedence active module; its `get_products` iterator drives
/// output (spec §4.10).
#[must_use]
pub fn primary_module(settings: &Settings) -> ModuleName {
    active_modules(settings)
        .into_iter()
        .min_by_key(|m| m.precedence())
        .unwrap_or(ModuleName::Products)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_with(opts: &[(&str, &str)]) -> Settings {
        let mut map = HashMap::new();
        map.insert("shop_name".to_string(), "acme".to_string());
        map.insert("oauth_token".to_string(), "token".to_string());
        for (k, v) in opts {
            map.insert((*k).to_string(), (*v).to_string());
        }
        Settings::parse(&map, "1").unwrap()
    }

    #[test]
    fn products_is_primary_with_no_other_modules() {
        let settings = settings_with(&[]);
        assert_eq!(primary_module(&settings), ModuleName::Products);
    }

    #[test]
    fn inventory_outranks_products_when_both_active() {
        let settings = settings_with(&[("inventory_item", "true")]);
        assert_eq!(primary_module(&settings), ModuleName::Inventory);
    }

    #[test]
    fn collections_meta_implies_collections_in_active_set() {
        let settings = settings_with(&[("collections_meta", "true")]);
        let active = active_modules(&settings);
        assert!(active.contains(&ModuleName::Collections));
        assert!(active.contains(&ModuleName::CollectionsMeta));
    }
}
