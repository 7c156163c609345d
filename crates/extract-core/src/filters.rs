//! `FilterManager` (spec §4.2): validated `name -> value` filter state and
//! its two renderings — REST query params and a GraphQL search string.

use std::collections::HashMap;

use crate::CoreError;

const PRODUCT_FILTER_NAMES: &[&str] = &[
    "ids",
    "limit",
    "since_id",
    "title",
    "vendor",
    "handle",
    "product_type",
    "status",
    "collection_id",
    "published_status",
    "fields",
    "presentment_currencies",
];

const META_FILTER_NAMES: &[&str] = &["namespace"];

/// Filter names whose REST rendering is suppressed.
const REST_HIDDEN: &[&str] = &["namespace"];

/// Filter names rendered as GraphQL top-level search arguments rather than
/// folded into the `query:"..."` search string.
const SEARCH_KEYS: &[&str] = &["namespace"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Single(String),
    List(Vec<String>),
}

impl FilterValue {
    fn as_rest_param(&self) -> String {
        match self {
            FilterValue::Single(v) => v.clone(),
            FilterValue::List(items) => items.join(","),
        }
    }

    fn as_query_term(&self, key: &str) -> String {
        match self {
            FilterValue::Single(v) => format!("{key}:{v}"),
            FilterValue::List(items) => items
                .iter()
                .map(|v| format!("{key}:{v}"))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Validated `name -> value` filter map plus its renderings.
#[derive(Debug, Clone, Default)]
pub struct FilterManager {
    values: HashMap<String, FilterValue>,
}

impl FilterManager {
    /// Builds a `FilterManager` from raw `name -> value` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for any name outside the enumerated
    /// product/meta filter names.
    pub fn new(raw: HashMap<String, FilterValue>) -> Result<Self, CoreError> {
        for name in raw.keys() {
            if !PRODUCT_FILTER_NAMES.contains(&name.as_str())
                && !META_FILTER_NAMES.contains(&name.as_str())
            {
                return Err(CoreError::Validation(format!("unknown filter name: {name}")));
            }
        }

        let mut values = raw;
        values
            .entry("published_status".to_string())
            .or_insert_with(|| FilterValue::Single("published".to_string()));

        Ok(Self { values })
    }

    /// Applies a per-call override on top of the defaults. An empty-string
    /// value erases the existing default for that key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `name` is not an enumerated
    /// filter name.
    pub fn set_override(&mut self, name: &str, value: &str) -> Result<(), CoreError> {
        if !PRODUCT_FILTER_NAMES.contains(&name) && !META_FILTER_NAMES.contains(&name) {
            return Err(CoreError::Validation(format!("unknown filter name: {name}")));
        }
        if value.is_empty() {
            self.values.remove(name);
        } else {
            self.values
                .insert(name.to_string(), FilterValue::Single(value.to_string()));
        }
        Ok(())
    }

    /// Returns the raw first value stored for `name`, if set — used to pull
    /// a single override (e.g. `namespace`) through to a module's own API
    /// rather than re-deriving it from a rendered form.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            FilterValue::Single(v) => Some(v.as_str()),
            FilterValue::List(items) => items.first().map(String::as_str),
        }
    }

    /// Renders the subset of filters visible to REST list endpoints.
    #[must_use]
    pub fn as_rest_params(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .values
            .iter()
            .filter(|(k, _)| !REST_HIDDEN.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.as_rest_param()))
            .collect();
        out.sort();
        out
    }

    /// Renders the GraphQL `query:"..."` search string plus any top-level
    /// search arguments (like `namespace:`).
    #[must_use]
    pub fn as_graphql_search(&self) -> (String, Vec<(String, String)>) {
        let mut query_terms: Vec<String> = Vec::new();
        let mut search_args: Vec<(String, String)> = Vec::new();

        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();

        for key in keys {
            let value = &self.values[key];
            if SEARCH_KEYS.contains(&key.as_str()) {
                search_args.push((key.clone(), value.as_rest_param()));
            } else {
                query_terms.push(value.as_query_term(key));
            }
        }

        (query_terms.join(" "), search_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_published_status_to_published() {
        let fm = FilterManager::new(HashMap::new()).unwrap();
        let params = fm.as_rest_params();
        assert!(params.contains(&("published_status".to_string(), "published".to_string())));
    }

    #[test]
    fn rejects_unknown_filter_name() {
        let mut raw = HashMap::new();
        raw.insert("bogus".to_string(), FilterValue::Single("x".to_string()));
        assert!(FilterManager::new(raw).is_err());
    }

    #[test]
    fn namespace_is_search_key_not_rest_visible() {
        let mut raw = HashMap::new();
        raw.insert(
            "namespace".to_string(),
            FilterValue::Single("custom".to_string()),
        );
        let fm = FilterManager::new(raw).unwrap();
        assert!(!fm
            .as_rest_params()
            .iter()
            .any(|(k, _)| k == "namespace"));
        let (_, search_args) = fm.as_graphql_search();
        assert_eq!(
            search_args,
            vec![("namespace".to_string(), "custom".to_string())]
        );
    }

    #[test]
    fn list_value_comma_joins_for_rest_and_space_joins_for_query() {
        let mut raw = HashMap::new();
        raw.insert(
            "ids".to_string(),
            FilterValue::List(vec!["1".to_string(), "2".to_string()]),
        );
        let fm = FilterManager::new(raw).unwrap();
        assert!(fm.as_rest_params().contains(&("ids".to_string(), "1,2".to_string())));
        let (query, _) = fm.as_graphql_search();
        assert!(query.contains("ids:1"));
        assert!(query.contains("ids:2"));
    }

    #[test]
    fn empty_override_erases_default() {
        let mut fm = FilterManager::new(HashMap::new()).unwrap();
        fm.set_override("published_status", "").unwrap();
        assert!(!fm
            .as_rest_params()
            .iter()
            .any(|(k, _)| k == "published_status"));
    }

    #[test]
    fn override_rejects_unknown_name() {
        let mut fm = FilterManager::new(HashMap::new()).unwrap();
        assert!(fm.set_override("bogus", "x").is_err());
    }
}
