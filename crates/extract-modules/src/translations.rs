//! Translations module (spec §4.7.4): one output column per distinct
//! `<locale>_<key>`. `translations` is a plain list field (not a paginated
//! connection), so every locale's entries arrive embedded directly in the
//! product's own JSONL line — one alias per requested locale.

use extract_client::bulk::checked_read_line;
use extract_client::{BulkDriver, ShopifyClient};
use extract_store::{DuplicateKeyPolicy, IntermediateStore};
use serde_json::Value;

use crate::bulk_line::BulkLine;
use crate::error::{ModuleError, PullStats};
use crate::fields::translation_display_identifier;

pub const NAME: &str = "translations";

pub struct TranslationsModule;

fn locale_alias(locale: &str) -> String {
    format!("t_{}", locale.replace('-', "_").to_lowercase())
}

impl TranslationsModule {
    #[must_use]
    pub fn build_query(locales: &[String]) -> String {
        let aliases: String = locales
            .iter()
            .map(|locale| {
                let alias = locale_alias(locale);
                format!(r#"{alias}: translations(locale: "{locale}") {{ key locale value }}"#)
            })
            .collect::<Vec<_>>()
            .join("\n        ");

        format!(
            r#"{{
  products(first: 250) {{
    edges {{
      node {{
        id
        {aliases}
      }}
    }}
  }}
}}"#
        )
    }

    /// Pulls translations for `locales` via the bulk driver.
    ///
    /// # Errors
    ///
    /// Propagates [`ModuleError`] from the client, parser, or store.
    pub async fn run(
        client: &ShopifyClient,
        store: &IntermediateStore,
        locales: &[String],
    ) -> Result<PullStats, ModuleError> {
        store.create_module_tables(NAME).await?;

        let driver = BulkDriver::new(client);
        let query = Self::build_query(locales);
        let path = driver.run(&query).await?;

        let mut stats = PullStats::default();
        let Some(path) = path else {
            return Ok(stats);
        };

        let mut reader = extract_client::bulk::open_jsonl(&path)?;
        let mut buf = String::new();

        while let Some(line) = checked_read_line(&mut reader, &mut buf)? {
            if line.is_empty() {
                continue;
            }
            let parsed = BulkLine::parse(&line)?;
            if parsed.resource_type() != Some("Product") {
                stats.warnings += 1;
                continue;
            }
            let product_id = parsed.gid.as_ref().map(|g| g.id).ok_or_else(|| ModuleError::Parse {
                module: NAME,
                reason: "translations product line missing id".to_string(),
            })?;

            let row = build_row(&parsed.raw, locales);
            stats.products += 1;
            store
                .insert_prod(NAME, product_id, &row, DuplicateKeyPolicy::Throw)
                .await?;
        }

        Ok(stats)
    }

    /// Fetches a product's translation columns, if pulled.
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

fn build_row(raw: &Value, locales: &[String]) -> Value {
    let mut map = serde_json::Map::new();
    for locale in locales {
        let alias = locale_alias(locale);
        let Some(entries) = raw.get(&alias).and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let key = entry.get("key").and_then(Value::as_str).unwrap_or_default();
            let locale_name = entry.get("locale").and_then(Value::as_str).unwrap_or(locale);
            let value = entry.get("value").and_then(Value::as_str).unwrap_or_default();
            let column = translation_display_identifier(locale_name, key);
            map.insert(column, Value::from(value));
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_aliases_one_field_per_locale() {
        let query = TranslationsModule::build_query(&["en".to_string(), "fr-CA".to_string()]);
        assert!(query.contains(r#"t_en: translations(locale: "en")"#));
        assert!(query.contains(r#"t_fr_ca: translations(locale: "fr-CA")"#));
    }

    #[test]
    fn build_row_maps_locale_key_to_display_column() {
        let raw: Value = serde_json::from_str(
            r#"{"id":"gid://shopify/Product/1","t_en":[{"key":"title","locale":"en","value":"Shirt"}]}"#,
        )
        .unwrap();
        let row = build_row(&raw, &["en".to_string()]);
        assert_eq!(row["en_title"], "Shirt");
    }
}
