//! Shared JSONL line shape for bulk-operation parsing (spec §4.7.1).
//!
//! Every module's parser reads the same kind of line: a JSON object keyed
//! by GID type (via `id`), optionally carrying `__parentId`. Presentment
//! price nodes are the one documented exception — no `id` field at all.

use extract_client::ClientError;
use extract_core::Gid;
use serde_json::Value;

pub struct BulkLine {
    pub gid: Option<Gid>,
    pub parent_gid: Option<Gid>,
    pub raw: Value,
}

impl BulkLine {
    /// # Errors
    ///
    /// [`ClientError::Parse`] if `raw_line` is not valid JSON.
    pub fn parse(raw_line: &str) -> Result<Self, ClientError> {
        let raw: Value =
            serde_json::from_str(raw_line).map_err(|e| ClientError::Parse(e.to_string()))?;
        let gid = raw
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Gid::parse(s).ok());
        let parent_gid = raw
            .get("__parentId")
            .and_then(Value::as_str)
            .and_then(|s| Gid::parse(s).ok());
        Ok(Self { gid, parent_gid, raw })
    }

    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.gid.as_ref().map(|g| g.resource.as_str())
    }

    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<String> {
        self.raw.get(name).and_then(Value::as_str).map(str::to_string)
    }

    #[must_use]
    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.raw.get(name).and_then(Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_product_line() {
        let line = r#"{"id":"gid://shopify/Product/1","title":"Shirt"}"#;
        let parsed = BulkLine::parse(line).unwrap();
        assert_eq!(parsed.resource_type(), Some("Product"));
        assert_eq!(parsed.str_field("title"), Some("Shirt".to_string()));
        assert!(parsed.parent_gid.is_none());
    }

    #[test]
    fn parses_child_line_with_parent() {
        let line = r#"{"id":"gid://shopify/ProductVariant/2","__parentId":"gid://shopify/Product/1"}"#;
        let parsed = BulkLine::parse(line).unwrap();
        assert_eq!(parsed.resource_type(), Some("ProductVariant"));
        assert_eq!(parsed.parent_gid.unwrap().resource, "Product");
    }

    #[test]
    fn parses_id_less_child_line() {
        let line = r#"{"__parentId":"gid://shopify/ProductVariant/2","amount":"9.99"}"#;
        let parsed = BulkLine::parse(line).unwrap();
        assert!(parsed.gid.is_none());
        assert_eq!(parsed.parent_gid.unwrap().resource, "ProductVariant");
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(BulkLine::parse("not json").is_err());
    }
}
