//! Shopify GraphQL global ID (`gid://shopify/<Type>/<id>`) parsing.
//!
//! Every bulk-operation JSONL line and every REST/GraphQL response node is
//! keyed by one of these; the rest of the engine works with the plain
//! `(resource, id)` pair extracted here rather than the string form.

use std::fmt;

use crate::CoreError;

/// A parsed `gid://shopify/<Type>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gid {
    pub resource: String,
    pub id: i64,
}

impl Gid {
    /// Parses a Shopify global ID string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if the string does not match
    /// `gid://shopify/<Type>/<id>` with `id` a positive 64-bit integer.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let rest = raw.strip_prefix("gid://shopify/").ok_or_else(|| {
            CoreError::Validation(format!("not a shopify gid: {raw:?}"))
        })?;

        let mut parts = rest.rsplitn(2, '/');
        let id_part = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::Validation(format!("malformed gid: {raw:?}")))?;
        let resource = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::Validation(format!("malformed gid: {raw:?}")))?;

        // Some gids carry a query string suffix (e.g. "...?id=...") on certain
        // legacy node types; strip it defensively before parsing the integer.
        let id_part = id_part.split('?').next().unwrap_or(id_part);

        let id: i64 = id_part
            .parse()
            .map_err(|_| CoreError::Validation(format!("non-numeric gid id: {raw:?}")))?;

        if id <= 0 {
            return Err(CoreError::Validation(format!(
                "gid id must be > 0, got {id} in {raw:?}"
            )));
        }

        Ok(Self {
            resource: resource.to_string(),
            id,
        })
    }

    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gid://shopify/{}/{}", self.resource, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_product_gid() {
        let gid = Gid::parse("gid://shopify/Product/123456789").unwrap();
        assert_eq!(gid.resource, "Product");
        assert_eq!(gid.id, 123_456_789);
    }

    #[test]
    fn round_trips_to_string() {
        let raw = "gid://shopify/ProductVariant/987";
        let gid = Gid::parse(raw).unwrap();
        assert_eq!(gid.to_string(), raw);
    }

    #[test]
    fn rejects_non_gid_string() {
        assert!(Gid::parse("not-a-gid").is_err());
    }

    #[test]
    fn rejects_non_numeric_id() {
        assert!(Gid::parse("gid://shopify/Product/abc").is_err());
    }

    #[test]
    fn rejects_zero_id() {
        assert!(Gid::parse("gid://shopify/Product/0").is_err());
    }

    #[test]
    fn rejects_negative_id() {
        assert!(Gid::parse("gid://shopify/Product/-5").is_err());
    }

    #[test]
    fn rejects_missing_resource() {
        assert!(Gid::parse("gid://shopify/123").is_err());
    }

    #[test]
    fn resource_type_accessor() {
        let gid = Gid::parse("gid://shopify/Collection/1").unwrap();
        assert_eq!(gid.resource_type(), "Collection");
    }
}
