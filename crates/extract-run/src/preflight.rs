//! Preflight (spec §4.12): confirm the shop is reachable and the access
//! token carries every scope this run's active modules need before any
//! bulk operation is submitted.

use reqwest::Method;

use extract_client::ShopifyClient;
use extract_core::{CoreError, Settings, ShopContext};

use crate::error::RunError;

#[derive(Debug, Clone)]
pub struct PreflightResult {
    pub shop: ShopContext,
    pub granted_scopes: Vec<String>,
    pub has_publications_scope: bool,
}

/// Fetches `shop.json` and `access_scopes.json`, then checks the granted
/// scopes against [`extract_modules::fields::required_scopes`].
///
/// # Errors
///
/// [`RunError::Core`] wrapping [`CoreError::Permission`] if a required scope
/// is missing, or [`CoreError::Infra`] if the shop payload comes back empty.
/// Propagates [`RunError::Client`] on a transport/API failure.
pub async fn run(
    client: &ShopifyClient,
    settings: &Settings,
    api_version: &str,
) -> Result<PreflightResult, RunError> {
    let shop_body = client.request(Method::GET, "shop.json", None, &[]).await?;
    let shop = shop_body.get("shop").cloned().unwrap_or(serde_json::Value::Null);
    if shop.is_null() {
        return Err(RunError::Core(CoreError::Infra(
            "shop.json returned an empty payload".to_string(),
        )));
    }

    let domain = shop.get("myshopify_domain").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let country_code = shop.get("country_code").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let created_at = shop.get("created_at").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let tax_rates_json = if settings.tax_rates.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&settings.tax_rates).unwrap_or(serde_json::Value::Null)
    };

    let shop_context = ShopContext {
        domain,
        country_code,
        created_at,
        tax_rates_json,
        api_version: api_version.to_string(),
    };

    let scopes_body = client.request(Method::GET, "access_scopes.json", None, &[]).await?;
    let granted_scopes: Vec<String> = scopes_body
        .get("access_scopes")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.get("handle").and_then(|h| h.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let required = extract_modules::fields::required_scopes(settings);
    let missing: Vec<String> = required
        .iter()
        .filter(|scope| !granted_scopes.iter().any(|g| g == *scope))
        .map(|s| (*s).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(RunError::Core(CoreError::Permission(missing)));
    }

    let has_publications_scope = granted_scopes.iter().any(|s| s == "read_publications");

    Ok(PreflightResult {
        shop: shop_context,
        granted_scopes,
        has_publications_scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_shop_payload_is_rejected() {
        let shop = serde_json::Value::Null;
        assert!(shop.is_null());
    }
}
