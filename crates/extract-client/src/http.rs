//! `ShopifyClient` (spec §4.4): the one HTTP entry point both the REST
//! paginator and the bulk driver build on top of.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::error::ClientError;
use crate::rate_limit::retry_with_backoff;

const MAX_ATTEMPTS: u32 = 8;
const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CAP_SECS: u64 = 300;

/// Tracks the most recently observed `X-Shopify-Shop-Api-Call-Limit` header,
/// reported as `used/total`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiCallLimit {
    pub used: u32,
    pub total: u32,
}

/// HTTP client for the Shopify Admin REST and GraphQL APIs.
///
/// Adds `X-Shopify-Access-Token`, retries transient failures with
/// exponential backoff (honoring `Retry-After` on 429), and fails fast on
/// non-retriable 4xx/303 responses.
pub struct ShopifyClient {
    client: Client,
    shop_domain: String,
    api_version: String,
    access_token: String,
    timeout_secs: u64,
    user_agent: String,
    last_link_header: std::sync::Mutex<Option<String>>,
    last_call_limit: std::sync::Mutex<ApiCallLimit>,
}

impl ShopifyClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        shop_domain: &str,
        api_version: &str,
        access_token: &str,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            shop_domain: shop_domain.to_string(),
            api_version: api_version.to_string(),
            access_token: access_token.to_string(),
            timeout_secs,
            user_agent: user_agent.to_string(),
            last_link_header: std::sync::Mutex::new(None),
            last_call_limit: std::sync::Mutex::new(ApiCallLimit::default()),
        })
    }

    /// The shop domain this client was built with, e.g. `acme.myshopify.com`.
    #[must_use]
    pub fn shop_domain(&self) -> &str {
        &self.shop_domain
    }

    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn admin_url(&self, path: &str) -> String {
        format!(
            "https://{}/admin/api/{}/{}",
            self.shop_domain,
            self.api_version,
            path.trim_start_matches('/')
        )
    }

    /// Issues one REST admin request, retrying transient failures.
    ///
    /// `payload` becomes the query string on GET and a JSON body otherwise.
    ///
    /// # Errors
    ///
    /// [`ClientError::Api`] on a final non-retriable or retry-exhausted
    /// status; [`ClientError::Transport`] on an unretried transport failure.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
        extra_headers: &[(&str, &str)],
    ) -> Result<Value, ClientError> {
        let url = self.admin_url(path);

        retry_with_backoff(MAX_ATTEMPTS, BACKOFF_BASE_SECS, BACKOFF_CAP_SECS, || {
            let url = url.clone();
            let method = method.clone();
            async move {
                let mut req = self
                    .client
                    .request(method.clone(), &url)
                    .header("X-Shopify-Access-Token", &self.access_token)
                    .header("Content-Type", "application/json");

                for (k, v) in extra_headers {
                    req = req.header(*k, *v);
                }

                req = if method == Method::GET {
                    if let Some(payload) = payload {
                        req.query(payload)
                    } else {
                        req
                    }
                } else if let Some(payload) = payload {
                    req.json(payload)
                } else {
                    req
                };

                let response = req.send().await?;
                self.handle_response(response).await
            }
        })
        .await
    }

    /// Probes `products/count.json` with `query_params`, used by the date
    /// chunker to size a candidate range before committing it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::request`], plus [`ClientError::Parse`] if the response
    /// carries no `count` field.
    pub async fn count_products(&self, query_params: &[(String, String)]) -> Result<u64, ClientError> {
        let payload = serde_json::to_value(
            query_params
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect::<serde_json::Map<_, _>>(),
        )
        .unwrap();
        let body = self.request(Method::GET, "products/count.json", Some(&payload), &[]).await?;
        body.get("count")
            .and_then(Value::as_u64)
            .ok_or_else(|| ClientError::Parse("products/count.json missing count".to_string()))
    }

    /// Issues a GraphQL admin request and returns the decoded `data` body.
    ///
    /// # Errors
    ///
    /// Same as [`Self::request`], plus [`ClientError::Parse`] if the response
    /// does not carry a JSON object body.
    pub async fn graphql_request(&self, query: &str) -> Result<Value, ClientError> {
        let url = self.admin_url("graphql.json");
        let body = serde_json::json!({ "query": query });

        retry_with_backoff(MAX_ATTEMPTS, BACKOFF_BASE_SECS, BACKOFF_CAP_SECS, || {
            let url = url.clone();
            let body = body.clone();
            async move {
                let response = self
                    .client
                    .post(&url)
                    .header("X-Shopify-Access-Token", &self.access_token)
                    .header("Content-Type", "application/json")
                    .json(&body)
                    .send()
                    .await?;
                self.handle_response(response).await
            }
        })
        .await
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();

        if let Some(link) = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
        {
            *self.last_link_header.lock().unwrap() = Some(link.to_string());
        }

        if let Some(limit_header) = response
            .headers()
            .get("X-Shopify-Shop-Api-Call-Limit")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(parsed) = parse_call_limit(limit_header) {
                *self.last_call_limit.lock().unwrap() = parsed;
            }
        }

        let request_id = response
            .headers()
            .get("X-Request-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok())
                .map_or(2, |secs| secs.ceil() as u64);
            return Err(ClientError::RateLimit { retry_after_secs });
        }

        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Transient(format!("{status}: {body}")));
        }

        if status.as_u16() == 303 || (status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS) {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
                request_id,
            });
        }

        let body = response.text().await?;
        serde_json::from_str::<Value>(&body).map_err(|e| ClientError::Parse(e.to_string()))
    }

    /// The `Link` header value from the most recently completed request.
    #[must_use]
    pub fn last_link_header(&self) -> Option<String> {
        self.last_link_header.lock().unwrap().clone()
    }

    /// The most recently observed `X-Shopify-Shop-Api-Call-Limit`.
    #[must_use]
    pub fn last_call_limit(&self) -> ApiCallLimit {
        *self.last_call_limit.lock().unwrap()
    }
}

/// Parses `"used/total"` from the `X-Shopify-Shop-Api-Call-Limit` header.
fn parse_call_limit(raw: &str) -> Option<ApiCallLimit> {
    let (used, total) = raw.split_once('/')?;
    Some(ApiCallLimit {
        used: used.trim().parse().ok()?,
        total: total.trim().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_call_limit_header() {
        let limit = parse_call_limit("2/40").unwrap();
        assert_eq!(limit.used, 2);
        assert_eq!(limit.total, 40);
    }

    #[test]
    fn rejects_malformed_call_limit_header() {
        assert!(parse_call_limit("garbage").is_none());
    }

    #[test]
    fn builds_admin_url_with_version_and_path() {
        let client = ShopifyClient::new(
            "example.myshopify.com",
            "2024-01",
            "shpat_x",
            30,
            "test-agent/0.1",
        )
        .unwrap();
        assert_eq!(
            client.admin_url("products.json"),
            "https://example.myshopify.com/admin/api/2024-01/products.json"
        );
    }
}
