// # Cloudflare Zone Backend
//
// This crate provides a Cloudflare implementation of `ZoneBackend` for rrdns.
//
// ## Behaviour
//
// - One HTTP request per primitive (plus the zone lookup)
// - No retry, backoff or caching: a single attempt is authoritative for a run
// - Record names are sent fully qualified (`web.contoso.com`)
// - Specific errors for HTTP status codes (401/403, 404, 429, 5xx)
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Backend fails fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use rrdns_core::config::BackendConfig;
use rrdns_core::record::{fqdn, RecordFamily};
use rrdns_core::registry::BackendRegistry;
use rrdns_core::traits::{ZoneBackend, ZoneBackendFactory};
use rrdns_core::{Error, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

#[cfg(test)]
mod mock_api;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per page when listing
const PAGE_SIZE: u32 = 100;

/// Cloudflare zone backend
///
/// # Trust Level: Untrusted
///
/// This backend is isolated, stateless, and single-shot. Deciding what to
/// change is owned by `Reconciler`.
///
/// # Security
///
/// The Debug implementation does NOT expose the API token.
pub struct CloudflareBackend {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// API base URL without trailing slash
    endpoint: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareBackend")
            .field("api_token", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl CloudflareBackend {
    /// Create a new Cloudflare backend
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `endpoint`: API base URL; `None` uses [`CLOUDFLARE_API_BASE`]
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the token is empty
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(api_token: impl Into<String>, endpoint: Option<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = endpoint
            .unwrap_or_else(|| CLOUDFLARE_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_token,
            endpoint,
            client,
        })
    }

    /// Map a non-success HTTP status to an error
    fn status_error(status: reqwest::StatusCode, body: &str, context: &str) -> Error {
        match status.as_u16() {
            401 | 403 => Error::auth(format!(
                "Invalid API token or insufficient permissions ({}). Status: {}",
                context, status
            )),
            404 => Error::not_found(format!("{}: {}", context, status)),
            429 => Error::rate_limited(format!(
                "Rate limit exceeded ({}). Please retry later. Status: {}",
                context, status
            )),
            500..=599 => Error::provider(
                "cloudflare",
                format!("Cloudflare server error (transient) during {}: {} - {}", context, status, body),
            ),
            _ => Error::provider("cloudflare", format!("{} failed: {} - {}", context, status, body)),
        }
    }

    /// Send a request and decode the API envelope
    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> Result<Value> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("HTTP request failed ({}): {}", context, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Self::status_error(status, &body, context));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("Failed to parse response ({}): {}", context, e)))?;

        if json["success"].as_bool() == Some(false) {
            let messages: Vec<&str> = json["errors"]
                .as_array()
                .map(|errors| errors.iter().filter_map(|e| e["message"].as_str()).collect())
                .unwrap_or_default();
            return Err(Error::provider(
                "cloudflare",
                format!("{} rejected: {}", context, messages.join("; ")),
            ));
        }

        Ok(json)
    }

    /// Look up a zone ID by name
    ///
    /// ```http
    /// GET /zones?name=contoso.com
    /// ```
    async fn find_zone_id(&self, zone: &str) -> Result<Option<String>> {
        let url = format!("{}/zones", self.endpoint);
        let json = self
            .send(self.client.get(&url).query(&[("name", zone)]), "zone lookup")
            .await?;

        let zones = json["result"]
            .as_array()
            .ok_or_else(|| Error::provider("cloudflare", "Invalid response format: result is not an array"))?;

        let Some(first) = zones.first() else {
            return Ok(None);
        };

        let zone_id = first["id"]
            .as_str()
            .ok_or_else(|| Error::provider("cloudflare", "Invalid response format: zone.id is not a string"))?;

        tracing::debug!("Found zone ID for {}", zone);
        Ok(Some(zone_id.to_string()))
    }

    async fn zone_id(&self, zone: &str) -> Result<String> {
        self.find_zone_id(zone)
            .await?
            .ok_or_else(|| Error::zone_not_found(zone))
    }

    /// List records of one name and type, optionally narrowed to one value
    ///
    /// Returns `(record_id, address)` pairs across all result pages.
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=web.contoso.com&type=A&page=1&per_page=100
    /// ```
    async fn find_records(
        &self,
        zone_id: &str,
        record_name: &str,
        family: RecordFamily,
        content: Option<IpAddr>,
    ) -> Result<Vec<(String, IpAddr)>> {
        let url = format!("{}/zones/{}/dns_records", self.endpoint, zone_id);
        let mut found = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query = vec![
                ("name", record_name.to_string()),
                ("type", family.as_str().to_string()),
                ("page", page.to_string()),
                ("per_page", PAGE_SIZE.to_string()),
            ];
            if let Some(address) = content {
                query.push(("content", address.to_string()));
            }

            let json = self
                .send(self.client.get(&url).query(&query), "record lookup")
                .await?;

            let records = json["result"]
                .as_array()
                .ok_or_else(|| Error::provider("cloudflare", "Invalid response format: result is not an array"))?;

            for record in records {
                let (Some(id), Some(value)) = (record["id"].as_str(), record["content"].as_str()) else {
                    return Err(Error::provider(
                        "cloudflare",
                        "Invalid response format: record id/content is not a string",
                    ));
                };
                match value.parse::<IpAddr>() {
                    Ok(address) => found.push((id.to_string(), address)),
                    Err(_) => tracing::warn!(
                        "Ignoring {} record {} with unparsable content '{}'",
                        family,
                        record_name,
                        value
                    ),
                }
            }

            let total_pages = json["result_info"]["total_pages"].as_u64().unwrap_or(1);
            if u64::from(page) >= total_pages || records.is_empty() {
                break;
            }
            page += 1;
        }

        Ok(found)
    }
}

#[async_trait]
impl ZoneBackend for CloudflareBackend {
    async fn zone_exists(&self, zone: &str) -> Result<bool> {
        Ok(self.find_zone_id(zone).await?.is_some())
    }

    async fn list_records(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
    ) -> Result<BTreeSet<IpAddr>> {
        let zone_id = self.zone_id(zone).await?;
        let records = self
            .find_records(&zone_id, &fqdn(zone, name), family, None)
            .await?;
        Ok(records.into_iter().map(|(_, address)| address).collect())
    }

    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// { "type": "A", "name": "web.contoso.com", "content": "10.0.1.10", "ttl": 60, "proxied": false }
    /// ```
    async fn add_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
        ttl: u32,
    ) -> Result<()> {
        if !family.matches(&address) {
            return Err(Error::invalid_input(format!(
                "{address} is not a valid {family} record value"
            )));
        }

        let zone_id = self.zone_id(zone).await?;
        let record_name = fqdn(zone, name);
        let url = format!("{}/zones/{}/dns_records", self.endpoint, zone_id);
        let payload = serde_json::json!({
            "type": family.as_str(),
            "name": record_name,
            "content": address.to_string(),
            "ttl": ttl,
            "proxied": false,
        });

        self.send(self.client.post(&url).json(&payload), "record create")
            .await?;

        tracing::debug!("Created {} {} -> {}", family, record_name, address);
        Ok(())
    }

    /// Looks the record up by content, then deletes every match
    ///
    /// ```http
    /// DELETE /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn remove_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
    ) -> Result<()> {
        let zone_id = self.zone_id(zone).await?;
        let record_name = fqdn(zone, name);

        let matches: Vec<String> = self
            .find_records(&zone_id, &record_name, family, Some(address))
            .await?
            .into_iter()
            .filter(|(_, content)| *content == address)
            .map(|(id, _)| id)
            .collect();

        if matches.is_empty() {
            return Err(Error::not_found(format!(
                "{} {} -> {} is not published",
                family, record_name, address
            )));
        }

        for record_id in matches {
            let url = format!("{}/zones/{}/dns_records/{}", self.endpoint, zone_id, record_id);
            self.send(self.client.delete(&url), "record delete").await?;
        }

        tracing::debug!("Deleted {} {} -> {}", family, record_name, address);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory for creating Cloudflare backends
pub struct CloudflareFactory;

impl ZoneBackendFactory for CloudflareFactory {
    fn create(&self, config: &BackendConfig) -> Result<Box<dyn ZoneBackend>> {
        match config {
            BackendConfig::Cloudflare {
                api_token,
                endpoint,
            } => Ok(Box::new(CloudflareBackend::new(
                api_token.clone(),
                endpoint.clone(),
            )?)),
            _ => Err(Error::config("Invalid config for Cloudflare backend")),
        }
    }
}

/// Register the Cloudflare backend with a registry
///
/// # Example
///
/// ```rust
/// use rrdns_core::BackendRegistry;
///
/// let registry = BackendRegistry::with_builtin();
/// rrdns_provider_cloudflare::register(&registry);
/// assert!(registry.has_backend("cloudflare"));
/// ```
pub fn register(registry: &BackendRegistry) {
    registry.register_backend("cloudflare", Box::new(CloudflareFactory));
}
