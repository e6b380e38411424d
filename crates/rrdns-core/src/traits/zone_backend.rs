// # Zone Backend Trait
//
// Defines the interface to the DNS zone manager that owns the published
// record sets.
//
// ## Implementations
//
// - In-memory: `rrdns_core::backend::MemoryZoneBackend`
// - JSON zone file: `rrdns_core::backend::FileZoneBackend`
// - Cloudflare: `rrdns-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use rrdns_core::{RecordFamily, ZoneBackend};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let backend = /* ZoneBackend implementation */;
//
//     let current = backend
//         .list_records("contoso.com", "web", RecordFamily::A)
//         .await?;
//     println!("web.contoso.com A -> {current:?}");
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::record::RecordFamily;

/// Trait for DNS zone backends
///
/// A backend exposes the four primitive operations the reconciler needs.
/// The backend's record store is the single shared mutable resource of a run;
/// the reconciler holds no copy of it between calls.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform API calls to (or file I/O on) their own zone store
/// - ✅ Parse backend-specific responses
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Decide whether a change is needed (owned by `Reconciler`)
/// - ❌ Retry or back off (a single attempt is authoritative for a run)
/// - ❌ Cache record sets between calls (the final re-read must be fresh)
/// - ❌ Spawn tasks or threads
///
/// Names are passed as given in the intent (`zone` without trailing dot,
/// `name` relative to the zone or `@`); use [`crate::record::fqdn`] to build
/// the absolute name when the backend needs one.
#[async_trait]
pub trait ZoneBackend: Send + Sync {
    /// Whether `zone` exists on this backend
    async fn zone_exists(&self, zone: &str) -> Result<bool, crate::Error>;

    /// Addresses currently published for `name` in `zone`
    ///
    /// A name with no records yields an empty set, not an error.
    async fn list_records(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
    ) -> Result<BTreeSet<IpAddr>, crate::Error>;

    /// Publish one address
    ///
    /// # Parameters
    ///
    /// - `address`: must belong to `family`
    /// - `ttl`: seconds, already validated by the caller
    async fn add_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
        ttl: u32,
    ) -> Result<(), crate::Error>;

    /// Withdraw one address
    async fn remove_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
    ) -> Result<(), crate::Error>;

    /// Get the backend name (for logging/debugging)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing zone backends from configuration
pub trait ZoneBackendFactory: Send + Sync {
    /// Create a ZoneBackend instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this backend
    ///
    /// # Returns
    ///
    /// A boxed ZoneBackend trait object
    fn create(
        &self,
        config: &crate::config::BackendConfig,
    ) -> Result<Box<dyn ZoneBackend>, crate::Error>;
}
