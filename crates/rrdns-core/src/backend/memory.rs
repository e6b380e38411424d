// # Memory Zone Backend
//
// In-memory implementation of ZoneBackend.
//
// ## Purpose
//
// Provides a fast zone store that doesn't persist across runs. Useful for
// tests, embedding, and rehearsing a plan against a seeded zone.
//
// ## Sharing
//
// Clones share the same zones, so a test can keep a handle to the backend it
// boxed into a `Reconciler` and inspect the result afterwards.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::ZoneTable;
use crate::config::BackendConfig;
use crate::record::RecordFamily;
use crate::traits::{ZoneBackend, ZoneBackendFactory};
use crate::Error;

/// In-memory zone backend
///
/// # Example
///
/// ```rust,no_run
/// use rrdns_core::backend::MemoryZoneBackend;
/// use rrdns_core::{RecordFamily, ZoneBackend};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = MemoryZoneBackend::with_zone("contoso.com");
///
///     backend
///         .add_record("contoso.com", "web", RecordFamily::A, "10.0.1.10".parse()?, 60)
///         .await?;
///
///     let current = backend.list_records("contoso.com", "web", RecordFamily::A).await?;
///     assert_eq!(current.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryZoneBackend {
    inner: Arc<RwLock<ZoneTable>>,
}

impl MemoryZoneBackend {
    /// Create a backend with no zones
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend holding one empty zone
    pub fn with_zone(zone: &str) -> Self {
        let mut table = ZoneTable::new();
        table.add_zone(zone);
        Self::from_table(table)
    }

    /// Wrap an existing table
    pub fn from_table(table: ZoneTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(table)),
        }
    }

    /// Create a zone
    pub async fn add_zone(&self, zone: &str) {
        self.inner.write().await.add_zone(zone);
    }

    /// Publish addresses directly, bypassing the reconciler
    pub async fn seed<I>(&self, zone: &str, name: &str, addresses: I, ttl: u32) -> Result<(), Error>
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let mut table = self.inner.write().await;
        for address in addresses {
            table.add(zone, name, RecordFamily::of(&address), address, ttl)?;
        }
        Ok(())
    }

    /// TTL of a published address
    pub async fn ttl_of(&self, zone: &str, name: &str, address: IpAddr) -> Option<u32> {
        self.inner
            .read()
            .await
            .ttl(zone, name, RecordFamily::of(&address), address)
    }

    /// Copy of the current zones
    pub async fn snapshot(&self) -> ZoneTable {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl ZoneBackend for MemoryZoneBackend {
    async fn zone_exists(&self, zone: &str) -> Result<bool, Error> {
        Ok(self.inner.read().await.contains_zone(zone))
    }

    async fn list_records(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
    ) -> Result<BTreeSet<IpAddr>, Error> {
        self.inner.read().await.list(zone, name, family)
    }

    async fn add_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
        ttl: u32,
    ) -> Result<(), Error> {
        self.inner.write().await.add(zone, name, family, address, ttl)
    }

    async fn remove_record(
        &self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
    ) -> Result<(), Error> {
        self.inner.write().await.remove(zone, name, family, address)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Factory for [`BackendConfig::Memory`]; the backend starts with no zones
pub struct MemoryZoneBackendFactory;

impl ZoneBackendFactory for MemoryZoneBackendFactory {
    fn create(&self, config: &BackendConfig) -> Result<Box<dyn ZoneBackend>, Error> {
        match config {
            BackendConfig::Memory => Ok(Box::new(MemoryZoneBackend::new())),
            other => Err(Error::config(format!(
                "Memory backend factory cannot build a '{}' backend",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_memory_backend_basic() {
        let backend = MemoryZoneBackend::with_zone("contoso.com");

        assert!(backend.zone_exists("contoso.com").await.unwrap());
        assert!(!backend.zone_exists("fabrikam.com").await.unwrap());

        backend
            .add_record("contoso.com", "web", RecordFamily::A, ip("10.0.1.10"), 60)
            .await
            .unwrap();
        let current = backend
            .list_records("contoso.com", "web", RecordFamily::A)
            .await
            .unwrap();
        assert_eq!(current, BTreeSet::from([ip("10.0.1.10")]));
        assert_eq!(backend.ttl_of("contoso.com", "web", ip("10.0.1.10")).await, Some(60));

        backend
            .remove_record("contoso.com", "web", RecordFamily::A, ip("10.0.1.10"))
            .await
            .unwrap();
        assert!(backend
            .list_records("contoso.com", "web", RecordFamily::A)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_zones() {
        let backend = MemoryZoneBackend::with_zone("contoso.com");
        let handle = backend.clone();

        backend
            .seed("contoso.com", "api", [ip("10.0.2.10"), ip("fd00::10")], 300)
            .await
            .unwrap();

        assert_eq!(
            handle
                .list_records("contoso.com", "api", RecordFamily::Aaaa)
                .await
                .unwrap(),
            BTreeSet::from([ip("fd00::10")])
        );
    }

    #[test]
    fn test_factory_rejects_other_configs() {
        let factory = MemoryZoneBackendFactory;
        assert!(factory.create(&BackendConfig::Memory).is_ok());
        assert!(factory
            .create(&BackendConfig::File {
                path: "zones.json".to_string()
            })
            .is_err());
    }
}
