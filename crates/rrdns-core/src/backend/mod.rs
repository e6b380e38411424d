// # Zone Backend Implementations
//
// Local implementations of the ZoneBackend trait. Both keep their zones in a
// [`ZoneTable`]; they differ only in whether the table survives the process.

pub mod file;
pub mod memory;

pub use file::{FileZoneBackend, FileZoneBackendFactory};
pub use memory::{MemoryZoneBackend, MemoryZoneBackendFactory};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::record::{fqdn, normalize_dns_name, RecordFamily};

/// Published addresses of one name, address → TTL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSets {
    #[serde(rename = "A", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub a: BTreeMap<IpAddr, u32>,
    #[serde(rename = "AAAA", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aaaa: BTreeMap<IpAddr, u32>,
}

impl RecordSets {
    fn family(&self, family: RecordFamily) -> &BTreeMap<IpAddr, u32> {
        match family {
            RecordFamily::A => &self.a,
            RecordFamily::Aaaa => &self.aaaa,
        }
    }

    fn family_mut(&mut self, family: RecordFamily) -> &mut BTreeMap<IpAddr, u32> {
        match family {
            RecordFamily::A => &mut self.a,
            RecordFamily::Aaaa => &mut self.aaaa,
        }
    }

    fn is_empty(&self) -> bool {
        self.a.is_empty() && self.aaaa.is_empty()
    }
}

/// Zones → record names → record sets
///
/// Zone and record names are stored lowercased without a trailing dot; the
/// apex is stored as `@`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTable {
    #[serde(default)]
    zones: BTreeMap<String, BTreeMap<String, RecordSets>>,
}

fn zone_key(zone: &str) -> String {
    normalize_dns_name(zone).to_ascii_lowercase()
}

fn name_key(zone: &str, name: &str) -> String {
    let name = normalize_dns_name(name).to_ascii_lowercase();
    let zone = zone_key(zone);
    if name.is_empty() || name == "@" || name == zone {
        return "@".to_string();
    }
    match name.strip_suffix(&format!(".{zone}")) {
        Some(relative) => relative.to_string(),
        None => name,
    }
}

impl ZoneTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a zone if it does not exist yet
    pub fn add_zone(&mut self, zone: &str) {
        self.zones.entry(zone_key(zone)).or_default();
    }

    /// Whether a zone exists
    pub fn contains_zone(&self, zone: &str) -> bool {
        self.zones.contains_key(&zone_key(zone))
    }

    /// Names of all zones
    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    fn zone(&self, zone: &str) -> Result<&BTreeMap<String, RecordSets>> {
        self.zones
            .get(&zone_key(zone))
            .ok_or_else(|| Error::zone_not_found(zone))
    }

    fn zone_mut(&mut self, zone: &str) -> Result<&mut BTreeMap<String, RecordSets>> {
        self.zones
            .get_mut(&zone_key(zone))
            .ok_or_else(|| Error::zone_not_found(zone))
    }

    /// Published addresses of one family
    pub fn list(&self, zone: &str, name: &str, family: RecordFamily) -> Result<BTreeSet<IpAddr>> {
        let records = self.zone(zone)?;
        Ok(records
            .get(&name_key(zone, name))
            .map(|sets| sets.family(family).keys().copied().collect())
            .unwrap_or_default())
    }

    /// TTL of one published address
    pub fn ttl(&self, zone: &str, name: &str, family: RecordFamily, address: IpAddr) -> Option<u32> {
        self.zone(zone)
            .ok()?
            .get(&name_key(zone, name))?
            .family(family)
            .get(&address)
            .copied()
    }

    /// Publish an address; re-adding an address refreshes its TTL
    pub fn add(
        &mut self,
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
        let key = name_key(zone, name);
        self.zone_mut(zone)?
            .entry(key)
            .or_default()
            .family_mut(family)
            .insert(address, ttl);
        Ok(())
    }

    /// Withdraw an address
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the address is not published.
    pub fn remove(
        &mut self,
        zone: &str,
        name: &str,
        family: RecordFamily,
        address: IpAddr,
    ) -> Result<()> {
        let key = name_key(zone, name);
        let records = self.zone_mut(zone)?;
        let sets = records.get_mut(&key).ok_or_else(|| {
            Error::not_found(format!("No records for {}", fqdn(zone, name)))
        })?;
        if sets.family_mut(family).remove(&address).is_none() {
            return Err(Error::not_found(format!(
                "{} {} -> {} is not published",
                family,
                fqdn(zone, name),
                address
            )));
        }
        if sets.is_empty() {
            records.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(name_key("contoso.com", "@"), "@");
        assert_eq!(name_key("contoso.com", ""), "@");
        assert_eq!(name_key("contoso.com", "contoso.com."), "@");
        assert_eq!(name_key("contoso.com", "Web"), "web");
        assert_eq!(name_key("contoso.com", "web.contoso.com."), "web");
    }

    #[test]
    fn test_unknown_zone() {
        let table = ZoneTable::new();
        let err = table.list("contoso.com", "web", RecordFamily::A).unwrap_err();
        assert!(matches!(err, Error::ZoneNotFound(_)));
    }

    #[test]
    fn test_add_list_remove() {
        let mut table = ZoneTable::new();
        table.add_zone("Contoso.com.");
        assert!(table.contains_zone("contoso.com"));

        table.add("contoso.com", "web", RecordFamily::A, ip("10.0.1.10"), 60).unwrap();
        table.add("contoso.com", "WEB", RecordFamily::A, ip("10.0.1.11"), 60).unwrap();
        table.add("contoso.com", "web", RecordFamily::Aaaa, ip("fd00::1"), 300).unwrap();

        assert_eq!(
            table.list("contoso.com", "web", RecordFamily::A).unwrap(),
            BTreeSet::from([ip("10.0.1.10"), ip("10.0.1.11")])
        );
        assert_eq!(table.ttl("contoso.com", "web", RecordFamily::Aaaa, ip("fd00::1")), Some(300));

        table.remove("contoso.com", "web", RecordFamily::A, ip("10.0.1.10")).unwrap();
        let err = table
            .remove("contoso.com", "web", RecordFamily::A, ip("10.0.1.10"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_family_mismatch_rejected() {
        let mut table = ZoneTable::new();
        table.add_zone("contoso.com");
        let err = table
            .add("contoso.com", "web", RecordFamily::A, ip("fd00::1"), 60)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
