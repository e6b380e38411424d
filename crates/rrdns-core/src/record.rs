//! Record intents and the types they are built from
//!
//! A [`RecordIntent`] is one desired round-robin configuration: a name in a
//! zone, the candidate addresses per family, and how membership is gated.
//! Intents are built fresh per run (by the plan loader or the CLI) and are
//! never persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default TTL applied when neither the record nor an override sets one
pub const DEFAULT_TTL: u32 = 60;

/// Largest accepted TTL (one day)
pub const MAX_TTL: u32 = 86_400;

/// Port used by HTTP probes when none is configured
pub const DEFAULT_HTTP_PROBE_PORT: u16 = 80;

/// Address family of a round-robin member
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordFamily {
    /// IPv4 (A records)
    A,
    /// IPv6 (AAAA records)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordFamily {
    /// Both families, in reconciliation order
    pub const ALL: [RecordFamily; 2] = [RecordFamily::A, RecordFamily::Aaaa];

    /// The DNS record type string
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFamily::A => "A",
            RecordFamily::Aaaa => "AAAA",
        }
    }

    /// Family an address belongs to
    pub fn of(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => RecordFamily::A,
            IpAddr::V6(_) => RecordFamily::Aaaa,
        }
    }

    /// Whether `address` belongs to this family
    pub fn matches(&self, address: &IpAddr) -> bool {
        Self::of(address) == *self
    }
}

impl fmt::Display for RecordFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of reachability check used to gate publication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeType {
    /// Plain TCP connect
    #[default]
    Tcp,
    /// HTTP GET with a 2xx/3xx status
    Http,
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeType::Tcp => f.write_str("TCP"),
            ProbeType::Http => f.write_str("HTTP"),
        }
    }
}

impl FromStr for ProbeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(ProbeType::Tcp),
            "http" => Ok(ProbeType::Http),
            other => Err(Error::invalid_input(format!(
                "unknown probe type '{other}' (expected TCP or HTTP)"
            ))),
        }
    }
}

/// Health probe settings of one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Whether candidates are probed before publication
    pub enabled: bool,
    /// TCP or HTTP
    pub probe_type: ProbeType,
    /// Target port; required for TCP, defaults to 80 for HTTP
    pub port: Option<u16>,
    /// Request path for HTTP probes
    pub path: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            probe_type: ProbeType::Tcp,
            port: None,
            path: "/".to_string(),
        }
    }
}

impl ProbeConfig {
    /// Resolve into a concrete probe target
    ///
    /// Returns `None` when the probe type needs a port and none was given.
    pub fn target(&self) -> Option<ProbeTarget> {
        let port = match (self.probe_type, self.port) {
            (_, Some(port)) => port,
            (ProbeType::Http, None) => DEFAULT_HTTP_PROBE_PORT,
            (ProbeType::Tcp, None) => return None,
        };

        Some(ProbeTarget {
            probe_type: self.probe_type,
            port,
            path: normalize_probe_path(&self.path),
        })
    }
}

/// Fully resolved probe parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTarget {
    /// TCP or HTTP
    pub probe_type: ProbeType,
    /// Port to connect to
    pub port: u16,
    /// Request path, always starting with `/`
    pub path: String,
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.probe_type {
            ProbeType::Tcp => write!(f, "TCP/{}", self.port),
            ProbeType::Http => write!(f, "HTTP/{}{}", self.port, self.path),
        }
    }
}

/// Ensure an HTTP probe path starts with `/`
pub fn normalize_probe_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Trim whitespace and a single trailing dot from a zone or host label
pub fn normalize_dns_name(name: &str) -> String {
    let name = name.trim();
    name.strip_suffix('.').unwrap_or(name).to_string()
}

/// Fully-qualified name of `name` within `zone`
///
/// `@` and the empty label denote the zone apex; names already ending in the
/// zone are returned as-is.
pub fn fqdn(zone: &str, name: &str) -> String {
    let zone = normalize_dns_name(zone);
    let name = normalize_dns_name(name);

    if name.is_empty() || name == "@" {
        return zone;
    }

    let lower = name.to_ascii_lowercase();
    let zone_lower = zone.to_ascii_lowercase();
    if lower == zone_lower || lower.ends_with(&format!(".{zone_lower}")) {
        name
    } else {
        format!("{name}.{zone}")
    }
}

/// One desired DNS round-robin configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIntent {
    /// DNS zone (trailing dot trimmed)
    pub zone: String,
    /// Host label (trailing dot trimmed)
    pub name: String,
    /// Candidate IPv4 members
    pub desired_v4: BTreeSet<IpAddr>,
    /// Candidate IPv6 members
    pub desired_v6: BTreeSet<IpAddr>,
    /// TTL applied to added records
    pub ttl: u32,
    /// Remove published addresses that are not desired
    pub replace_existing: bool,
    /// Health gating
    pub probe: ProbeConfig,
}

impl RecordIntent {
    /// Create an intent with default TTL, merge mode and no probing
    pub fn new(zone: impl AsRef<str>, name: impl AsRef<str>) -> Self {
        Self {
            zone: normalize_dns_name(zone.as_ref()).to_ascii_lowercase(),
            name: normalize_dns_name(name.as_ref()),
            desired_v4: BTreeSet::new(),
            desired_v6: BTreeSet::new(),
            ttl: DEFAULT_TTL,
            replace_existing: false,
            probe: ProbeConfig::default(),
        }
    }

    /// Add candidate addresses; each lands in the set of its family
    pub fn with_addresses<I>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        for address in addresses {
            match RecordFamily::of(&address) {
                RecordFamily::A => self.desired_v4.insert(address),
                RecordFamily::Aaaa => self.desired_v6.insert(address),
            };
        }
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable replace mode
    pub fn with_replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    /// Set the probe configuration
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Desired members of one family
    pub fn desired(&self, family: RecordFamily) -> &BTreeSet<IpAddr> {
        match family {
            RecordFamily::A => &self.desired_v4,
            RecordFamily::Aaaa => &self.desired_v6,
        }
    }

    /// Fully-qualified record name
    pub fn fqdn(&self) -> String {
        fqdn(&self.zone, &self.name)
    }

    /// Check the intent's invariants
    ///
    /// Fails with [`Error::MissingProbePort`] for TCP probing without a port,
    /// and with [`Error::InvalidInput`] for everything else.
    pub fn validate(&self) -> Result<()> {
        if self.zone.is_empty() {
            return Err(Error::invalid_input("zone name cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(Error::invalid_input(format!(
                "record name cannot be empty (zone {})",
                self.zone
            )));
        }
        if self.desired_v4.is_empty() && self.desired_v6.is_empty() {
            return Err(Error::invalid_input(format!(
                "{} has no IPv4 or IPv6 addresses",
                self.fqdn()
            )));
        }
        if let Some(bad) = self.desired_v4.iter().find(|ip| !ip.is_ipv4()) {
            return Err(Error::invalid_input(format!(
                "{bad} is not an IPv4 address ({})",
                self.fqdn()
            )));
        }
        if let Some(bad) = self.desired_v6.iter().find(|ip| !ip.is_ipv6()) {
            return Err(Error::invalid_input(format!(
                "{bad} is not an IPv6 address ({})",
                self.fqdn()
            )));
        }
        if !(1..=MAX_TTL).contains(&self.ttl) {
            return Err(Error::invalid_input(format!(
                "TTL {} for {} is outside 1..={MAX_TTL}",
                self.ttl,
                self.fqdn()
            )));
        }
        if self.probe.port == Some(0) {
            return Err(Error::invalid_input(format!(
                "probe port for {} must be between 1 and 65535. Got: 0",
                self.fqdn()
            )));
        }
        if self.probe.enabled && self.probe.target().is_none() {
            return Err(Error::missing_probe_port(&self.zone, &self.name));
        }
        Ok(())
    }
}
