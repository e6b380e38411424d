//! Health filter
//!
//! Applies a [`Prober`] across a candidate address set and keeps the subset
//! that answered. Gating is opt-in: a disabled probe config (or an empty
//! candidate set) passes addresses through without a single probe call.
//!
//! Probes are independent blocking I/O with a bounded timeout, so they run
//! concurrently through a bounded pool; wall-clock time stays close to one
//! timeout instead of `timeout × addresses`.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{ProbeConfig, ProbeType};
use crate::traits::Prober;

/// Why a candidate was excluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectReason {
    /// The probe did not succeed within its timeout
    Unreachable,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Diagnostic for one candidate that failed its probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRejection {
    /// Rejected address
    pub address: IpAddr,
    /// Probe type used
    pub probe_type: ProbeType,
    /// Port probed
    pub port: u16,
    /// Path requested (HTTP only)
    pub path: Option<String>,
    /// Reason category
    pub reason: RejectReason,
}

impl fmt::Display for ProbeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} port {}", self.address, self.probe_type, self.port)?;
        if let Some(path) = &self.path {
            write!(f, " path {path}")?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Output of one filter pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterResult {
    /// Addresses eligible for publication
    pub healthy: BTreeSet<IpAddr>,
    /// One entry per excluded address, sorted by address
    pub rejected: Vec<ProbeRejection>,
}

/// Applies a prober across candidate sets
pub struct HealthFilter<'a> {
    prober: &'a dyn Prober,
    timeout: Duration,
    concurrency: usize,
}

impl<'a> HealthFilter<'a> {
    /// Create a health filter
    ///
    /// # Parameters
    ///
    /// - `prober`: reachability check to apply
    /// - `timeout`: per-probe timeout
    /// - `concurrency`: maximum probes in flight (at least 1)
    pub fn new(prober: &'a dyn Prober, timeout: Duration, concurrency: usize) -> Self {
        Self {
            prober,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Keep the addresses that pass the probe described by `probe`
    ///
    /// `zone` and `name` only label diagnostics.
    ///
    /// # Errors
    ///
    /// [`Error::MissingProbePort`] when probing is enabled with TCP and no
    /// port; raised before any probe is sent.
    pub async fn filter(
        &self,
        zone: &str,
        name: &str,
        addresses: &BTreeSet<IpAddr>,
        probe: &ProbeConfig,
    ) -> Result<FilterResult> {
        if !probe.enabled || addresses.is_empty() {
            return Ok(FilterResult {
                healthy: addresses.clone(),
                rejected: Vec::new(),
            });
        }

        let target = probe
            .target()
            .ok_or_else(|| Error::missing_probe_port(zone, name))?;

        debug!(
            "Probing {} candidate(s) for {}.{} via {} ({})",
            addresses.len(),
            name,
            zone,
            target,
            self.prober.prober_name()
        );

        let results: Vec<(IpAddr, bool)> = stream::iter(addresses.iter().copied())
            .map(|address| {
                let target = &target;
                async move {
                    let healthy = self.prober.probe(address, target, self.timeout).await;
                    (address, healthy)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = FilterResult::default();
        for (address, healthy) in results {
            if healthy {
                outcome.healthy.insert(address);
            } else {
                outcome.rejected.push(ProbeRejection {
                    address,
                    probe_type: target.probe_type,
                    port: target.port,
                    path: (target.probe_type == ProbeType::Http).then(|| target.path.clone()),
                    reason: RejectReason::Unreachable,
                });
            }
        }
        outcome.rejected.sort_by_key(|r| r.address);

        for rejection in &outcome.rejected {
            warn!("Excluding {} from {}.{}: {}", rejection.address, name, zone, rejection);
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ProbeTarget;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Healthy iff the last octet/segment is even
    struct EvenProber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Prober for EvenProber {
        async fn probe(&self, address: IpAddr, _target: &ProbeTarget, _timeout: Duration) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match address {
                IpAddr::V4(v4) => v4.octets()[3] % 2 == 0,
                IpAddr::V6(v6) => v6.segments()[7] % 2 == 0,
            }
        }

        fn prober_name(&self) -> &'static str {
            "even"
        }
    }

    fn set(addrs: &[&str]) -> BTreeSet<IpAddr> {
        addrs.iter().map(|a| a.parse().unwrap()).collect()
    }

    fn tcp_probe(port: Option<u16>) -> ProbeConfig {
        ProbeConfig {
            enabled: true,
            probe_type: ProbeType::Tcp,
            port,
            path: "/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_disabled_probe_passes_through() {
        let prober = EvenProber {
            calls: AtomicUsize::new(0),
        };
        let filter = HealthFilter::new(&prober, Duration::from_millis(100), 4);
        let input = set(&["10.0.0.1", "10.0.0.2"]);

        let result = filter
            .filter("contoso.com", "web", &input, &ProbeConfig::default())
            .await
            .unwrap();

        assert_eq!(result.healthy, input);
        assert!(result.rejected.is_empty());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_keeps_only_healthy() {
        let prober = EvenProber {
            calls: AtomicUsize::new(0),
        };
        let filter = HealthFilter::new(&prober, Duration::from_millis(100), 2);
        let input = set(&["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);

        let result = filter
            .filter("contoso.com", "web", &input, &tcp_probe(Some(443)))
            .await
            .unwrap();

        assert_eq!(result.healthy, set(&["10.0.0.2", "10.0.0.4"]));
        let rejected: Vec<_> = result.rejected.iter().map(|r| r.address).collect();
        assert_eq!(rejected, vec![
            "10.0.0.1".parse::<IpAddr>().unwrap(),
            "10.0.0.3".parse::<IpAddr>().unwrap()
        ]);
        assert!(result.rejected.iter().all(|r| r.port == 443 && r.path.is_none()));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_tcp_without_port_fails_before_probing() {
        let prober = EvenProber {
            calls: AtomicUsize::new(0),
        };
        let filter = HealthFilter::new(&prober, Duration::from_millis(100), 4);

        let err = filter
            .filter("contoso.com", "web", &set(&["10.0.0.1"]), &tcp_probe(None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingProbePort { .. }));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_http_rejection_names_path() {
        let prober = EvenProber {
            calls: AtomicUsize::new(0),
        };
        let filter = HealthFilter::new(&prober, Duration::from_millis(100), 4);
        let probe = ProbeConfig {
            enabled: true,
            probe_type: ProbeType::Http,
            port: None,
            path: "health".to_string(),
        };

        let result = filter
            .filter("contoso.com", "web", &set(&["fd00::1"]), &probe)
            .await
            .unwrap();

        assert!(result.healthy.is_empty());
        let rejection = &result.rejected[0];
        assert_eq!(rejection.port, 80);
        assert_eq!(rejection.path.as_deref(), Some("/health"));
        assert_eq!(rejection.to_string(), "fd00::1 HTTP port 80 path /health: unreachable");
    }
}
