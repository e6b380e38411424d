// # Prober Trait
//
// Defines the single reachability check used to gate which candidate
// addresses are eligible for publication.
//
// ## Implementations
//
// - Network (TCP connect / HTTP GET): `rrdns-probe` crate
// - Test doubles: `tests/common`

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

use crate::record::ProbeTarget;

/// Trait for reachability probes
///
/// # Contract
///
/// - One attempt per call; no retries.
/// - The attempt must finish within `timeout`.
/// - Every failure (refused, unreachable, timeout, bad status) is reported as
///   `false`. Implementations never return errors or panic on network input.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `address` as described by `target`
    ///
    /// # Returns
    ///
    /// `true` if the address is healthy, `false` otherwise
    async fn probe(&self, address: IpAddr, target: &ProbeTarget, timeout: Duration) -> bool;

    /// Get the prober name (for logging/debugging)
    fn prober_name(&self) -> &'static str;
}
