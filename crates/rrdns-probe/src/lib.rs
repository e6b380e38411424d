// # Network Prober
//
// This crate provides the TCP and HTTP reachability checks used to gate
// which candidate addresses may be published.
//
// ## Probes
//
// - **TCP**: healthy when a connection to `address:port` completes within the
//   timeout
// - **HTTP**: healthy when `GET http://address:port/path` answers with a status
//   in 200..=399 within the timeout. Redirects are not followed, so a `302`
//   counts as healthy on its own.
//
// ## Architecture
//
// The prober is stateless apart from a shared HTTP client. Every failure
// (refused, timed out, unexpected status, malformed response) collapses to
// `false`; the health filter turns that into a typed rejection.

use async_trait::async_trait;
use rrdns_core::record::{ProbeTarget, ProbeType};
use rrdns_core::traits::Prober;
use rrdns_core::{Error, Result};

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::trace;

/// TCP/HTTP reachability prober
#[derive(Debug, Clone)]
pub struct NetworkProber {
    /// HTTP client (no redirects, no proxy)
    client: reqwest::Client,
}

impl NetworkProber {
    /// Create a new prober
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP probe client: {}", e)))?;

        Ok(Self { client })
    }

    /// Probe URL for an address; IPv6 literals are bracketed
    pub fn probe_url(address: IpAddr, port: u16, path: &str) -> String {
        format!("http://{}{}", SocketAddr::new(address, port), path)
    }

    async fn probe_tcp(&self, address: IpAddr, port: u16, timeout: Duration) -> bool {
        let socket = SocketAddr::new(address, port);
        match tokio::time::timeout(timeout, TcpStream::connect(socket)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                trace!("TCP probe {} failed: {}", socket, e);
                false
            }
            Err(_) => {
                trace!("TCP probe {} timed out after {:?}", socket, timeout);
                false
            }
        }
    }

    async fn probe_http(&self, address: IpAddr, port: u16, path: &str, timeout: Duration) -> bool {
        let url = Self::probe_url(address, port, path);
        let request = self.client.get(&url).timeout(timeout).send();

        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => {
                let status = response.status();
                let healthy = (200..400).contains(&status.as_u16());
                trace!("HTTP probe {} answered {} (healthy: {})", url, status, healthy);
                healthy
            }
            Ok(Err(e)) => {
                trace!("HTTP probe {} failed: {}", url, e);
                false
            }
            Err(_) => {
                trace!("HTTP probe {} timed out after {:?}", url, timeout);
                false
            }
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, address: IpAddr, target: &ProbeTarget, timeout: Duration) -> bool {
        match target.probe_type {
            ProbeType::Tcp => self.probe_tcp(address, target.port, timeout).await,
            ProbeType::Http => {
                self.probe_http(address, target.port, &target.path, timeout)
                    .await
            }
        }
    }

    fn prober_name(&self) -> &'static str {
        "network"
    }
}
