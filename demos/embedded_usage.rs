//! Minimal embedding example for rrdns-core
//!
//! This example demonstrates using rrdns-core as a library in a custom
//! application: an in-memory zone, a custom prober and a plan given as
//! JSON. The application owns the reconciler and its event channel.

use rrdns_core::record::{ProbeTarget, RecordFamily};
use rrdns_core::traits::{Prober, ZoneBackend};
use rrdns_core::{
    MemoryZoneBackend, OutputFormat, PlanFormat, PlanOverrides, ReconcileEvent, ReconcileOptions,
    Reconciler, Result, parse_plan,
};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Prober backed by an allow-list instead of the network
struct EmbeddedProber {
    healthy: BTreeSet<IpAddr>,
    calls: Arc<AtomicUsize>,
}

impl EmbeddedProber {
    fn new(healthy: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            healthy: healthy.into_iter().collect(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait::async_trait]
impl Prober for EmbeddedProber {
    async fn probe(&self, address: IpAddr, target: &ProbeTarget, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy.contains(&address);
        println!("[Embedded] Probing {} via {} -> {}", address, target, healthy);
        healthy
    }

    fn prober_name(&self) -> &'static str {
        "embedded"
    }
}

const PLAN: &str = r#"[
  { "ZoneName": "contoso.com", "RecordName": "web",
    "IPv4": ["10.0.1.10", "10.0.1.11"], "ReplaceExisting": true },
  { "ZoneName": "contoso.com", "RecordName": "api",
    "IPv4": "10.0.2.10;10.0.2.11", "IPv6": "fd00::10",
    "HealthProbe": true, "ProbeType": "HTTP", "ProbePath": "/healthz" }
]"#;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    println!("=== Embedded rrdns-core Example ===\n");

    // Zone with a stale member that replace mode will drop
    let backend = MemoryZoneBackend::with_zone("contoso.com");
    backend
        .seed(
            "contoso.com",
            "web",
            [IpAddr::from([10, 0, 1, 10]), IpAddr::from([10, 0, 1, 99])],
            300,
        )
        .await?;

    // 10.0.2.11 fails its probe and stays unpublished
    let prober = EmbeddedProber::new([
        IpAddr::from([10, 0, 2, 10]),
        IpAddr::from([0xfd00, 0, 0, 0, 0, 0, 0, 0x10]),
    ]);
    let probe_calls = Arc::clone(&prober.calls);

    let intents = parse_plan(PLAN, PlanFormat::Json, &PlanOverrides::default())?;
    println!("Loaded {} record(s)\n", intents.len());

    let (reconciler, mut events) = Reconciler::new(
        Box::new(backend.clone()),
        Box::new(prober),
        ReconcileOptions::default(),
    )?;

    let consumer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ReconcileEvent::AddressAdded { address, .. } => {
                    println!("[Embedded] + {}", address)
                }
                ReconcileEvent::AddressRemoved { address, .. } => {
                    println!("[Embedded] - {}", address)
                }
                ReconcileEvent::AddressRejected { address, .. } => {
                    println!("[Embedded] ! {} (failed health probe)", address)
                }
                _ => {}
            }
        }
    });

    let run = reconciler.run_plan(&intents).await?;
    drop(reconciler);
    let _ = consumer.await;

    println!("\nProbe calls: {}", probe_calls.load(Ordering::SeqCst));
    for record in ["web", "api"] {
        let published = backend
            .list_records("contoso.com", record, RecordFamily::A)
            .await?;
        println!("{record}.contoso.com A: {:?}", published);
    }

    println!("\n{}", rrdns_core::summarize(&run).render(OutputFormat::Table)?);
    Ok(())
}
