//! Contract Test: Health Gating
//!
//! Health probing decides which candidates may be published. It is opt-in
//! and must be invisible when disabled.
//!
//! Constraints verified:
//! - Probing disabled → desired set passes through, zero probe calls
//! - TCP probing without a port → configuration error before any network call
//! - Unhealthy candidates are never added and are reported as rejected
//! - Probe targets carry the configured type, port and path
//! - Candidates are probed concurrently, never more than the configured
//!   concurrency at once
//!
//! If this test fails, unhealthy addresses can reach DNS.

mod common;

use common::*;
use rrdns_core::record::{ProbeConfig, ProbeType, RecordFamily, RecordIntent};
use rrdns_core::{Error, ReconcileEvent, ReconcileOptions};
use std::time::{Duration, Instant};

fn tcp(port: Option<u16>) -> ProbeConfig {
    ProbeConfig {
        enabled: true,
        probe_type: ProbeType::Tcp,
        port,
        path: "/".to_string(),
    }
}

#[tokio::test]
async fn disabled_probe_makes_no_calls() {
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    let prober = ScriptedProber::healthy(&[]);
    let (reconciler, _events) = reconciler(&backend, &prober, ReconcileOptions::default());

    let intent = RecordIntent::new("contoso.com", "web")
        .with_addresses([ip("10.0.1.10"), ip("10.0.1.11"), ip("fd00::10")]);
    let outcome = reconciler.reconcile(&intent).await.expect("reconcile succeeds");

    assert_eq!(prober.call_count(), 0, "No probe may run when gating is off");
    assert_eq!(outcome.added4(), &set(&["10.0.1.10", "10.0.1.11"]));
    assert_eq!(outcome.added6(), &set(&["fd00::10"]));
    assert_eq!(outcome.rejections().count(), 0);
}

#[tokio::test]
async fn tcp_probe_without_port_fails_before_any_call() {
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    let prober = ScriptedProber::all_healthy();
    let (reconciler, _events) = reconciler(&backend, &prober, ReconcileOptions::default());

    let intents = vec![
        RecordIntent::new("contoso.com", "ok").with_addresses([ip("10.0.0.1")]),
        RecordIntent::new("contoso.com", "web")
            .with_addresses([ip("10.0.1.10")])
            .with_probe(tcp(None)),
    ];

    let err = reconciler.run_plan(&intents).await.unwrap_err();
    assert!(matches!(err, Error::MissingProbePort { .. }), "got {err:?}");
    assert!(err.is_fatal());

    assert_eq!(prober.call_count(), 0);
    assert_eq!(backend.zone_checks(), 0);
    assert_eq!(backend.list_calls(), 0);
    assert_eq!(backend.mutation_count(), 0);
}

#[tokio::test]
async fn unhealthy_candidates_are_not_published() {
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    let prober = ScriptedProber::healthy(&["10.0.1.10", "fd00::11"]);
    let (reconciler, mut events) = reconciler(&backend, &prober, ReconcileOptions::default());

    let intent = RecordIntent::new("contoso.com", "web")
        .with_addresses([ip("10.0.1.10"), ip("10.0.1.11"), ip("fd00::10"), ip("fd00::11")])
        .with_probe(tcp(Some(443)));
    let outcome = reconciler.reconcile(&intent).await.expect("reconcile succeeds");

    assert_eq!(prober.call_count(), 4);
    assert_eq!(outcome.final4(), Some(&set(&["10.0.1.10"])));
    assert_eq!(outcome.final6(), Some(&set(&["fd00::11"])));

    let rejected: Vec<_> = outcome.rejections().map(|r| r.address).collect();
    assert_eq!(rejected, vec![ip("10.0.1.11"), ip("fd00::10")]);
    assert!(outcome.rejections().all(|r| r.port == 443 && r.probe_type == ProbeType::Tcp));

    let rejection_events = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ReconcileEvent::AddressRejected { .. }))
        .count();
    assert_eq!(rejection_events, 2);
}

#[tokio::test]
async fn unhealthy_published_address_is_kept_in_merge_mode() {
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    backend.seed("contoso.com", "web", &["10.0.1.11"]).await;
    let prober = ScriptedProber::healthy(&["10.0.1.10"]);
    let (reconciler, _events) = reconciler(&backend, &prober, ReconcileOptions::default());

    let intent = RecordIntent::new("contoso.com", "web")
        .with_addresses([ip("10.0.1.10"), ip("10.0.1.11")])
        .with_probe(tcp(Some(80)));
    let outcome = reconciler.reconcile(&intent).await.expect("reconcile succeeds");

    // Merge mode never removes, even when the published address failed its probe
    assert_eq!(backend.remove_calls(), 0);
    assert_eq!(outcome.final4(), Some(&set(&["10.0.1.10", "10.0.1.11"])));
}

#[tokio::test]
async fn unhealthy_published_address_is_dropped_in_replace_mode() {
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    backend.seed("contoso.com", "web", &["10.0.1.10", "10.0.1.11"]).await;
    let prober = ScriptedProber::healthy(&["10.0.1.10"]);
    let (reconciler, _events) = reconciler(&backend, &prober, ReconcileOptions::default());

    let intent = RecordIntent::new("contoso.com", "web")
        .with_addresses([ip("10.0.1.10"), ip("10.0.1.11")])
        .with_replace_existing(true)
        .with_probe(tcp(Some(80)));
    let outcome = reconciler.reconcile(&intent).await.expect("reconcile succeeds");

    assert_eq!(outcome.removed4(), &set(&["10.0.1.11"]));
    assert_eq!(
        backend.published("contoso.com", "web", RecordFamily::A).await,
        set(&["10.0.1.10"])
    );
}

#[tokio::test]
async fn http_probe_target_defaults() {
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    let prober = ScriptedProber::all_healthy();
    let (reconciler, _events) = reconciler(&backend, &prober, ReconcileOptions::default());

    let intent = RecordIntent::new("contoso.com", "web")
        .with_addresses([ip("10.0.1.10")])
        .with_probe(ProbeConfig {
            enabled: true,
            probe_type: ProbeType::Http,
            port: None,
            path: "healthz".to_string(),
        });
    reconciler.reconcile(&intent).await.expect("reconcile succeeds");

    let targets = prober.targets();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].probe_type, ProbeType::Http);
    assert_eq!(targets[0].port, 80);
    assert_eq!(targets[0].path, "/healthz");
}

fn candidates(count: u8) -> RecordIntent {
    RecordIntent::new("contoso.com", "pool")
        .with_addresses((1..=count).map(|i| ip(&format!("10.0.3.{i}"))))
        .with_probe(tcp(Some(443)))
}

#[tokio::test]
async fn candidates_are_probed_concurrently() {
    let delay = Duration::from_millis(300);
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    let prober = SlowProber::new(delay);
    let (reconciler, _events) =
        reconciler_with(&backend, prober.clone(), ReconcileOptions::default());

    let started = Instant::now();
    let outcome = reconciler.reconcile(&candidates(6)).await.expect("reconcile succeeds");
    let elapsed = started.elapsed();

    assert_eq!(prober.call_count(), 6);
    assert_eq!(outcome.added4().len(), 6);
    assert!(
        elapsed < delay * 3,
        "6 probes of {delay:?} took {elapsed:?}; they ran one after another"
    );
    assert!(prober.peak_in_flight() > 1);
}

#[tokio::test]
async fn probe_concurrency_is_bounded() {
    let backend = CountingBackend::with_zones(&["contoso.com"]);
    let prober = SlowProber::new(Duration::from_millis(50));
    let options = ReconcileOptions {
        probe_concurrency: 2,
        ..ReconcileOptions::default()
    };
    let (reconciler, _events) = reconciler_with(&backend, prober.clone(), options);

    reconciler.reconcile(&candidates(8)).await.expect("reconcile succeeds");

    assert_eq!(prober.call_count(), 8);
    assert_eq!(prober.peak_in_flight(), 2);
}
